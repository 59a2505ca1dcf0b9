//! Authorization checks
//! The core never requests permissions. It only asks an [`Authorizer`] whether a
//! capability has already been granted, at `start`, `connect` and `send`.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// A runtime capability guarded by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Discover nearby peripherals
    Scan,
    /// Open a GATT connection
    Connect,
    /// Write to a characteristic
    Write,
}

/// Answers whether a capability has been granted
pub trait Authorizer: Send + Sync {
    fn has_permission(&self, capability: Capability) -> bool;
}

/// Grants everything. Desktop stacks have no runtime permission model.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn has_permission(&self, _capability: Capability) -> bool {
        true
    }
}

/// A mutable set of granted capabilities, fed by whatever acquires permissions.
#[derive(Debug, Default)]
pub struct GrantedCapabilities {
    granted: Mutex<HashSet<Capability>>,
}

impl GrantedCapabilities {
    pub fn new(granted: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            granted: Mutex::new(granted.into_iter().collect()),
        }
    }

    pub fn grant(&self, capability: Capability) {
        self.granted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(capability);
    }

    pub fn revoke(&self, capability: Capability) {
        self.granted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&capability);
    }
}

impl Authorizer for GrantedCapabilities {
    fn has_permission(&self, capability: Capability) -> bool {
        self.granted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_and_revoke() {
        let caps = GrantedCapabilities::new([Capability::Scan]);
        assert!(caps.has_permission(Capability::Scan));
        assert!(!caps.has_permission(Capability::Connect));

        caps.grant(Capability::Connect);
        assert!(caps.has_permission(Capability::Connect));

        caps.revoke(Capability::Scan);
        assert!(!caps.has_permission(Capability::Scan));
    }
}
