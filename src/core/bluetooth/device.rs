//! Registry of peripherals discovered during one scan pass

use crate::core::bluetooth::types::PeripheralHandle;

/// Deduplicated list of discovered peripherals, in insertion order.
///
/// Not synchronized; the owner serializes access.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<PeripheralHandle>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every entry. Called when a new scan pass starts.
    pub fn reset(&mut self) {
        self.devices.clear();
    }

    /// Inserts `handle` unless an entry with the same address exists.
    /// Returns whether the registry changed.
    pub fn add(&mut self, handle: PeripheralHandle) -> bool {
        if self.contains(&handle.address) {
            return false;
        }
        self.devices.push(handle);
        true
    }

    pub fn contains(&self, address: &str) -> bool {
        self.devices.iter().any(|d| d.address == address)
    }

    pub fn get(&self, address: &str) -> Option<&PeripheralHandle> {
        self.devices.iter().find(|d| d.address == address)
    }

    /// Known handles in first-insertion order. Each call starts a fresh pass.
    pub fn all(&self) -> impl Iterator<Item = &PeripheralHandle> + '_ {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::types::RawPeripheral;

    fn handle(address: &str, name: &str) -> PeripheralHandle {
        PeripheralHandle::new(address, Some(name.to_string()), RawPeripheral::new(()))
    }

    #[test]
    fn add_keeps_first_insertion_per_address() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.add(handle("AA", "first")));
        assert!(registry.add(handle("BB", "second")));
        assert!(!registry.add(handle("AA", "renamed")));
        assert!(registry.add(handle("CC", "third")));
        assert!(!registry.add(handle("BB", "second")));

        let seen: Vec<_> = registry
            .all()
            .map(|d| (d.address.as_str(), d.display_name()))
            .collect();
        assert_eq!(seen, vec![("AA", "first"), ("BB", "second"), ("CC", "third")]);
    }

    #[test]
    fn all_is_restartable() {
        let mut registry = DeviceRegistry::new();
        registry.add(handle("AA", "a"));
        registry.add(handle("BB", "b"));

        assert_eq!(registry.all().count(), 2);
        assert_eq!(registry.all().count(), 2);
        assert_eq!(registry.get("BB").map(|d| d.display_name()), Some("b"));
    }

    #[test]
    fn reset_clears_entries() {
        let mut registry = DeviceRegistry::new();
        registry.add(handle("AA", "a"));
        registry.reset();

        assert!(registry.is_empty());
        assert!(registry.add(handle("AA", "a")));
        assert_eq!(registry.len(), 1);
    }
}
