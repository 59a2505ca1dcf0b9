//! Message transport over the control characteristics
//! Outbound payloads go to the write characteristic of a ready session; inbound
//! notifications on the notify characteristic go to the notification handler.

use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::permission::Capability;
use crate::core::bluetooth::session::Session;
use crate::core::bluetooth::types::InboundMessage;
use crate::error::{BleError, Result};

/// Holds no connection of its own; it borrows the session's while it is ready.
#[derive(Clone)]
pub struct MessageTransport {
    session: Arc<Session>,
    notifications: NotificationHandler,
}

impl MessageTransport {
    pub fn new(session: Arc<Session>, notifications: NotificationHandler) -> Self {
        Self {
            session,
            notifications,
        }
    }

    pub fn notifications(&self) -> &NotificationHandler {
        &self.notifications
    }

    /// Queues `payload` on the write characteristic. Success means the local
    /// stack accepted the write, not that the peripheral processed it.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.session.with_ready_link(|link| {
            if !self.session.authorizer().has_permission(Capability::Write) {
                warn!("Write permission not granted");
                return Err(BleError::PermissionDenied(Capability::Write));
            }
            if link
                .connection
                .write_characteristic(link.write_characteristic, payload)
            {
                info!("Message sent: {}", String::from_utf8_lossy(payload));
                Ok(())
            } else {
                warn!("Failed to send message");
                Err(BleError::WriteRejected)
            }
        })
    }

    /// Handles a characteristic-changed event. Returns whether it was delivered.
    pub fn handle_notification(&self, address: &str, characteristic: Uuid, value: Vec<u8>) -> bool {
        if characteristic != self.session.descriptor().notify_characteristic {
            debug!("Ignoring notification on characteristic {}", characteristic);
            return false;
        }
        if !self.session.accepts_notification(address) {
            debug!("Ignoring notification from {} outside an active session", address);
            return false;
        }

        self.notifications
            .publish(&InboundMessage::new(characteristic, value));
        true
    }
}
