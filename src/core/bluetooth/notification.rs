//! Notification fan-out
//! This module hands every inbound message from the peripheral to the observers
//! registered at the time it arrives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use tokio::sync::mpsc;

use crate::core::bluetooth::types::InboundMessage;

type Handler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Identifies one registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Multicast point for inbound messages
#[derive(Clone, Default)]
pub struct NotificationHandler {
    handlers: Arc<Mutex<Vec<(SubscriptionId, Handler)>>>,
    next_id: Arc<AtomicU64>,
}

impl NotificationHandler {
    /// Create a new NotificationHandler
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every message published from now on
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        debug!("Notification subscriber {:?} registered", id);
        id
    }

    /// Removes a handler. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        before != handlers.len()
    }

    /// Adapts the bus to a channel, for callers that want to await messages.
    /// The subscription is dropped once the receiver is gone.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |message| {
            let _ = tx.send(message.clone());
        });
        (id, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Delivers `message` to every current subscriber, in registration order
    pub fn publish(&self, message: &InboundMessage) {
        // Handlers run outside the lock so they may (un)subscribe.
        let handlers: Vec<Handler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        info!("Received data: {}", message.text());
        for handler in handlers {
            handler(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::UUID_CONTROL_NOTIFY_CHAR;

    fn message(payload: &[u8]) -> InboundMessage {
        InboundMessage::new(UUID_CONTROL_NOTIFY_CHAR, payload.to_vec())
    }

    #[test]
    fn delivers_to_all_subscribers_in_order() {
        let bus = NotificationHandler::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = seen.clone();
            bus.subscribe(move |m| seen.lock().unwrap().push(format!("{}:{}", tag, m.text())));
        }

        bus.publish(&message(b"1"));
        bus.publish(&message(b"2"));

        assert_eq!(*seen.lock().unwrap(), vec!["a:1", "b:1", "a:2", "b:2"]);
    }

    #[test]
    fn unsubscribed_handler_stops_receiving() {
        let bus = NotificationHandler::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let id = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&message(b"x"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&message(b"y"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn late_subscriber_gets_no_replay() {
        let bus = NotificationHandler::new();
        bus.publish(&message(b"early"));

        let (_, mut rx) = bus.subscribe_channel();
        bus.publish(&message(b"late"));

        assert_eq!(rx.try_recv().unwrap().payload, b"late".to_vec());
        assert!(rx.try_recv().is_err());
    }
}
