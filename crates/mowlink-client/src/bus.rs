// ============================================
// File: crates/mowlink-client/src/bus.rs
// ============================================
//! # Event Bus
//!
//! ## Creation Reason
//! Typed publish/subscribe between the router, the controller and
//! whatever front end sits on top.
//!
//! ## Main Functionality
//! - `EventBus<E>`: synchronous fan-out in registration order
//! - `ClientEvent`: everything the client reports to subscribers
//!
//! ## ⚠️ Important Note for Next Developer
//! - A subscriber that errors or panics is logged and skipped; later
//!   subscribers still run
//! - Handlers run on the publishing task; keep them short and never
//!   block in them
//! - The subscriber list is snapshotted before dispatch, so handlers may
//!   subscribe or unsubscribe without deadlocking
//!
//! ## Last Modified
//! v0.1.0 - Initial event bus

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use mowlink_common::types::IotId;
use mowlink_core::telemetry::ThingEvent;

use crate::services::device_state::Position;

/// Error type subscribers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Handler<E> = Arc<dyn Fn(&E) -> Result<(), BoxError> + Send + Sync>;

// ============================================
// ClientEvent
// ============================================

/// Notification published by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Broker transport connected
    Connected,
    /// Broker bound and ready
    Ready,
    /// Broker link lost
    Disconnected {
        /// Cause as reported by the transport
        reason: String,
    },
    /// Battery percentage received
    BatteryChanged {
        /// Device
        iot_id: IotId,
        /// Percentage
        percent: u8,
    },
    /// Position received
    PositionChanged {
        /// Device
        iot_id: IotId,
        /// New position
        position: Position,
    },
    /// Event the client does not interpret itself
    Telemetry {
        /// Device
        iot_id: IotId,
        /// Typed event
        event: ThingEvent,
    },
    /// A background operation failed
    Error {
        /// What was being done
        operation: String,
        /// Failure text
        message: String,
    },
}

impl ClientEvent {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Disconnected { .. } => "disconnected",
            Self::BatteryChanged { .. } => "battery_changed",
            Self::PositionChanged { .. } => "position_changed",
            Self::Telemetry { .. } => "telemetry",
            Self::Error { .. } => "error",
        }
    }

    /// Builds an `Error` event.
    pub fn error(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Error {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

// ============================================
// EventBus
// ============================================

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Result of one [`EventBus::publish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Subscribers that returned `Ok`
    pub delivered: usize,
    /// Subscribers that returned an error or panicked
    pub failed: usize,
}

/// Ordered, failure-isolated fan-out of `E`.
pub struct EventBus<E> {
    subscribers: RwLock<Vec<(SubscriptionId, Handler<E>)>>,
    next_id: AtomicU64,
}

impl<E> EventBus<E> {
    /// Creates a bus without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `handler`; it runs after every earlier subscriber.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(handler)));
        id
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns `true` without subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every subscriber in registration order.
    pub fn publish(&self, event: &E) -> Dispatch {
        let handlers: Vec<Handler<E>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        let mut dispatch = Dispatch::default();
        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => dispatch.delivered += 1,
                Ok(Err(e)) => {
                    dispatch.failed += 1;
                    warn!(subscriber = index, error = %e, "Event subscriber failed");
                }
                Err(_) => {
                    dispatch.failed += 1;
                    warn!(subscriber = index, "Event subscriber panicked");
                }
            }
        }
        dispatch
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_registration_order() {
        let bus = EventBus::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |n| {
                seen.lock().push(format!("{tag}{n}"));
                Ok(())
            });
        }

        let dispatch = bus.publish(&7);
        assert_eq!(dispatch.delivered, 3);
        assert_eq!(*seen.lock(), vec!["a7", "b7", "c7"]);
    }

    #[test]
    fn test_failures_do_not_stop_dispatch() {
        let bus = EventBus::<u32>::new();
        let reached = Arc::new(Mutex::new(0));

        bus.subscribe(|_| Err("nope".into()));
        bus.subscribe(|_| panic!("subscriber bug"));
        {
            let reached = Arc::clone(&reached);
            bus.subscribe(move |_| {
                *reached.lock() += 1;
                Ok(())
            });
        }

        let dispatch = bus.publish(&1);
        assert_eq!(dispatch, Dispatch { delivered: 1, failed: 2 });
        assert_eq!(*reached.lock(), 1);

        // The panicking subscriber stays registered and is isolated again.
        let dispatch = bus.publish(&2);
        assert_eq!(dispatch.failed, 2);
        assert_eq!(*reached.lock(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::<ClientEvent>::new();
        let id = bus.subscribe(|_| Ok(()));
        assert_eq!(bus.len(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert!(bus.is_empty());
        assert_eq!(bus.publish(&ClientEvent::Ready).delivered, 0);
    }
}
