// ============================================
// File: crates/mowlink-transport/src/mock.rs
// ============================================
//! # Mock Broker Implementation
//!
//! ## Creation Reason
//! Provides an in-memory broker for testing dispatch, correlation and
//! controller logic without a network connection.
//!
//! ## Main Functionality
//! - Captures every publish for verification
//! - Records iot token swaps
//! - Settable link state and injectable failures
//! - `Notify`-based waiting for publishes
//!
//! ## Usage in Tests
//! ```
//! use mowlink_transport::mock::MockBroker;
//! use mowlink_transport::traits::Broker;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let broker = MockBroker::new();
//! broker.publish("/t", b"hi".to_vec()).await.unwrap();
//! assert_eq!(broker.take_published(), vec![("/t".to_string(), b"hi".to_vec())]);
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::{Broker, LinkState};

// ============================================
// MockBroker
// ============================================

/// In-memory broker for tests.
pub struct MockBroker {
    state: Mutex<LinkState>,
    published: Mutex<VecDeque<(String, Vec<u8>)>>,
    tokens: Mutex<Vec<String>>,
    fail_publish: AtomicBool,
    closed: AtomicBool,
    publish_notify: Notify,
}

impl MockBroker {
    /// Creates a mock broker in the `Ready` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LinkState::Ready),
            published: Mutex::new(VecDeque::new()),
            tokens: Mutex::new(Vec::new()),
            fail_publish: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            publish_notify: Notify::new(),
        }
    }

    /// Forces the reported link state.
    pub fn set_state(&self, state: LinkState) {
        *self.state.lock() = state;
    }

    /// Makes subsequent publishes fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Takes every captured publish.
    pub fn take_published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().drain(..).collect()
    }

    /// Number of captured publishes not yet taken.
    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }

    /// Every token passed to `set_iot_token`, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }

    /// Returns `true` once `disconnect` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` publishes are captured.
    pub async fn wait_for_publishes(&self, count: usize) {
        loop {
            let notified = self.publish_notify.notified();
            if self.published_count() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::ShuttingDown);
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::publish_failed(topic, "injected failure"));
        }
        self.published.lock().push_back((topic.to_string(), payload));
        self.publish_notify.notify_waiters();
        Ok(())
    }

    fn set_iot_token(&self, token: String) {
        self.tokens.lock().push(token);
    }

    fn state(&self) -> LinkState {
        *self.state.lock()
    }

    async fn disconnect(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.set_state(LinkState::Disconnected);
        Ok(())
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mock_captures_publishes() {
        let broker = MockBroker::new();
        broker.publish("/a", vec![1]).await.unwrap();
        broker.publish("/b", vec![2]).await.unwrap();

        let published = broker.take_published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, "/a");
        assert_eq!(broker.published_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_injected_failure() {
        let broker = MockBroker::new();
        broker.fail_publishes(true);
        assert!(broker.publish("/a", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_disconnect() {
        let broker = MockBroker::new();
        broker.disconnect().await.unwrap();
        assert!(broker.is_closed());
        assert_eq!(broker.state(), LinkState::Disconnected);
        assert!(matches!(
            broker.publish("/a", vec![]).await,
            Err(TransportError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_wait_for_publishes() {
        let broker = Arc::new(MockBroker::new());
        let publisher = Arc::clone(&broker);
        tokio::spawn(async move {
            publisher.publish("/a", vec![1]).await.unwrap();
        });
        broker.wait_for_publishes(1).await;
        assert_eq!(broker.published_count(), 1);
    }

    #[test]
    fn test_token_swaps_recorded() {
        let broker = MockBroker::new();
        broker.set_iot_token("t1".into());
        broker.set_iot_token("t2".into());
        assert_eq!(broker.tokens(), vec!["t1", "t2"]);
    }
}
