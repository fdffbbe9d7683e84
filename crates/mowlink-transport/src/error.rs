// ============================================
// File: crates/mowlink-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types specific to the broker link: credential
//! derivation, connection setup and publishing.
//!
//! ## Error Categories
//! 1. **Link Errors**: publish/subscribe failures, link not up
//! 2. **Configuration Errors**: incomplete identity, bad settings
//! 3. **Lifecycle Errors**: link already shut down
//!
//! ## ⚠️ Important Note for Next Developer
//! - Link errors are transient; the event loop reconnects by itself
//! - Never put the device secret or iot token in an error message
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use mowlink_common::error::CommonError;
use mowlink_core::error::CoreError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Broker link error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Link Errors
    // ========================================

    /// Publish could not be queued.
    #[error("Failed to publish to {topic}: {reason}")]
    PublishFailed {
        /// Destination topic
        topic: String,
        /// Why publish failed
        reason: String,
    },

    /// Subscribe could not be queued.
    #[error("Failed to subscribe to {topic}: {reason}")]
    SubscribeFailed {
        /// Topic filter
        topic: String,
        /// Why subscribe failed
        reason: String,
    },

    /// The broker link is not up.
    #[error("Broker link not connected")]
    NotConnected,

    /// Event loop reported a connection failure.
    #[error("Broker connection error: {reason}")]
    Connection {
        /// Underlying connection error
        reason: String,
    },

    // ========================================
    // Configuration Errors
    // ========================================

    /// Invalid configuration.
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Configuration field name
        field: String,
        /// Why it's invalid
        reason: String,
    },

    // ========================================
    // Lifecycle Errors
    // ========================================

    /// The link has been shut down.
    #[error("Transport is shutting down")]
    ShuttingDown,

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `PublishFailed` error.
    pub fn publish_failed(topic: impl Into<String>, reason: impl ToString) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `SubscribeFailed` error.
    pub fn subscribe_failed(topic: impl Into<String>, reason: impl ToString) -> Self {
        Self::SubscribeFailed {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `Connection` error.
    pub fn connection(reason: impl ToString) -> Self {
        Self::Connection {
            reason: reason.to_string(),
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error is transient and retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PublishFailed { .. }
                | Self::SubscribeFailed { .. }
                | Self::NotConnected
                | Self::Connection { .. }
        )
    }

    /// Returns `true` if the link cannot be used any more.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::publish_failed("/sys/pk/dn/app/up/account/bind", "queue full");
        assert!(err.to_string().contains("account/bind"));
        assert!(err.to_string().contains("queue full"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(TransportError::NotConnected.is_retryable());
        assert!(TransportError::connection("reset").is_retryable());
        assert!(!TransportError::ShuttingDown.is_retryable());
        assert!(!TransportError::invalid_config("port", "zero").is_retryable());
    }

    #[test]
    fn test_is_closed() {
        assert!(TransportError::ShuttingDown.is_closed());
        assert!(!TransportError::NotConnected.is_closed());
    }
}
