// ============================================
// File: crates/mowlink-transport/src/traits.rs
// ============================================
//! # Broker Traits
//!
//! ## Creation Reason
//! Defines the interface the client layer uses to talk to the broker, so
//! dispatch and correlation logic can run against an in-memory double.
//!
//! ## Main Functionality
//! - `Broker`: publish, token swap, link state, disconnect
//! - `BrokerEvent`: link lifecycle and inbound messages
//! - `LinkState`: Disconnected → Connected → Ready
//! - `BrokerSettings`: connection parameters with builder and validation
//!
//! ## ⚠️ Important Note for Next Developer
//! - Implementations must be Send + Sync
//! - `publish` is fire-and-forget; delivery is not confirmed
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, TransportError};

// ============================================
// LinkState
// ============================================

/// Lifecycle of the broker link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// No transport connection
    Disconnected,
    /// Transport connected, bind not yet acknowledged
    Connected,
    /// Bind acknowledged (or bind timeout elapsed)
    Ready,
}

impl LinkState {
    /// Returns `true` once the transport is up.
    #[must_use]
    pub const fn is_up(self) -> bool {
        matches!(self, Self::Connected | Self::Ready)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

// ============================================
// BrokerEvent
// ============================================

/// Events emitted by a broker link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Transport connected and subscriptions requested
    Connected,
    /// Bind acknowledged or bind timeout elapsed
    Ready,
    /// Transport lost; reconnect is in progress
    Disconnected {
        /// Why the link dropped
        reason: String,
    },
    /// Inbound publish
    Message {
        /// Topic the message arrived on
        topic: String,
        /// Raw payload
        payload: Vec<u8>,
    },
}

// ============================================
// Broker Trait
// ============================================

/// Abstract interface to the publish/subscribe broker.
///
/// # Example
/// ```ignore
/// async fn rebind<B: Broker>(broker: &B, token: String) -> Result<()> {
///     broker.set_iot_token(token);
///     broker.publish("/sys/pk/dn/app/up/account/bind", b"{}".to_vec()).await
/// }
/// ```
#[async_trait]
pub trait Broker: Send + Sync {
    /// Queues `payload` for publication on `topic`.
    ///
    /// # Errors
    /// Returns `PublishFailed` if the request cannot be queued and
    /// `ShuttingDown` after `disconnect`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Replaces the iot token used for bind messages.
    ///
    /// When the link is up a new bind is published immediately; later
    /// reconnects bind with the new token.
    fn set_iot_token(&self, token: String);

    /// Current link state.
    fn state(&self) -> LinkState;

    /// Closes the link and stops reconnecting.
    ///
    /// # Errors
    /// Returns an error if the disconnect request cannot be sent.
    async fn disconnect(&self) -> Result<()>;
}

// ============================================
// BrokerSettings
// ============================================

/// Default broker port (MQTT over TLS).
pub const DEFAULT_PORT: u16 = 8883;

/// Connection parameters for a broker link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Region id from region discovery
    pub region_id: String,
    /// Client id registered with the cloud platform
    pub cloud_client_id: String,
    /// Host override, used instead of the per-product host when set
    pub host: Option<String>,
    /// Broker port
    pub port: u16,
    /// Whether to use TLS
    pub tls: bool,
    /// MQTT keep-alive
    pub keep_alive: Duration,
    /// Readiness fallback when no bind reply arrives
    pub bind_timeout: Duration,
    /// First reconnect delay
    pub backoff_initial: Duration,
    /// Largest reconnect delay
    pub backoff_max: Duration,
    /// Capacity of the request and event channels
    pub channel_capacity: usize,
}

impl BrokerSettings {
    /// Creates settings with defaults for `region_id`.
    #[must_use]
    pub fn new(region_id: impl Into<String>, cloud_client_id: impl Into<String>) -> Self {
        Self {
            region_id: region_id.into(),
            cloud_client_id: cloud_client_id.into(),
            ..Self::default()
        }
    }

    /// Sets a host override.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables or disables TLS.
    #[must_use]
    pub const fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the bind timeout.
    #[must_use]
    pub const fn with_bind_timeout(mut self, timeout: Duration) -> Self {
        self.bind_timeout = timeout;
        self
    }

    /// Sets the reconnect backoff bounds.
    #[must_use]
    pub const fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff_initial = initial;
        self.backoff_max = max;
        self
    }

    /// Host for `product_key`, honouring the override.
    #[must_use]
    pub fn host_for(&self, product_key: &str) -> String {
        self.host.clone().unwrap_or_else(|| {
            format!("{product_key}.iot-as-mqtt.{}.aliyuncs.com", self.region_id)
        })
    }

    /// Validates the settings.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_none() && self.region_id.is_empty() {
            return Err(TransportError::invalid_config(
                "region_id",
                "required when no host override is set",
            ));
        }
        if self.port == 0 {
            return Err(TransportError::invalid_config("port", "cannot be zero"));
        }
        if self.keep_alive < Duration::from_secs(5) {
            return Err(TransportError::invalid_config("keep_alive", "must be at least 5s"));
        }
        if self.backoff_initial.is_zero() || self.backoff_initial > self.backoff_max {
            return Err(TransportError::invalid_config(
                "backoff",
                "initial must be non-zero and not above max",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(TransportError::invalid_config("channel_capacity", "cannot be zero"));
        }
        Ok(())
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            region_id: String::new(),
            cloud_client_id: String::new(),
            host: None,
            port: DEFAULT_PORT,
            tls: true,
            keep_alive: Duration::from_secs(120),
            bind_timeout: Duration::from_secs(5),
            backoff_initial: Duration::from_millis(100),
            backoff_max: Duration::from_secs(30),
            channel_capacity: 100,
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_state() {
        assert!(!LinkState::Disconnected.is_up());
        assert!(LinkState::Connected.is_up());
        assert!(LinkState::Ready.is_up());
        assert_eq!(LinkState::Ready.to_string(), "ready");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = BrokerSettings::new("cn-shanghai", "C1");
        assert_eq!(settings.port, 8883);
        assert!(settings.tls);
        assert_eq!(settings.keep_alive, Duration::from_secs(120));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_host_for() {
        let settings = BrokerSettings::new("eu-central-1", "C1");
        assert_eq!(settings.host_for("a1pk"), "a1pk.iot-as-mqtt.eu-central-1.aliyuncs.com");

        let settings = settings.with_host("127.0.0.1").with_port(1883).with_tls(false);
        assert_eq!(settings.host_for("a1pk"), "127.0.0.1");
    }

    #[test]
    fn test_settings_validation() {
        assert!(BrokerSettings::default().validate().is_err());
        assert!(BrokerSettings::new("r", "c").with_port(0).validate().is_err());
        assert!(BrokerSettings::new("r", "c")
            .with_backoff(Duration::from_secs(60), Duration::from_secs(1))
            .validate()
            .is_err());
    }
}
