// ============================================
// File: crates/mowlink-transport/src/topics.rs
// ============================================
//! # Topic Naming
//!
//! ## Main Functionality
//! Per-device topic names under `/sys/{productKey}/{deviceName}/app/`.
//! Downlink topics are subscribed on every (re)connect; the bind topic
//! is the only uplink topic used.
//!
//! ## Last Modified
//! v0.1.0 - Initial topic set

/// Downlink topic suffixes subscribed for each connection.
const DOWN_SUFFIXES: &[&str] = &[
    "account/bind_reply",
    "thing/event/property/post_reply",
    "thing/wifi/status/notify",
    "thing/wifi/connect/event/notify",
    "_thing/event/notify",
    "thing/events",
    "thing/status",
    "thing/properties",
    "thing/model/down_raw",
];

/// Topic names for one provisioned client identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    /// Creates the topic set for `product_key` / `device_name`.
    #[must_use]
    pub fn new(product_key: &str, device_name: &str) -> Self {
        Self {
            base: format!("/sys/{product_key}/{device_name}/app"),
        }
    }

    /// Every downlink topic to subscribe to.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        DOWN_SUFFIXES
            .iter()
            .map(|suffix| format!("{}/down/{suffix}", self.base))
            .collect()
    }

    /// Uplink topic carrying the bind message.
    #[must_use]
    pub fn bind(&self) -> String {
        format!("{}/up/account/bind", self.base)
    }

    /// Downlink topic acknowledging the bind message.
    #[must_use]
    pub fn bind_reply(&self) -> String {
        format!("{}/down/account/bind_reply", self.base)
    }

    /// Returns `true` if `topic` acknowledges the bind message.
    #[must_use]
    pub fn is_bind_reply(&self, topic: &str) -> bool {
        topic == self.bind_reply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        let topics = Topics::new("pk", "dn");
        assert_eq!(topics.bind(), "/sys/pk/dn/app/up/account/bind");
        assert!(topics.is_bind_reply("/sys/pk/dn/app/down/account/bind_reply"));
        assert!(!topics.is_bind_reply("/sys/pk/dn/app/down/thing/events"));
    }

    #[test]
    fn test_subscriptions_cover_telemetry() {
        let subs = Topics::new("pk", "dn").subscriptions();
        assert_eq!(subs.len(), 9);
        for suffix in ["thing/events", "thing/properties", "thing/status", "thing/model/down_raw"] {
            assert!(subs.contains(&format!("/sys/pk/dn/app/down/{suffix}")));
        }
        assert!(subs.iter().all(|t| t.starts_with("/sys/pk/dn/app/down/")));
    }
}
