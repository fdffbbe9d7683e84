// ============================================
// File: crates/mowlink-client/src/services/device_state.rs
// ============================================
//! # Device State Model
//!
//! ## Creation Reason
//! Last-known battery, position and connectivity of each device the
//! client has heard from.
//!
//! ## State Lifecycle
//! ```text
//! ┌───────────────┐  first message  ┌──────┐
//! │ Uninitialized │────────────────►│ Live │
//! └───────────────┘                 └──────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `last_updated` never moves backwards, even for late messages
//! - This lock is separate from the pending-command lock; never hold
//!   both at once
//!
//! ## Last Modified
//! v0.1.0 - Initial device state model

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use mowlink_common::time::Timestamp;
use mowlink_common::types::IotId;
use mowlink_core::protocol::{FixQuality, LocationFix};

// ============================================
// Position
// ============================================

/// Position of a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Heading
    pub heading: f64,
    /// GNSS fix quality
    pub fix_quality: FixQuality,
}

impl From<LocationFix> for Position {
    fn from(fix: LocationFix) -> Self {
        Self {
            x: fix.x,
            y: fix.y,
            heading: fix.heading,
            fix_quality: fix.fix_quality,
        }
    }
}

// ============================================
// DeviceState
// ============================================

/// Last-known state of one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceState {
    /// Battery percentage
    pub battery: Option<u8>,
    /// Last position
    pub position: Option<Position>,
    /// Connectivity as last reported by the platform
    pub online: Option<bool>,
    /// Time of the newest message applied
    pub last_updated: Option<Timestamp>,
}

impl DeviceState {
    /// Returns `true` once any message has been applied.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.last_updated.is_some()
    }

    fn touch(&mut self, at: Timestamp) {
        self.last_updated = Some(self.last_updated.map_or(at, |prev| prev.max(at)));
    }
}

// ============================================
// DeviceStateModel
// ============================================

/// State of every device heard from, keyed by iot id.
#[derive(Debug, Default)]
pub struct DeviceStateModel {
    states: RwLock<HashMap<IotId, DeviceState>>,
}

impl DeviceStateModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one device.
    #[must_use]
    pub fn get(&self, iot_id: &IotId) -> Option<DeviceState> {
        self.states.read().get(iot_id).cloned()
    }

    /// Devices currently tracked.
    #[must_use]
    pub fn devices(&self) -> Vec<IotId> {
        self.states.read().keys().cloned().collect()
    }

    fn update<F>(&self, iot_id: &IotId, at: Timestamp, apply: F)
    where
        F: FnOnce(&mut DeviceState),
    {
        let mut states = self.states.write();
        let state = states.entry(iot_id.clone()).or_default();
        apply(state);
        state.touch(at);
    }

    /// Records a battery percentage.
    pub fn set_battery(&self, iot_id: &IotId, percent: u8, at: Timestamp) {
        self.update(iot_id, at, |s| s.battery = Some(percent));
    }

    /// Records a position.
    pub fn set_position(&self, iot_id: &IotId, position: Position, at: Timestamp) {
        self.update(iot_id, at, |s| s.position = Some(position));
    }

    /// Records connectivity.
    pub fn set_online(&self, iot_id: &IotId, online: bool, at: Timestamp) {
        self.update(iot_id, at, |s| s.online = Some(online));
    }

    /// Marks the device as heard from without changing anything else.
    pub fn touch(&self, iot_id: &IotId, at: Timestamp) {
        self.update(iot_id, at, |_| {});
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> IotId {
        IotId::parse("dev-1").unwrap()
    }

    #[test]
    fn test_first_message_makes_live() {
        let model = DeviceStateModel::new();
        assert!(model.get(&id()).is_none());

        model.set_battery(&id(), 76, Timestamp::from_millis(1000));
        let state = model.get(&id()).unwrap();
        assert!(state.is_live());
        assert_eq!(state.battery, Some(76));
        assert_eq!(model.devices(), vec![id()]);
    }

    #[test]
    fn test_last_updated_never_decreases() {
        let model = DeviceStateModel::new();
        model.set_battery(&id(), 50, Timestamp::from_millis(2000));
        model.set_battery(&id(), 49, Timestamp::from_millis(1000));

        let state = model.get(&id()).unwrap();
        assert_eq!(state.battery, Some(49));
        assert_eq!(state.last_updated, Some(Timestamp::from_millis(2000)));

        model.set_online(&id(), true, Timestamp::from_millis(3000));
        assert_eq!(
            model.get(&id()).unwrap().last_updated,
            Some(Timestamp::from_millis(3000))
        );
    }

    #[test]
    fn test_position_from_fix() {
        let model = DeviceStateModel::new();
        let fix = LocationFix {
            x: 1.5,
            y: -2.0,
            heading: 180.0,
            fix_quality: FixQuality::RtkFloat,
        };
        model.set_position(&id(), fix.into(), Timestamp::from_millis(1));
        let position = model.get(&id()).unwrap().position.unwrap();
        assert_eq!((position.x, position.y, position.heading), (1.5, -2.0, 180.0));
        assert_eq!(position.fix_quality.to_string(), "RTK float");
    }
}
