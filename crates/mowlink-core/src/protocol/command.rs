// ============================================
// File: crates/mowlink-core/src/protocol/command.rs
// ============================================
//! # Device Commands & Reports
//!
//! ## Creation Reason
//! Typed front door to the binary schema in [`super::luba`]. Callers build
//! a [`DeviceCommand`] and get wire bytes back; inbound report bytes come
//! out as a [`DeviceReport`].
//!
//! ## Main Functionality
//! - `DeviceCommand`: motion, report configuration, BLE sync
//! - `DeviceCommand::encode()`: deterministic for a given timestamp
//! - `decode_motion()`: reads a motion set-point back out of wire bytes
//! - `DeviceReport::decode()`: battery and first location fix
//! - `FixQuality`: GNSS fix classification
//!
//! ## ⚠️ Important Note for Next Developer
//! - Motion speeds are clamped, not rejected
//! - Position values are forwarded unscaled
//!
//! ## Last Modified
//! v0.1.0 - Initial command vocabulary

use std::fmt;

use prost::Message;
use serde::{Deserialize, Serialize};

use super::luba::{
    dev_net, luba_msg, mctl_driver, mctl_sys, DevNet, DrvMotionCtrl, LubaMsg, MctlDriver, MctlSys,
    MsgAttr, MsgCmdType, MsgDevice, ReportInfoCfg, RptAct, RptInfoType,
};
use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Largest accepted linear speed magnitude.
pub const MAX_LINEAR_SPEED: i32 = 1000;

/// Largest accepted angular speed magnitude.
pub const MAX_ANGULAR_SPEED: i32 = 450;

/// Sync type used by the periodic BLE sync.
pub const DEFAULT_BLE_SYNC_TYPE: i32 = 3;

/// `count` sent with a report subscription; zero is dropped from the wire.
const REPORT_COUNT: i32 = 1;

// ============================================
// DeviceCommand
// ============================================

/// A command the controller can send to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Drive set-point.
    Motion {
        /// Linear speed, clamped to ±[`MAX_LINEAR_SPEED`]
        linear: i32,
        /// Angular speed, clamped to ±[`MAX_ANGULAR_SPEED`]
        angular: i32,
    },
    /// Subscribe to periodic reports from every report subsystem.
    ReportConfig {
        /// Subscription lifetime in milliseconds
        timeout: i32,
        /// Report period in milliseconds
        period: i32,
        /// Report period in milliseconds when nothing changed
        no_change_period: i32,
    },
    /// Ask the network coprocessor to resynchronise.
    BleSync {
        /// Sync type code
        sync_type: i32,
    },
}

impl DeviceCommand {
    /// Motion command with both speeds clamped into range.
    #[must_use]
    pub fn motion(linear: i32, angular: i32) -> Self {
        Self::Motion {
            linear: linear.clamp(-MAX_LINEAR_SPEED, MAX_LINEAR_SPEED),
            angular: angular.clamp(-MAX_ANGULAR_SPEED, MAX_ANGULAR_SPEED),
        }
    }

    /// Zero-speed motion command.
    #[must_use]
    pub const fn stop() -> Self {
        Self::Motion {
            linear: 0,
            angular: 0,
        }
    }

    /// Report subscription with the usual defaults.
    #[must_use]
    pub const fn report_config() -> Self {
        Self::ReportConfig {
            timeout: 300_000,
            period: 500,
            no_change_period: 1000,
        }
    }

    /// BLE sync with the default sync type.
    #[must_use]
    pub const fn ble_sync() -> Self {
        Self::BleSync {
            sync_type: DEFAULT_BLE_SYNC_TYPE,
        }
    }

    /// Stable name used in logs and errors.
    #[must_use]
    pub const fn opcode(&self) -> &'static str {
        match self {
            Self::Motion { .. } => "todev_devmotion_ctrl",
            Self::ReportConfig { .. } => "todev_report_cfg",
            Self::BleSync { .. } => "todev_ble_sync",
        }
    }

    /// Builds the envelope for this command.
    #[must_use]
    pub fn to_message(&self, timestamp_ms: u64) -> LubaMsg {
        let (msgtype, rcver, sub_msg) = match *self {
            Self::Motion { linear, angular } => (
                MsgCmdType::EmbedDriver,
                MsgDevice::DevMainctl,
                luba_msg::SubMsg::Driver(MctlDriver {
                    sub_drv_msg: Some(mctl_driver::SubDrvMsg::TodevDevmotionCtrl(DrvMotionCtrl {
                        set_linear_speed: linear,
                        set_angular_speed: angular,
                    })),
                }),
            ),
            Self::ReportConfig {
                timeout,
                period,
                no_change_period,
            } => (
                MsgCmdType::EmbedSys,
                MsgDevice::DevMainctl,
                luba_msg::SubMsg::Sys(MctlSys {
                    sub_sys_msg: Some(mctl_sys::SubSysMsg::TodevReportCfg(ReportInfoCfg {
                        act: RptAct::RptStart as i32,
                        timeout,
                        period,
                        no_change_period,
                        count: REPORT_COUNT,
                        sub: RptInfoType::ALL.iter().map(|t| *t as i32).collect(),
                    })),
                }),
            ),
            Self::BleSync { sync_type } => (
                MsgCmdType::Esp,
                MsgDevice::DevCommEsp,
                luba_msg::SubMsg::Net(DevNet {
                    net_sub_type: Some(dev_net::NetSubType::TodevBleSync(sync_type)),
                }),
            ),
        };

        LubaMsg {
            msgtype: msgtype as i32,
            sender: MsgDevice::DevMobileapp as i32,
            rcver: rcver as i32,
            msgattr: MsgAttr::Req as i32,
            seqs: 1,
            version: 1,
            subtype: 1,
            timestamp: timestamp_ms,
            sub_msg: Some(sub_msg),
        }
    }

    /// Encodes this command to wire bytes.
    #[must_use]
    pub fn encode(&self, timestamp_ms: u64) -> Vec<u8> {
        self.to_message(timestamp_ms).encode_to_vec()
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Motion { linear, angular } => {
                write!(f, "motion(linear={linear}, angular={angular})")
            }
            Self::ReportConfig { period, .. } => write!(f, "report_config(period={period}ms)"),
            Self::BleSync { sync_type } => write!(f, "ble_sync({sync_type})"),
        }
    }
}

/// Reads the motion set-point out of encoded command bytes.
///
/// # Errors
/// Returns `MalformedProtobuf` for undecodable bytes and `MissingField`
/// when the message is not a motion command.
pub fn decode_motion(bytes: &[u8]) -> Result<(i32, i32)> {
    let msg = LubaMsg::decode(bytes)?;
    match msg.sub_msg {
        Some(luba_msg::SubMsg::Driver(MctlDriver {
            sub_drv_msg: Some(mctl_driver::SubDrvMsg::TodevDevmotionCtrl(ctrl)),
        })) => Ok((ctrl.set_linear_speed, ctrl.set_angular_speed)),
        _ => Err(CoreError::missing("driver.todev_devmotion_ctrl")),
    }
}

// ============================================
// FixQuality
// ============================================

/// GNSS fix classification reported with a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixQuality {
    /// Standalone GPS
    Gps,
    /// Differential GPS
    Dgps,
    /// RTK with fixed ambiguities
    RtkFixed,
    /// RTK with float ambiguities
    RtkFloat,
    /// Any other code
    Other(i32),
}

impl FixQuality {
    /// Maps a raw position-type code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Gps,
            1 => Self::Dgps,
            4 => Self::RtkFixed,
            5 => Self::RtkFloat,
            other => Self::Other(other),
        }
    }

    /// Raw position-type code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Gps => 0,
            Self::Dgps => 1,
            Self::RtkFixed => 4,
            Self::RtkFloat => 5,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for FixQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gps => write!(f, "standalone GPS"),
            Self::Dgps => write!(f, "DGPS"),
            Self::RtkFixed => write!(f, "RTK fixed"),
            Self::RtkFloat => write!(f, "RTK float"),
            Self::Other(code) => write!(f, "unknown ({code})"),
        }
    }
}

// ============================================
// DeviceReport
// ============================================

/// A single position sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Heading
    pub heading: f64,
    /// Fix quality
    pub fix_quality: FixQuality,
}

/// The parts of a device report the controller consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceReport {
    /// Battery percentage, when the report carries a status block
    pub battery: Option<u8>,
    /// First location fix, when present
    pub location: Option<LocationFix>,
}

impl DeviceReport {
    /// Decodes report bytes.
    ///
    /// Messages that are valid but carry no report data decode to an
    /// empty report.
    ///
    /// # Errors
    /// Returns `MalformedProtobuf` for undecodable bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let msg = LubaMsg::decode(bytes)?;
        let Some(luba_msg::SubMsg::Sys(MctlSys {
            sub_sys_msg: Some(mctl_sys::SubSysMsg::ToappReportData(data)),
        })) = msg.sub_msg
        else {
            return Ok(Self::default());
        };

        let battery = data
            .dev
            .map(|dev| u8::try_from(dev.battery_val.clamp(0, 100)).unwrap_or_default());
        let location = data.locations.first().map(|loc| LocationFix {
            x: f64::from(loc.real_pos_x),
            y: f64::from(loc.real_pos_y),
            heading: f64::from(loc.real_toward),
            fix_quality: FixQuality::from_code(loc.pos_type),
        });

        Ok(Self { battery, location })
    }

    /// Returns `true` if nothing usable was decoded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.battery.is_none() && self.location.is_none()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::luba::{ReportInfoData, RptDevLocation, RptDevStatus};

    fn report_bytes(battery: Option<i32>, locations: Vec<RptDevLocation>) -> Vec<u8> {
        LubaMsg {
            msgtype: MsgCmdType::EmbedSys as i32,
            sender: MsgDevice::DevMainctl as i32,
            rcver: MsgDevice::DevMobileapp as i32,
            sub_msg: Some(luba_msg::SubMsg::Sys(MctlSys {
                sub_sys_msg: Some(mctl_sys::SubSysMsg::ToappReportData(ReportInfoData {
                    dev: battery.map(|battery_val| RptDevStatus {
                        battery_val,
                        ..Default::default()
                    }),
                    rtk: None,
                    locations,
                })),
            })),
            ..Default::default()
        }
        .encode_to_vec()
    }

    #[test]
    fn test_motion_round_trip() {
        let bytes = DeviceCommand::motion(1000, 0).encode(1_700_000_000_000);
        assert_eq!(decode_motion(&bytes).unwrap(), (1000, 0));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let ts = 1_700_000_000_000;
        assert_eq!(DeviceCommand::stop().encode(ts), DeviceCommand::stop().encode(ts));
        assert_eq!(decode_motion(&DeviceCommand::stop().encode(ts)).unwrap(), (0, 0));
    }

    #[test]
    fn test_motion_clamped() {
        assert_eq!(
            DeviceCommand::motion(5000, -900),
            DeviceCommand::Motion {
                linear: 1000,
                angular: -450
            }
        );
    }

    #[test]
    fn test_envelope_header() {
        let msg = DeviceCommand::ble_sync().to_message(42);
        assert_eq!(msg.msgtype, MsgCmdType::Esp as i32);
        assert_eq!(msg.sender, MsgDevice::DevMobileapp as i32);
        assert_eq!(msg.rcver, MsgDevice::DevCommEsp as i32);
        assert_eq!(msg.msgattr, MsgAttr::Req as i32);
        assert_eq!(msg.timestamp, 42);
    }

    #[test]
    fn test_report_config_subscribes_everything() {
        let wire = DeviceCommand::report_config().encode(0);
        let msg = LubaMsg::decode(wire.as_slice()).unwrap();
        let Some(luba_msg::SubMsg::Sys(MctlSys {
            sub_sys_msg: Some(mctl_sys::SubSysMsg::TodevReportCfg(cfg)),
        })) = msg.sub_msg
        else {
            panic!("expected report config");
        };
        assert_eq!(cfg.sub.len(), RptInfoType::ALL.len());
        assert_eq!(cfg.timeout, 300_000);
        assert_eq!(cfg.period, 500);
        assert_eq!(cfg.count, 1);
        assert_eq!(cfg.act, RptAct::RptStart as i32);
    }

    #[test]
    fn test_decode_motion_rejects_other_commands() {
        let bytes = DeviceCommand::ble_sync().encode(0);
        assert!(decode_motion(&bytes).unwrap_err().is_decode_error());
    }

    #[test]
    fn test_report_decode() {
        let bytes = report_bytes(
            Some(76),
            vec![
                RptDevLocation {
                    real_pos_x: 120,
                    real_pos_y: 45,
                    real_toward: 90,
                    pos_type: 4,
                },
                RptDevLocation {
                    real_pos_x: 1,
                    ..Default::default()
                },
            ],
        );
        let report = DeviceReport::decode(&bytes).unwrap();
        assert_eq!(report.battery, Some(76));
        let fix = report.location.unwrap();
        assert_eq!((fix.x, fix.y, fix.heading), (120.0, 45.0, 90.0));
        assert_eq!(fix.fix_quality, FixQuality::RtkFixed);
        assert_eq!(fix.fix_quality.to_string(), "RTK fixed");
    }

    #[test]
    fn test_report_without_data_is_empty() {
        let report = DeviceReport::decode(&DeviceCommand::stop().encode(0)).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_report_decode_garbage() {
        let err = DeviceReport::decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_fix_quality_codes() {
        assert_eq!(FixQuality::from_code(5), FixQuality::RtkFloat);
        assert_eq!(FixQuality::from_code(9), FixQuality::Other(9));
        assert_eq!(FixQuality::from_code(1).code(), 1);
        assert_eq!(FixQuality::Gps.to_string(), "standalone GPS");
    }
}
