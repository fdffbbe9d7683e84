// ============================================
// File: crates/mowlink-core/src/protocol/luba.rs
// ============================================
//! # Device Message Schema
//!
//! ## Creation Reason
//! Wire schema for the binary messages exchanged with the mower's main
//! controller. Only the messages needed for motion, report
//! configuration, BLE sync and device reports are declared; prost skips
//! any other field it encounters while decoding.
//!
//! ## Wire Layout
//! ```text
//! LubaMsg
//! ├── header: msgtype, sender, rcver, msgattr, seqs, version, subtype, timestamp
//! └── sub_msg (oneof)
//!     ├── net    (8)  DevNet      { todev_ble_sync }
//!     ├── sys    (9)  MctlSys     { todev_report_cfg | toapp_report_data }
//!     ├── nav    (10) MctlNav     { }
//!     └── driver (11) MctlDriver  { todev_devmotion_ctrl }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Field numbers are the device contract; never renumber
//! - Add new fields with fresh tags only
//!
//! ## Last Modified
//! v0.1.0 - Initial schema

#![allow(missing_docs)]

// ============================================
// Header Enumerations
// ============================================

/// Subsystem addressed by a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MsgCmdType {
    Start = 0,
    EmbedDriver = 243,
    EmbedSys = 244,
    EmbedMidware = 245,
    EmbedOta = 246,
    ApplicationOta = 247,
    Esp = 248,
    Nav = 240,
}

/// Endpoint on either side of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MsgDevice {
    DevCommEsp = 1,
    DevMainctl = 2,
    DevLeftmotor = 3,
    DevRightmotor = 4,
    DevBaseStation = 5,
    DevRtkcli = 6,
    DevUsbhost = 7,
    DevMobileapp = 8,
    DevIotServer = 9,
    DevBms = 10,
}

/// Message attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MsgAttr {
    None = 0,
    Req = 1,
    Resp = 2,
    Report = 3,
}

// ============================================
// Envelope
// ============================================

/// Outer envelope of every device message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LubaMsg {
    #[prost(enumeration = "MsgCmdType", tag = "1")]
    pub msgtype: i32,
    #[prost(enumeration = "MsgDevice", tag = "2")]
    pub sender: i32,
    #[prost(enumeration = "MsgDevice", tag = "3")]
    pub rcver: i32,
    #[prost(enumeration = "MsgAttr", tag = "4")]
    pub msgattr: i32,
    #[prost(int32, tag = "5")]
    pub seqs: i32,
    #[prost(int32, tag = "6")]
    pub version: i32,
    #[prost(int32, tag = "7")]
    pub subtype: i32,
    #[prost(uint64, tag = "15")]
    pub timestamp: u64,
    #[prost(oneof = "luba_msg::SubMsg", tags = "8, 9, 10, 11")]
    pub sub_msg: ::core::option::Option<luba_msg::SubMsg>,
}

/// Nested types for [`LubaMsg`].
pub mod luba_msg {
    /// Subsystem payload carried by the envelope.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum SubMsg {
        #[prost(message, tag = "8")]
        Net(super::DevNet),
        #[prost(message, tag = "9")]
        Sys(super::MctlSys),
        #[prost(message, tag = "10")]
        Nav(super::MctlNav),
        #[prost(message, tag = "11")]
        Driver(super::MctlDriver),
    }
}

// ============================================
// Net Subsystem
// ============================================

/// Network coprocessor messages.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DevNet {
    #[prost(oneof = "dev_net::NetSubType", tags = "1")]
    pub net_sub_type: ::core::option::Option<dev_net::NetSubType>,
}

/// Nested types for [`DevNet`].
pub mod dev_net {
    /// Network message selector.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum NetSubType {
        #[prost(int32, tag = "1")]
        TodevBleSync(i32),
    }
}

// ============================================
// Driver Subsystem
// ============================================

/// Drive motor messages.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MctlDriver {
    #[prost(oneof = "mctl_driver::SubDrvMsg", tags = "1")]
    pub sub_drv_msg: ::core::option::Option<mctl_driver::SubDrvMsg>,
}

/// Nested types for [`MctlDriver`].
pub mod mctl_driver {
    /// Driver message selector.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum SubDrvMsg {
        #[prost(message, tag = "1")]
        TodevDevmotionCtrl(super::DrvMotionCtrl),
    }
}

/// Linear and angular speed set-point.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DrvMotionCtrl {
    #[prost(int32, tag = "1")]
    pub set_linear_speed: i32,
    #[prost(int32, tag = "2")]
    pub set_angular_speed: i32,
}

// ============================================
// Nav Subsystem
// ============================================

/// Navigation messages. No navigation payload is interpreted.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MctlNav {}

// ============================================
// Sys Subsystem
// ============================================

/// Main controller system messages.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MctlSys {
    #[prost(oneof = "mctl_sys::SubSysMsg", tags = "26, 27")]
    pub sub_sys_msg: ::core::option::Option<mctl_sys::SubSysMsg>,
}

/// Nested types for [`MctlSys`].
pub mod mctl_sys {
    /// System message selector.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum SubSysMsg {
        #[prost(message, tag = "26")]
        TodevReportCfg(super::ReportInfoCfg),
        #[prost(message, tag = "27")]
        ToappReportData(super::ReportInfoData),
    }
}

/// Report subscription action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RptAct {
    RptStart = 0,
    RptStop = 1,
    RptKeep = 2,
}

/// Report subsystems a subscription may include.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RptInfoType {
    RitConnect = 0,
    RitDevSta = 1,
    RitRtk = 2,
    RitDevLocal = 3,
    RitWork = 4,
    RitFwInfo = 5,
    RitMaintain = 6,
}

impl RptInfoType {
    /// Every report subsystem, in wire order.
    pub const ALL: [Self; 7] = [
        Self::RitConnect,
        Self::RitDevSta,
        Self::RitRtk,
        Self::RitDevLocal,
        Self::RitWork,
        Self::RitFwInfo,
        Self::RitMaintain,
    ];
}

/// Report subscription request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportInfoCfg {
    #[prost(enumeration = "RptAct", tag = "1")]
    pub act: i32,
    #[prost(int32, tag = "2")]
    pub timeout: i32,
    #[prost(int32, tag = "3")]
    pub period: i32,
    #[prost(int32, tag = "4")]
    pub no_change_period: i32,
    #[prost(int32, tag = "5")]
    pub count: i32,
    #[prost(enumeration = "RptInfoType", repeated, tag = "6")]
    pub sub: ::prost::alloc::vec::Vec<i32>,
}

/// Periodic device report.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportInfoData {
    #[prost(message, optional, tag = "2")]
    pub dev: ::core::option::Option<RptDevStatus>,
    #[prost(message, optional, tag = "3")]
    pub rtk: ::core::option::Option<RptRtk>,
    #[prost(message, repeated, tag = "4")]
    pub locations: ::prost::alloc::vec::Vec<RptDevLocation>,
}

/// Device status block of a report.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RptDevStatus {
    #[prost(int32, tag = "1")]
    pub sys_status: i32,
    #[prost(int32, tag = "2")]
    pub charge_state: i32,
    #[prost(int32, tag = "3")]
    pub battery_val: i32,
}

/// RTK receiver block of a report.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RptRtk {
    #[prost(int32, tag = "1")]
    pub status: i32,
    #[prost(int32, tag = "2")]
    pub pos_level: i32,
    #[prost(int32, tag = "3")]
    pub gps_stars: i32,
}

/// One location fix.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RptDevLocation {
    #[prost(int32, tag = "1")]
    pub real_pos_x: i32,
    #[prost(int32, tag = "2")]
    pub real_pos_y: i32,
    #[prost(int32, tag = "3")]
    pub real_toward: i32,
    #[prost(int32, tag = "4")]
    pub pos_type: i32,
}
