// ============================================
// File: crates/mowlink-core/src/protocol/mod.rs
// ============================================
//! # Binary Device Protocol
//!
//! ## Main Functionality
//! - [`luba`]: prost message definitions
//! - [`command`]: typed commands and report decoding
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol module

pub mod command;
pub mod luba;

pub use command::{decode_motion, DeviceCommand, DeviceReport, FixQuality, LocationFix};
