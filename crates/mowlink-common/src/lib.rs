// ============================================
// File: crates/mowlink-common/src/lib.rs
// ============================================
//! # mowlink Common - Shared Utilities Library
//!
//! ## Creation Reason
//! Provides foundational types and utilities shared across all mowlink
//! crates, so identifiers and timestamps mean the same thing everywhere.
//!
//! ## Main Functionality
//! - [`types`]: Identifier newtypes (`IotId`), secret holders, device identity
//! - [`time`]: Millisecond timestamps and the date formats the cloud expects
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                mowlink-client                       │
//! │                      │                              │
//! │           ┌──────────┴──────────┐                   │
//! │           ▼                     ▼                   │
//! │     mowlink-core  ◄───  mowlink-transport           │
//! │           │                     │                   │
//! │           └──────────┬──────────┘                   │
//! │                      ▼                              │
//! │               mowlink-common  ◄── You are here      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Keep dependencies minimal
//! - Secret-bearing types must zeroize on drop and never print their value
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use time::Timestamp;
pub use types::{DeviceIdentity, DeviceSecret, IotId};
