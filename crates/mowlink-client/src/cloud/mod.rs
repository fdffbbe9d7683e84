// ============================================
// File: crates/mowlink-client/src/cloud/mod.rs
// ============================================
//! # Cloud Access
//!
//! ## Creation Reason
//! HTTP plumbing shared by every authentication stage and by command
//! delivery.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`client`]: signing HTTP client for the gateway and OpenAccount hosts
//! - [`models`]: response payloads of each stage
//!
//! ## ⚠️ Important Note for Next Developer
//! - Models redact secrets in `Debug`; keep it that way when adding fields
//!
//! ## Last Modified
//! v0.1.0 - Initial cloud module

pub mod client;
pub mod models;

pub use client::CloudClient;
pub use models::{
    AccountLogin, BoundDevice, ConnectResult, DevicePage, OAuthLoginResult, ProvisionedIdentity,
    RegionEndpoints, SessionGrant,
};
