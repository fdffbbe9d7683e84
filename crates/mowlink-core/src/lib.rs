// ============================================
// File: crates/mowlink-core/src/lib.rs
// ============================================
//! # mowlink Core - Signing, Device Protocol & Telemetry Model
//!
//! ## Creation Reason
//! Holds every piece of logic that can be expressed as a pure function:
//! request canonicalization and HMAC signing, the binary device protocol,
//! and the classification of inbound JSON telemetry. Nothing in this
//! crate performs I/O.
//!
//! ## Main Functionality
//!
//! ### Signature Module ([`signature`])
//! - Header-canonical scheme (HMAC-SHA256, base64) for gateway requests
//! - Field-concatenation scheme (HMAC-SHA1, hex) for provisioning and
//!   broker credentials
//!
//! ### Protocol Module ([`protocol`])
//! - Protobuf envelope (`LubaMsg`) and the subsystem payloads we speak
//! - `DeviceCommand` encoders and `DeviceReport` decoding
//!
//! ### Telemetry Module ([`telemetry`])
//! - `ThingMessage` / `ThingEvent` tagged unions with explicit unknowns
//!
//! ### Envelope Module ([`envelope`])
//! - Cloud gateway JSON request/response envelope
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                mowlink-client                       │
//! │                      │                              │
//! │           ┌──────────┴──────────┐                   │
//! │           ▼                     ▼                   │
//! │     mowlink-core  ◄───  mowlink-transport           │
//! │     You are here                │                   │
//! │           │                     │                   │
//! │           └──────────┬──────────┘                   │
//! │                      ▼                              │
//! │               mowlink-common                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The remote side verifies signatures byte-for-byte. Keep the fixed
//!   vectors in `signature` passing after any change
//! - Protobuf field numbers are part of the device contract
//! - ALL HMAC code uses RustCrypto implementations
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod envelope;
pub mod error;
pub mod protocol;
pub mod signature;
pub mod telemetry;

// Re-export commonly used items
pub use envelope::{ApiResponse, IotApiRequest};
pub use error::{CoreError, Result};
pub use protocol::{DeviceCommand, DeviceReport, FixQuality, LocationFix};
pub use telemetry::{PropertySnapshot, ThingEvent, ThingMessage};
