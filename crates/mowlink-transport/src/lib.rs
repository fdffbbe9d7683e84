// ============================================
// File: crates/mowlink-transport/src/lib.rs
// ============================================
//! # mowlink Transport - Broker Link Layer
//!
//! ## Creation Reason
//! Provides the publish/subscribe link to the platform broker: broker
//! credential derivation, topic naming, and an MQTT client that
//! reconnects, re-subscribes and re-binds on its own.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `Broker` trait, link events and settings
//! - [`mqtt`]: rumqttc-backed implementation
//! - [`credentials`]: username/password/client-id derivation
//! - [`topics`]: per-device topic names
//! - [`mock`]: in-memory broker for tests
//! - [`error`]: transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                mowlink-client                       │
//! │                      │                              │
//! │           ┌──────────┴──────────┐                   │
//! │           ▼                     ▼                   │
//! │     mowlink-core  ◄───  mowlink-transport           │
//! │                         You are here ◄──            │
//! │           │                     │                   │
//! │           └──────────┬──────────┘                   │
//! │                      ▼                              │
//! │               mowlink-common                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always program against `Broker` so tests can use `MockBroker`
//! - Inbound payloads are forwarded raw; parsing belongs to the client
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod credentials;
pub mod error;
pub mod mock;
pub mod mqtt;
pub mod topics;
pub mod traits;

// Re-export primary types
pub use credentials::BrokerCredentials;
pub use error::{Result, TransportError};
pub use mock::MockBroker;
pub use mqtt::MqttBroker;
pub use topics::Topics;
pub use traits::{Broker, BrokerEvent, BrokerSettings, LinkState};
