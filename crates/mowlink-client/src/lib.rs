// ============================================
// File: crates/mowlink-client/src/lib.rs
// ============================================
//! # Mowlink Client Library
//!
//! ## Creation Reason
//! Drives a robotic mower through the vendor's IoT cloud: logs in,
//! walks the authentication chain, keeps an MQTT link alive and turns
//! inbound messages into device state and events.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: TOML configuration
//! - [`cloud`]: signing HTTP client and response models
//! - [`services`]: business logic services
//!   - [`services::account`]: account login
//!   - [`services::authority`]: authentication chain and session refresh
//!   - [`services::correlator`]: command queues and response matching
//!   - [`services::telemetry`]: inbound message routing
//!   - [`services::device_state`]: last-known device state
//! - [`bus`]: typed event bus
//! - [`tasks`]: recurring resync and refresh jobs
//! - [`controller`]: facade tying it together
//! - [`error`]: client error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Controller                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐    │
//! │  │   Account   │────►│  Session    │────►│    Command      │    │
//! │  │   Login     │     │  Authority  │     │   Correlator    │    │
//! │  └─────────────┘     └──────┬──────┘     └────────┬────────┘    │
//! │                             │ token               │ resolve     │
//! │                             ▼                     │             │
//! │  ┌─────────────┐     ┌─────────────┐     ┌────────┴────────┐    │
//! │  │  EventBus   │◄────│  Telemetry  │◄────│   MQTT Broker   │    │
//! │  │             │     │   Router    │     │                 │    │
//! │  └─────────────┘     └─────────────┘     └─────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Commands are delivered over HTTP invoke-service; MQTT is inbound
//!   only
//! - One device per controller
//!
//! ## Last Modified
//! v0.1.0 - Initial client library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod cloud;
pub mod config;
pub mod controller;
pub mod error;
pub mod services;
pub mod tasks;

// Re-export primary types
pub use bus::{ClientEvent, EventBus};
pub use config::ClientConfig;
pub use controller::Controller;
pub use error::{AuthStage, ClientError, Result};
