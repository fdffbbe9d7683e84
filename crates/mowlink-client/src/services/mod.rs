// ============================================
// File: crates/mowlink-client/src/services/mod.rs
// ============================================
//! # Client Services
//!
//! ## Creation Reason
//! Business logic of the client, separated from HTTP plumbing and from
//! the MQTT transport.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`account`]: account-system login
//! - [`authority`]: staged authentication chain and session refresh
//! - [`correlator`]: per-device command queues and response matching
//! - [`telemetry`]: decoding and routing of inbound broker messages
//! - [`device_state`]: last-known state per device
//!
//! ## Service Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────────┐   ┌─────────────────────────────────┐ │
//! │  │  AccountClient   │──►│      SessionAuthority           │ │
//! │  │  - Password login│   │  - Region → … → Session         │ │
//! │  └──────────────────┘   │  - Refresh before expiry        │ │
//! │                         └──────────────┬──────────────────┘ │
//! │                                        │ CommandSink        │
//! │  ┌──────────────────┐   ┌──────────────▼──────────────────┐ │
//! │  │ TelemetryRouter  │──►│      CommandCorrelator          │ │
//! │  │  - Decode        │   │  - One FIFO per device          │ │
//! │  │  - Resolve       │   │  - Deadline per command         │ │
//! │  └────────┬─────────┘   └─────────────────────────────────┘ │
//! │           ▼                                                 │
//! │  ┌──────────────────┐                                       │
//! │  │ DeviceStateModel │                                       │
//! │  └──────────────────┘                                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The router and the correlator share one `PendingQueue`; nothing
//!   else may resolve entries
//! - All services are `Send + Sync` and shared through `Arc`
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod account;
pub mod authority;
pub mod correlator;
pub mod device_state;
pub mod telemetry;

// Re-export primary types
pub use account::AccountClient;
pub use authority::{AuthState, Session, SessionAuthority};
pub use correlator::{CommandCorrelator, CommandSink, PendingQueue};
pub use device_state::{DeviceState, DeviceStateModel, Position};
pub use telemetry::{Routed, TelemetryRouter};
