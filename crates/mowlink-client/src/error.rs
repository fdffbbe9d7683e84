// ============================================
// File: crates/mowlink-client/src/error.rs
// ============================================
//! # Client Error Types
//!
//! ## Creation Reason
//! One taxonomy for everything a caller of the client can see: which
//! authentication stage failed, whether the session ran out, whether the
//! broker link or a single command failed.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every authentication failure MUST carry its `AuthStage`
//! - `CommandTimeout` is local to one command; never tear the link down
//!   because of it
//!
//! ## Last Modified
//! v0.1.0 - Initial error taxonomy

use std::fmt;

use thiserror::Error;

use mowlink_common::error::CommonError;
use mowlink_core::error::CoreError;
use mowlink_transport::error::TransportError;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

// ============================================
// AuthStage
// ============================================

/// Stage of the authentication chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuthStage {
    /// Username/password login against the account service
    AccountLogin,
    /// Region discovery
    Region,
    /// Device-context handshake
    Connect,
    /// OAuth login
    OAuthLogin,
    /// Device-identity provisioning
    Provision,
    /// Session issuance
    CreateSession,
    /// Session refresh
    RefreshSession,
    /// Bound-device listing
    ListDevices,
    /// Command delivery
    InvokeService,
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AccountLogin => "account login",
            Self::Region => "region",
            Self::Connect => "connect",
            Self::OAuthLogin => "oauth login",
            Self::Provision => "provision",
            Self::CreateSession => "create session",
            Self::RefreshSession => "refresh session",
            Self::ListDevices => "list devices",
            Self::InvokeService => "invoke service",
        };
        f.write_str(name)
    }
}

// ============================================
// ClientError
// ============================================

/// Client error types.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Authentication failed at {stage}: {reason}")]
    AuthenticationFailure {
        stage: AuthStage,
        reason: String,
    },

    #[error("Stage {stage} called before {requires}")]
    StageOrder {
        stage: AuthStage,
        requires: AuthStage,
    },

    #[error("Session expired: {reason}")]
    SessionExpired {
        reason: String,
    },

    #[error("Transport failure: {reason}")]
    TransportFailure {
        reason: String,
    },

    #[error("Command {opcode} to {iot_id} timed out after {timeout_ms}ms")]
    CommandTimeout {
        iot_id: String,
        opcode: String,
        timeout_ms: u64,
    },

    #[error("Command queue full: capacity {capacity}")]
    QueueFull {
        capacity: usize,
    },

    #[error("Failed to decode {context}: {reason}")]
    ProtocolDecode {
        context: String,
        reason: String,
    },

    #[error("No device bound to this account")]
    DeviceUnreachable,

    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        field: String,
        reason: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    pub fn auth(stage: AuthStage, reason: impl ToString) -> Self {
        Self::AuthenticationFailure {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn transport(reason: impl ToString) -> Self {
        Self::TransportFailure {
            reason: reason.to_string(),
        }
    }

    pub fn session_expired(reason: impl Into<String>) -> Self {
        Self::SessionExpired {
            reason: reason.into(),
        }
    }

    pub fn decode(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::ProtocolDecode {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stage that failed, for authentication and ordering errors.
    #[must_use]
    pub const fn stage(&self) -> Option<AuthStage> {
        match self {
            Self::AuthenticationFailure { stage, .. } | Self::StageOrder { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    /// Returns `true` if the error ends an interactive session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailure { .. }
                | Self::StageOrder { .. }
                | Self::DeviceUnreachable
                | Self::ConfigLoad { .. }
                | Self::ConfigInvalid { .. }
        )
    }

    /// Returns `true` if retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::TransportFailure { .. }
            | Self::CommandTimeout { .. }
            | Self::QueueFull { .. }
            | Self::SessionExpired { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::auth(AuthStage::OAuthLogin, "code 2401");
        assert_eq!(err.to_string(), "Authentication failed at oauth login: code 2401");

        let err = ClientError::CommandTimeout {
            iot_id: "dev-1".into(),
            opcode: "todev_ble_sync".into(),
            timeout_ms: 5000,
        };
        assert!(err.to_string().contains("5000ms"));
    }

    #[test]
    fn test_error_classification() {
        let err = ClientError::auth(AuthStage::Region, "code 500");
        assert_eq!(err.stage(), Some(AuthStage::Region));
        assert!(err.is_fatal());
        assert!(!err.is_retryable());

        let err = ClientError::QueueFull { capacity: 100 };
        assert!(err.is_retryable());
        assert!(err.stage().is_none());

        let err = ClientError::config_invalid("commands.deadline_ms", "zero");
        assert!(err.is_config_error());
        assert!(err.is_fatal());

        assert!(ClientError::from(TransportError::NotConnected).is_retryable());
    }
}
