// ============================================
// File: crates/mowlink-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types for signing and for decoding the device protocol
//! and telemetry payloads.
//!
//! ## Error Categories
//! 1. **Signing Errors**: HMAC key setup failures
//! 2. **Decode Errors**: Malformed JSON, base64 or protobuf payloads
//! 3. **Encode Errors**: Request bodies that cannot be serialized
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include secrets or tokens in error messages
//! - Payload excerpts in errors are fine, they are device telemetry
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use mowlink_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for signing and payload decoding.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Signing Errors
    // ========================================

    /// Signature creation failed.
    #[error("Failed to create signature: {reason}")]
    SignatureCreation {
        /// Why signing failed
        reason: String,
    },

    // ========================================
    // Decode Errors
    // ========================================

    /// Payload is not valid JSON or does not match the expected shape.
    #[error("Malformed {context} JSON: {reason}")]
    MalformedJson {
        /// What was being parsed
        context: String,
        /// Parser message
        reason: String,
    },

    /// Binary device message could not be decoded.
    #[error("Malformed device message: {reason}")]
    MalformedProtobuf {
        /// Decoder message
        reason: String,
    },

    /// A field the message must carry is absent.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Dotted path of the missing field
        field: String,
    },

    // ========================================
    // Encode Errors
    // ========================================

    /// Request body could not be serialized.
    #[error("Failed to encode {context}: {reason}")]
    Encoding {
        /// What was being encoded
        context: String,
        /// Serializer message
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `SignatureCreation` error.
    pub fn signature(reason: impl ToString) -> Self {
        Self::SignatureCreation {
            reason: reason.to_string(),
        }
    }

    /// Creates a `MalformedJson` error.
    pub fn malformed_json(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedJson {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `MissingField` error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an `Encoding` error.
    pub fn encoding(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Encoding {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error came from an inbound payload.
    ///
    /// Decode errors are logged and the message is dropped; they never
    /// stop the dispatch loop.
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedJson { .. }
                | Self::MalformedProtobuf { .. }
                | Self::MissingField { .. }
                | Self::Common(CommonError::Decoding { .. })
        )
    }
}

impl From<prost::DecodeError> for CoreError {
    fn from(err: prost::DecodeError) -> Self {
        Self::MalformedProtobuf {
            reason: err.to_string(),
        }
    }
}

impl From<base64::DecodeError> for CoreError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Common(err.into())
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::missing("params.iotId");
        assert!(err.to_string().contains("params.iotId"));

        let err = CoreError::malformed_json("telemetry", "expected value");
        assert!(err.to_string().contains("telemetry"));
    }

    #[test]
    fn test_error_classification() {
        assert!(CoreError::missing("method").is_decode_error());
        assert!(!CoreError::signature("bad key").is_decode_error());

        let b64: CoreError = CommonError::decoding("base64 decode", "bad").into();
        assert!(b64.is_decode_error());
    }

    #[test]
    fn test_common_error_conversion() {
        let common = CommonError::invalid_input("field", "bad value");
        let core: CoreError = common.into();
        assert!(matches!(core, CoreError::Common(_)));
    }
}
