// ============================================
// File: crates/mowlink-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Provides foundational error types and result aliases used across
//! all mowlink crates, enabling consistent error handling.
//!
//! ## Main Functionality
//! - `CommonError`: Base error enum for common operations
//! - `Result<T>`: Type alias using `CommonError`
//! - Error conversion traits for interoperability
//!
//! ## Design Philosophy
//! - Use `thiserror` for ergonomic error definitions
//! - Each crate defines its own error type that wraps `CommonError`
//! - Errors should be informative without leaking tokens or secrets
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never include secrets (device secret, iot token, password) in messages
//! - Implement `From` traits for seamless error propagation
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions
//! v0.1.1 - Reduced to the variants the crates raise

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Common error types shared across mowlink crates.
///
/// # Categories
/// - **Validation**: Input validation failures
/// - **Decoding**: Payloads that could not be parsed
///
/// # Example
/// ```
/// use mowlink_common::error::{CommonError, Result};
///
/// fn validate_product_key(key: &str) -> Result<()> {
///     if key.is_empty() {
///         return Err(CommonError::invalid_input("product_key", "cannot be empty"));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    /// Invalid input data provided.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },

    /// Failed to decode/deserialize data.
    #[error("Decoding error: {context}: {details}")]
    Decoding {
        /// What was being decoded
        context: String,
        /// Error details
        details: String,
    },
}

impl CommonError {
    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Decoding` error.
    pub fn decoding(context: impl Into<String>, details: impl ToString) -> Self {
        Self::Decoding {
            context: context.into(),
            details: details.to_string(),
        }
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<base64::DecodeError> for CommonError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decoding {
            context: "base64 decode".into(),
            details: err.to_string(),
        }
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
        let err = CommonError::invalid_input("iot_id", "cannot be empty");
        assert!(err.to_string().contains("iot_id"));
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_decoding_display_names_context() {
        let err = CommonError::decoding("thing model", "missing field `value`");
        assert!(matches!(err, CommonError::Decoding { .. }));
        assert_eq!(
            err.to_string(),
            "Decoding error: thing model: missing field `value`"
        );
    }

    #[test]
    fn test_base64_error_conversion() {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let err: CommonError = STANDARD.decode("***").unwrap_err().into();
        assert!(matches!(err, CommonError::Decoding { .. }));
    }
}
