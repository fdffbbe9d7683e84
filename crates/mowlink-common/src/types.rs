// ============================================
// File: crates/mowlink-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identifiers that cross crate boundaries so that an
//! iot id can never be confused with a product key or a device name.
//!
//! ## Modification Notes
//! - Adapted for zeroize 1.3 (no ZeroizeOnDrop derive, manual Drop impl)
//!
//! ## Main Functionality
//! - `IotId`: Platform-assigned identifier of a bound device
//! - `DeviceSecret`: Provisioned broker secret, zeroized on drop
//! - `DeviceIdentity`: Product key / device name / secret triple
//! - `random_alphanumeric()`: Nonces and client identifiers
//!
//! ## ⚠️ Important Note for Next Developer
//! - `DeviceSecret` must never implement `Display` or print its value in `Debug`
//! - zeroize 1.3 does NOT have ZeroizeOnDrop derive macro
//!
//! ## Last Modified
//! v0.1.0 - Initial identifier types

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{CommonError, Result};

// ============================================
// IotId
// ============================================

/// Platform identifier of a device bound to the account.
///
/// Used as the key of per-device command queues and device state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IotId(String);

impl IotId {
    /// Creates an `IotId`, rejecting empty or blank values.
    ///
    /// # Errors
    /// Returns `InvalidInput` if `value` is empty after trimming.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(CommonError::invalid_input("iot_id", "cannot be empty"));
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IotId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================
// DeviceSecret
// ============================================

/// Secret issued by device-identity provisioning.
///
/// # Security Properties
/// - Implements `Zeroize` for secure memory cleanup
/// - Manual `Drop` implementation ensures zeroization (zeroize 1.3 compat)
/// - `Debug` output is redacted
#[derive(Clone, PartialEq, Eq, Zeroize)]
pub struct DeviceSecret(String);

// Manual Drop implementation for secure zeroization
impl Drop for DeviceSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl DeviceSecret {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret for signing. Do not log the result.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceSecret(***)")
    }
}

// ============================================
// DeviceIdentity
// ============================================

/// Credentials bound to this client by device-identity provisioning.
///
/// Immutable for the lifetime of a broker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Product key of the provisioned client device.
    pub product_key: String,
    /// Device name of the provisioned client device.
    pub device_name: String,
    /// Secret used to derive broker credentials.
    pub device_secret: DeviceSecret,
    /// Platform id, when the platform has reported one.
    pub iot_id: Option<IotId>,
}

impl DeviceIdentity {
    /// Creates an identity without an iot id.
    #[must_use]
    pub fn new(
        product_key: impl Into<String>,
        device_name: impl Into<String>,
        device_secret: DeviceSecret,
    ) -> Self {
        Self {
            product_key: product_key.into(),
            device_name: device_name.into(),
            device_secret,
            iot_id: None,
        }
    }

    /// Checks that product key and device name are present.
    ///
    /// # Errors
    /// Returns `InvalidInput` naming the first empty field.
    pub fn validate(&self) -> Result<()> {
        if self.product_key.is_empty() {
            return Err(CommonError::invalid_input("product_key", "cannot be empty"));
        }
        if self.device_name.is_empty() {
            return Err(CommonError::invalid_input("device_name", "cannot be empty"));
        }
        if self.device_secret.expose().is_empty() {
            return Err(CommonError::invalid_input("device_secret", "cannot be empty"));
        }
        Ok(())
    }
}

// ============================================
// Helpers
// ============================================

/// Generates a random ASCII alphanumeric string of `len` characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iot_id_parse() {
        let id = IotId::parse("abc123").unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.to_string(), "abc123");

        assert!(IotId::parse("").is_err());
        assert!(IotId::parse("   ").is_err());
    }

    #[test]
    fn test_iot_id_serde_transparent() {
        let id = IotId::parse("dev-1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"dev-1\"");
    }

    #[test]
    fn test_device_secret_redacted() {
        let secret = DeviceSecret::new("very-secret");
        assert_eq!(format!("{secret:?}"), "DeviceSecret(***)");
        assert_eq!(secret.expose(), "very-secret");
    }

    #[test]
    fn test_identity_validation() {
        let identity = DeviceIdentity::new("pk", "dn", DeviceSecret::new("s"));
        assert!(identity.validate().is_ok());

        let missing = DeviceIdentity::new("", "dn", DeviceSecret::new("s"));
        assert!(matches!(
            missing.validate(),
            Err(CommonError::InvalidInput { ref field, .. }) if field == "product_key"
        ));
    }

    #[test]
    fn test_random_alphanumeric() {
        let a = random_alphanumeric(15);
        let b = random_alphanumeric(15);
        assert_eq!(a.len(), 15);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
