// ============================================
// File: crates/mowlink-transport/src/credentials.rs
// ============================================
//! # Broker Credential Derivation
//!
//! ## Creation Reason
//! The broker authenticates a client with a password derived from the
//! provisioned device secret using the field-concatenation scheme and a
//! per-connection random nonce.
//!
//! ## Derivation
//! ```text
//! username  = {deviceName}&{productKey}
//! password  = hex(HMAC-SHA1(deviceSecret,
//!               "clientId" cid "deviceName" dn "productKey" pk "random" rnd))
//! client id = {deviceName}.{productKey}|random={rnd},authType=,securemode=2,signmethod=hmacsha1|
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Debug` output hides the password
//! - A fresh nonce is drawn for every connect
//!
//! ## Last Modified
//! v0.1.0 - Initial derivation

use std::fmt;

use mowlink_common::types::{random_alphanumeric, DeviceIdentity};
use mowlink_core::signature::field_concat_sign;

use crate::error::Result;

/// Length of the random nonce mixed into the password.
pub const NONCE_LEN: usize = 15;

/// Username, password and client id presented to the broker.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerCredentials {
    /// MQTT client id
    pub client_id: String,
    /// MQTT username
    pub username: String,
    /// MQTT password
    pub password: String,
}

impl BrokerCredentials {
    /// Derives credentials with a fresh random nonce.
    ///
    /// # Errors
    /// Returns an error if the identity is incomplete or signing fails.
    pub fn generate(identity: &DeviceIdentity, cloud_client_id: &str) -> Result<Self> {
        Self::derive(identity, cloud_client_id, &random_alphanumeric(NONCE_LEN))
    }

    /// Derives credentials from an explicit nonce.
    ///
    /// # Errors
    /// Returns an error if the identity is incomplete or signing fails.
    pub fn derive(identity: &DeviceIdentity, cloud_client_id: &str, random: &str) -> Result<Self> {
        identity.validate()?;

        let dn = identity.device_name.as_str();
        let pk = identity.product_key.as_str();
        let password = field_concat_sign(
            identity.device_secret.expose(),
            &[
                ("clientId", cloud_client_id),
                ("deviceName", dn),
                ("productKey", pk),
                ("random", random),
            ],
        )?;

        Ok(Self {
            client_id: format!(
                "{dn}.{pk}|random={random},authType=,securemode=2,signmethod=hmacsha1|"
            ),
            username: format!("{dn}&{pk}"),
            password,
        })
    }
}

impl fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mowlink_common::types::DeviceSecret;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("pk", "dn", DeviceSecret::new("secret"))
    }

    #[test]
    fn test_password_vector() {
        let creds = BrokerCredentials::derive(&identity(), "C1", "abc").unwrap();
        assert_eq!(creds.password, "9b59fdf2c43960781af625a754b116f41c78ce5b");
        assert_eq!(creds.username, "dn&pk");
        assert_eq!(
            creds.client_id,
            "dn.pk|random=abc,authType=,securemode=2,signmethod=hmacsha1|"
        );
    }

    #[test]
    fn test_generate_uses_fresh_nonce() {
        let a = BrokerCredentials::generate(&identity(), "C1").unwrap();
        let b = BrokerCredentials::generate(&identity(), "C1").unwrap();
        assert_ne!(a.password, b.password);
        assert_eq!(a.username, b.username);
    }

    #[test]
    fn test_incomplete_identity_rejected() {
        let identity = DeviceIdentity::new("", "dn", DeviceSecret::new("secret"));
        assert!(BrokerCredentials::derive(&identity, "C1", "abc").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = BrokerCredentials::derive(&identity(), "C1", "abc").unwrap();
        assert!(!format!("{creds:?}").contains("9b59fd"));
    }
}
