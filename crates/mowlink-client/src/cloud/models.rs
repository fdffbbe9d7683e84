// ============================================
// File: crates/mowlink-client/src/cloud/models.rs
// ============================================
//! # Cloud API Data Models
//!
//! ## Creation Reason
//! Typed payloads for the account service and the IoT gateway. Only the
//! fields the controller reads are declared; serde ignores the rest.
//!
//! ## Main Data Structures
//! - `AccountLogin` / `UserInformation`: account-service login
//! - `RegionEndpoints`: region discovery
//! - `ConnectResult`: handshake output (vid, device id)
//! - `OAuthLoginResult`: OAuth session id
//! - `ProvisionedIdentity`: provisioning output
//! - `SessionGrant`: session issuance / refresh output
//! - `BoundDevice` / `DevicePage`: bound-device listing
//!
//! ## ⚠️ Important Note for Next Developer
//! - Token expiries from the gateway are RELATIVE seconds
//! - `Debug` on types holding secrets is redacted by hand
//!
//! ## Last Modified
//! v0.1.0 - Initial models

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================
// Account Service
// ============================================

/// Envelope of account-service responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct AccountResponse<T> {
    /// Status code, 0 on success
    pub code: i64,
    /// Message
    #[serde(default)]
    pub msg: Option<String>,
    /// Payload
    #[serde(default)]
    pub data: Option<T>,
}

/// Account profile returned with a login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInformation {
    /// Two-letter country of the account
    #[serde(default)]
    pub domain_abbreviation: String,
    /// Area code
    #[serde(default)]
    pub area_code: String,
    /// Account id
    #[serde(default)]
    pub user_id: String,
    /// Account email
    #[serde(default)]
    pub email: String,
}

/// Successful account login.
#[derive(Clone, Deserialize)]
pub struct AccountLogin {
    /// Bearer token for the account service
    pub access_token: String,
    /// Code exchanged for a platform session
    pub authorization_code: String,
    /// Refresh token for the account service
    #[serde(default)]
    pub refresh_token: String,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: f64,
    /// Account profile
    #[serde(rename = "userInformation", default)]
    pub user_information: UserInformation,
}

impl AccountLogin {
    /// Country code to use for region discovery.
    #[must_use]
    pub fn country_code(&self) -> &str {
        &self.user_information.domain_abbreviation
    }
}

impl fmt::Debug for AccountLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountLogin")
            .field("country", &self.user_information.domain_abbreviation)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

// ============================================
// Region
// ============================================

/// Endpoints returned by region discovery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionEndpoints {
    /// Host of the regional API gateway
    pub api_gateway_endpoint: String,
    /// Host of the OAuth gateway
    pub oa_api_gateway_endpoint: String,
    /// Broker endpoint as reported by the platform
    #[serde(default)]
    pub mqtt_endpoint: String,
    /// Region id, part of the broker host
    pub region_id: String,
}

// ============================================
// Connect / OAuth
// ============================================

/// Output of the device-context handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResult {
    /// Virtual id, sent as the `vid` header of OAuth login
    pub vid: String,
    /// Platform device id, sent in OAuth risk-control info
    pub device_id: String,
}

/// Output of OAuth login.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthLoginResult {
    /// Short-lived session id
    pub sid: String,
    /// Open account id, when reported
    pub open_id: Option<String>,
}

impl fmt::Debug for OAuthLoginResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthLoginResult")
            .field("open_id", &self.open_id)
            .finish_non_exhaustive()
    }
}

// ============================================
// Provisioning
// ============================================

/// Credentials issued by provisioning.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedIdentity {
    /// Product key
    pub product_key: String,
    /// Device name
    pub device_name: String,
    /// Device secret
    pub device_secret: String,
}

impl fmt::Debug for ProvisionedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedIdentity")
            .field("product_key", &self.product_key)
            .field("device_name", &self.device_name)
            .finish_non_exhaustive()
    }
}

// ============================================
// Session
// ============================================

/// Session issuance or refresh output.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    /// Account identity id
    pub identity_id: String,
    /// Refresh token
    pub refresh_token: String,
    /// Refresh token lifetime in seconds
    pub refresh_token_expire: i64,
    /// Iot token
    pub iot_token: String,
    /// Iot token lifetime in seconds
    pub iot_token_expire: i64,
}

impl fmt::Debug for SessionGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGrant")
            .field("identity_id", &self.identity_id)
            .field("iot_token_expire", &self.iot_token_expire)
            .field("refresh_token_expire", &self.refresh_token_expire)
            .finish_non_exhaustive()
    }
}

// ============================================
// Devices
// ============================================

/// A device bound to the account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundDevice {
    /// Platform id
    pub iot_id: String,
    /// Device name, e.g. `Luba-VSLKJX`
    pub device_name: String,
    /// Product key
    #[serde(default)]
    pub product_key: String,
    /// Product name
    #[serde(default)]
    pub product_name: String,
    /// User-chosen name
    #[serde(default)]
    pub nick_name: Option<String>,
    /// Online status code as reported at listing time
    #[serde(default)]
    pub status: i64,
}

impl BoundDevice {
    /// Display name, preferring the nickname.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.nick_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.device_name)
    }
}

/// One page of bound devices.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePage {
    /// Devices on this page
    #[serde(default)]
    pub data: Vec<BoundDevice>,
    /// Page number, from 1
    #[serde(default)]
    pub page_no: u32,
    /// Page size
    #[serde(default)]
    pub page_size: u32,
    /// Total devices across pages
    #[serde(default)]
    pub total: u32,
}

impl DevicePage {
    /// Returns `true` if more pages follow this one.
    #[must_use]
    pub fn has_more(&self, fetched: usize) -> bool {
        !self.data.is_empty() && fetched < self.total as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_login_parse() {
        let body = r#"{
            "code": 0,
            "msg": "ok",
            "data": {
                "access_token": "at",
                "authorization_code": "code1",
                "refresh_token": "rt",
                "expires_in": 7200,
                "userInformation": {"domainAbbreviation": "US", "areaCode": "+1"}
            }
        }"#;
        let resp: AccountResponse<AccountLogin> = serde_json::from_str(body).unwrap();
        let login = resp.data.unwrap();
        assert_eq!(login.country_code(), "US");
        assert_eq!(login.authorization_code, "code1");
        assert!(!format!("{login:?}").contains("\"at\""));
    }

    #[test]
    fn test_session_grant_parse() {
        let grant: SessionGrant = serde_json::from_str(
            r#"{"identityId":"i","refreshToken":"r","refreshTokenExpire":720000,"iotToken":"t","iotTokenExpire":72000}"#,
        )
        .unwrap();
        assert_eq!(grant.iot_token_expire, 72000);
        assert!(!format!("{grant:?}").contains("\"t\""));
    }

    #[test]
    fn test_device_page() {
        let page: DevicePage = serde_json::from_str(
            r#"{"data":[{"iotId":"d1","deviceName":"Luba-1","nickName":""}],"pageNo":1,"pageSize":100,"total":2}"#,
        )
        .unwrap();
        assert!(page.has_more(1));
        assert!(!page.has_more(2));
        assert_eq!(page.data[0].display_name(), "Luba-1");
    }
}
