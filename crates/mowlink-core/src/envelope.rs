// ============================================
// File: crates/mowlink-core/src/envelope.rs
// ============================================
//! # Cloud Gateway Envelope
//!
//! ## Creation Reason
//! Every call to the IoT gateway wraps its parameters in the same JSON
//! envelope and every response comes back in the same shape. Keeping the
//! two types here lets the HTTP layer stay ignorant of per-call details.
//!
//! ## Request Shape
//! ```json
//! {
//!   "id": "<uuid>",
//!   "version": "1.0",
//!   "params": { ... },
//!   "request": { "api_ver": "1.0.4", "language": "en-US", "iot_token": "..." }
//! }
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial envelope types

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Envelope protocol version.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Response code for success.
pub const CODE_SUCCESS: i64 = 200;

/// Default request language.
pub const DEFAULT_LANGUAGE: &str = "en-US";

// ============================================
// Request
// ============================================

/// The `request` block of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// API version of the called endpoint
    pub api_ver: String,
    /// Response language
    pub language: String,
    /// Session token, for calls that require one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iot_token: Option<String>,
}

/// A gateway request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IotApiRequest {
    /// Unique request id
    pub id: String,
    /// Envelope version
    pub version: String,
    /// Call parameters
    pub params: Value,
    /// Request metadata
    pub request: RequestMeta,
}

impl IotApiRequest {
    /// Creates a request with a fresh id and no token.
    #[must_use]
    pub fn new(api_ver: impl Into<String>, params: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: ENVELOPE_VERSION.to_string(),
            params,
            request: RequestMeta {
                api_ver: api_ver.into(),
                language: DEFAULT_LANGUAGE.to_string(),
                iot_token: None,
            },
        }
    }

    /// Attaches a session token.
    #[must_use]
    pub fn with_iot_token(mut self, token: impl Into<String>) -> Self {
        self.request.iot_token = Some(token.into());
        self
    }

    /// Overrides the response language.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.request.language = language.into();
        self
    }

    /// Serializes the envelope.
    ///
    /// # Errors
    /// Returns `Encoding` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CoreError::encoding("gateway request", e))
    }
}

// ============================================
// Response
// ============================================

/// A gateway response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T = Value> {
    /// Numeric status code
    pub code: i64,
    /// Failure message, some endpoints
    #[serde(default)]
    pub msg: Option<String>,
    /// Failure message, other endpoints
    #[serde(default)]
    pub message: Option<String>,
    /// Payload
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Returns `true` if the code signals success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }

    /// Best available failure message.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.msg
            .as_deref()
            .or(self.message.as_deref())
            .filter(|m| !m.is_empty())
            .map_or_else(|| format!("code {}", self.code), |m| format!("code {}: {m}", self.code))
    }

    /// Returns the payload, or the failure message when the code is not
    /// a success or the payload is missing.
    ///
    /// # Errors
    /// Returns the failure message as a string.
    pub fn into_data(self) -> std::result::Result<T, String> {
        if !self.is_success() {
            return Err(self.error_message());
        }
        self.data.ok_or_else(|| "response has no data".to_string())
    }
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Parses a response body.
    ///
    /// # Errors
    /// Returns `MalformedJson` when the body does not match.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| CoreError::malformed_json("gateway response", e))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let req = IotApiRequest::new("1.0.4", json!({"authCode": "x"})).with_iot_token("tok");
        let doc: Value = serde_json::from_slice(&req.to_bytes().unwrap()).unwrap();

        assert_eq!(doc["version"], "1.0");
        assert_eq!(doc["params"]["authCode"], "x");
        assert_eq!(doc["request"]["api_ver"], "1.0.4");
        assert_eq!(doc["request"]["language"], "en-US");
        assert_eq!(doc["request"]["iot_token"], "tok");
        assert!(Uuid::parse_str(doc["id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_request_without_token() {
        let req = IotApiRequest::new("1.0.2", json!({}));
        let doc: Value = serde_json::from_slice(&req.to_bytes().unwrap()).unwrap();
        assert!(doc["request"].get("iot_token").is_none());
    }

    #[test]
    fn test_response_success() {
        let resp: ApiResponse =
            ApiResponse::from_slice(br#"{"code":200,"data":{"identityId":"i"}}"#).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.into_data().unwrap()["identityId"], "i");
    }

    #[test]
    fn test_response_failure_message() {
        let resp: ApiResponse = ApiResponse::from_slice(br#"{"code":2401,"message":"denied"}"#).unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.into_data().unwrap_err(), "code 2401: denied");

        let resp: ApiResponse = ApiResponse::from_slice(br#"{"code":500,"msg":""}"#).unwrap();
        assert_eq!(resp.error_message(), "code 500");
    }

    #[test]
    fn test_response_malformed() {
        let err = ApiResponse::<Value>::from_slice(b"<html>").unwrap_err();
        assert!(err.is_decode_error());
    }
}
