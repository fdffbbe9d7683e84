// ============================================
// File: crates/mowlink-client/src/cloud/client.rs
// ============================================
//! # Cloud HTTP Client
//!
//! ## Creation Reason
//! Single place where requests to the IoT gateway and the OpenAccount
//! hosts are signed and sent. Stage logic lives in the services; this
//! client only knows how to render, sign, send and unwrap.
//!
//! ## Main Functionality
//! - `gateway()`: JSON envelope POST, signed with content-md5
//! - `signed_query()`: body-in-query POST used by connect / OAuth login
//! - Every failure is reported against the calling `AuthStage`
//!
//! ## ⚠️ Important Note for Next Developer
//! - `host` takes part in neither signature; reqwest sets it from the URL
//! - The query JSON is signed raw and sent percent-encoded
//!
//! ## Last Modified
//! v0.1.0 - Initial cloud client

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use mowlink_common::time::http_date;
use mowlink_core::envelope::{ApiResponse, IotApiRequest};
use mowlink_core::signature::{content_md5, path_with_query, CanonicalRequest, SIGNATURE_METHOD};

use crate::config::CloudConfig;
use crate::error::{AuthStage, ClientError, Result};

// ============================================
// Constants
// ============================================

const ACCEPT_JSON: &str = "application/json";

/// Content type signed and sent for gateway envelopes.
const GATEWAY_CONTENT_TYPE: &str = "application/octet-stream; charset=utf-8";

const USER_AGENT: &str = "AlibabaCloud (Linux; x86_64) Rust mowlink";

// ============================================
// CloudClient
// ============================================

/// Signs and sends cloud requests.
pub struct CloudClient {
    http: Client,
    config: CloudConfig,
}

impl CloudClient {
    /// Creates a client with the configured request timeout.
    ///
    /// # Errors
    /// Returns `Internal` if the HTTP client cannot be built.
    pub fn new(config: CloudConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Cloud configuration in use.
    #[must_use]
    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    fn url(&self, host: &str, path: &str) -> String {
        format!("{}://{host}{path}", self.config.scheme)
    }

    /// Fresh nonce for `x-ca-nonce`.
    fn nonce() -> String {
        Uuid::new_v4().to_string()
    }

    /// Signs `headers` over the canonical request and returns the map
    /// to send, including the signature headers.
    fn signed_headers(
        &self,
        stage: AuthStage,
        headers: &[(&str, &str)],
        request: CanonicalRequest<'_>,
    ) -> Result<HeaderMap> {
        let signature = request.sign(&self.config.app_secret)?;
        let names = request.signed_headers().names;

        let mut map = HeaderMap::new();
        let all = headers
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .chain([
                ("x-ca-signature-headers".to_string(), names),
                ("x-ca-signature".to_string(), signature),
            ]);
        for (name, value) in all {
            if name.eq_ignore_ascii_case("host") {
                continue;
            }
            let name = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes())
                .map_err(|e| ClientError::auth(stage, format!("bad header name: {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| ClientError::auth(stage, format!("bad header value: {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    async fn read_json(stage: AuthStage, response: Response) -> Result<Value> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| no_response(stage, "failed to read response", &e))?;

        if !status.is_success() {
            warn!(stage = %stage, status = %status, "Cloud request rejected");
            return Err(ClientError::auth(
                stage,
                format!("HTTP {status}: {}", String::from_utf8_lossy(&body)),
            ));
        }

        serde_json::from_slice(&body)
            .map_err(|e| ClientError::auth(stage, format!("malformed response: {e}")))
    }

    // ========================================
    // Gateway Envelope Calls
    // ========================================

    /// Posts a signed envelope and returns the raw response envelope.
    ///
    /// # Errors
    /// Returns `AuthenticationFailure` for `stage` on HTTP-status or
    /// parse failures. Network failures are `TransportFailure` when
    /// delivering commands. The envelope code is NOT checked.
    pub async fn gateway_raw(
        &self,
        stage: AuthStage,
        host: &str,
        path: &str,
        request: &IotApiRequest,
    ) -> Result<ApiResponse<Value>> {
        let body = request.to_bytes()?;
        let md5 = content_md5(&body);
        let date = http_date();
        let nonce = Self::nonce();

        let headers = [
            ("host", host),
            ("date", date.as_str()),
            ("accept", ACCEPT_JSON),
            ("content-type", GATEWAY_CONTENT_TYPE),
            ("content-md5", md5.as_str()),
            ("user-agent", USER_AGENT),
            ("x-ca-key", self.config.app_key.as_str()),
            ("x-ca-nonce", nonce.as_str()),
            ("x-ca-signaturemethod", SIGNATURE_METHOD),
        ];
        let canonical = CanonicalRequest {
            method: "POST",
            accept: ACCEPT_JSON,
            content_md5: &md5,
            content_type: GATEWAY_CONTENT_TYPE,
            date: &date,
            headers: &headers,
            path,
        };
        let header_map = self.signed_headers(stage, &headers, canonical)?;

        debug!(stage = %stage, host = %host, path = %path, id = %request.id, "Gateway request");

        let response = self
            .http
            .post(self.url(host, path))
            .headers(header_map)
            .body(body)
            .send()
            .await
            .map_err(|e| no_response(stage, "request failed", &e))?;

        let json = Self::read_json(stage, response).await?;
        serde_json::from_value(json)
            .map_err(|e| ClientError::auth(stage, format!("malformed envelope: {e}")))
    }

    /// Posts a signed envelope, requires code 200 and decodes `data`.
    ///
    /// # Errors
    /// Returns `AuthenticationFailure` for `stage` on any failure,
    /// including a non-200 code or a missing / mismatched `data`.
    pub async fn gateway<T: DeserializeOwned>(
        &self,
        stage: AuthStage,
        host: &str,
        path: &str,
        request: &IotApiRequest,
    ) -> Result<T> {
        let response = self.gateway_raw(stage, host, path, request).await?;
        let data = response
            .into_data()
            .map_err(|reason| ClientError::auth(stage, reason))?;
        serde_json::from_value(data)
            .map_err(|e| ClientError::auth(stage, format!("unexpected data: {e}")))
    }

    // ========================================
    // Query-Signed Calls
    // ========================================

    /// Posts `payload` JSON in query parameter `param`, signed over the
    /// path and the raw JSON.
    ///
    /// # Errors
    /// Returns `AuthenticationFailure` for `stage` on any failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn signed_query(
        &self,
        stage: AuthStage,
        host: &str,
        path: &str,
        param: &str,
        payload: &Value,
        content_type: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<Value> {
        let json = payload.to_string();
        let date = http_date();
        let nonce = Self::nonce();
        let signed_path = path_with_query(path, param, &json);

        let mut headers = vec![
            ("host", host),
            ("date", date.as_str()),
            ("accept", ACCEPT_JSON),
            ("content-type", content_type),
            ("user-agent", USER_AGENT),
            ("x-ca-key", self.config.app_key.as_str()),
            ("x-ca-nonce", nonce.as_str()),
            ("x-ca-signaturemethod", SIGNATURE_METHOD),
        ];
        headers.extend_from_slice(extra_headers);

        let canonical = CanonicalRequest {
            method: "POST",
            accept: ACCEPT_JSON,
            content_md5: "",
            content_type,
            date: &date,
            headers: &headers,
            path: &signed_path,
        };
        let header_map = self.signed_headers(stage, &headers, canonical)?;

        debug!(stage = %stage, host = %host, path = %path, "Signed query request");

        let response = self
            .http
            .post(self.url(host, path))
            .query(&[(param, json.as_str())])
            .headers(header_map)
            .send()
            .await
            .map_err(|e| no_response(stage, "request failed", &e))?;

        Self::read_json(stage, response).await
    }
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient")
            .field("gateway_domain", &self.config.gateway_domain)
            .field("scheme", &self.config.scheme)
            .finish_non_exhaustive()
    }
}

/// Error for a request that got no usable response.
///
/// Command delivery reports these as a transport problem; during the
/// authentication chain they fail the stage.
fn no_response(stage: AuthStage, what: &str, e: &reqwest::Error) -> ClientError {
    match stage {
        AuthStage::InvokeService => ClientError::transport(format!("{what}: {e}")),
        _ => ClientError::auth(stage, format!("{what}: {e}")),
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client() -> CloudClient {
        let config = CloudConfig {
            scheme: "http".into(),
            app_secret: "S".into(),
            app_key: "K".into(),
            ..CloudConfig::default()
        };
        CloudClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_gateway_signs_and_unwraps() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/uc/listBindingByAccount")
            .match_header("x-ca-key", "K")
            .match_header("x-ca-signaturemethod", "HmacSHA256")
            .match_header("x-ca-signature-headers", "x-ca-key,x-ca-nonce,x-ca-signaturemethod")
            .match_header("x-ca-signature", Matcher::Any)
            .match_header("content-md5", Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"request": {"api_ver": "1.0.8"}})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":200,"data":{"total":0,"data":[]}}"#)
            .create_async()
            .await;

        let request = IotApiRequest::new("1.0.8", json!({"pageNo": 1}));
        let data: Value = client()
            .gateway(
                AuthStage::ListDevices,
                &server.host_with_port(),
                "/uc/listBindingByAccount",
                &request,
            )
            .await
            .unwrap();

        assert_eq!(data["total"], 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_gateway_non_200_code_names_stage() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/account/createSessionByAuthCode")
            .with_status(200)
            .with_body(r#"{"code":2401,"message":"invalid sid"}"#)
            .create_async()
            .await;

        let request = IotApiRequest::new("1.0.4", json!({}));
        let err = client()
            .gateway::<Value>(
                AuthStage::CreateSession,
                &server.host_with_port(),
                "/account/createSessionByAuthCode",
                &request,
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(AuthStage::CreateSession));
        assert!(err.to_string().contains("invalid sid"));
    }

    #[tokio::test]
    async fn test_signed_query_sends_json_in_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Regex(r"^/api/prd/connect\.json".into()))
            .match_query(Matcher::UrlEncoded("request".into(), r#"{"a":1}"#.into()))
            .match_header("x-ca-signature", Matcher::Any)
            .match_header("vid", "v-1")
            .with_status(200)
            .with_body(r#"{"data":{"vid":"v-2"}}"#)
            .create_async()
            .await;

        let doc = client()
            .signed_query(
                AuthStage::Connect,
                &server.host_with_port(),
                "/api/prd/connect.json",
                "request",
                &json!({"a": 1}),
                "application/x-www-form-urlencoded",
                &[("vid", "v-1")],
            )
            .await
            .unwrap();

        assert_eq!(doc["data"]["vid"], "v-2");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_stage_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = client()
            .signed_query(
                AuthStage::OAuthLogin,
                &server.host_with_port(),
                "/api/prd/loginbyoauth.json",
                "loginByOauthRequest",
                &json!({}),
                "application/x-www-form-urlencoded; charset=utf-8",
                &[],
            )
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(AuthStage::OAuthLogin));
    }

    fn unbound_host() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn test_unreachable_gateway_during_delivery_is_transport_failure() {
        let host = unbound_host();
        let request = IotApiRequest::new("1.0.5", json!({"iotId": "iot-1"}));

        let err = client()
            .gateway_raw(AuthStage::InvokeService, &host, "/thing/service/invoke", &request)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TransportFailure { .. }));
        assert!(!err.is_fatal());

        let err = client()
            .gateway_raw(AuthStage::Region, &host, "/living/account/region/get", &request)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(AuthStage::Region));
    }
}
