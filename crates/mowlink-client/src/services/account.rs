// ============================================
// File: crates/mowlink-client/src/services/account.rs
// ============================================
//! # Account Login
//!
//! ## Creation Reason
//! Stage zero of the chain: trades a username and password for the
//! authorization code the platform stages consume.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The account service answers `code == 0` on success, NOT 200
//! - Credentials travel as query parameters; never log the URL
//!
//! ## Last Modified
//! v0.1.0 - Initial account login

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::cloud::models::{AccountLogin, AccountResponse};
use crate::config::AccountConfig;
use crate::error::{AuthStage, ClientError, Result};

const TOKEN_PATH: &str = "/oauth/token";
const ACCOUNT_USER_AGENT: &str = "okhttp/3.14.9";

/// Client for the account service.
pub struct AccountClient {
    http: Client,
    config: AccountConfig,
}

impl AccountClient {
    /// Creates an account client.
    ///
    /// # Errors
    /// Returns `Internal` if the HTTP client cannot be built.
    pub fn new(config: AccountConfig, timeout: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Logs in with a username and password.
    ///
    /// # Errors
    /// Returns `AuthenticationFailure` at stage `AccountLogin` on any
    /// transport failure, non-success code or missing payload.
    pub async fn login(&self, username: &str, password: &str) -> Result<AccountLogin> {
        let stage = AuthStage::AccountLogin;
        let url = format!("{}{TOKEN_PATH}", self.config.auth_url.trim_end_matches('/'));

        debug!(auth_url = %self.config.auth_url, "Account login");

        let response = self
            .http
            .post(&url)
            .header("User-Agent", ACCOUNT_USER_AGENT)
            .header("App-Version", &self.config.app_version_header)
            .query(&[
                ("username", username),
                ("password", password),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "password"),
            ])
            .send()
            .await
            .map_err(|e| ClientError::auth(stage, format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Account login rejected");
            return Err(ClientError::auth(stage, format!("HTTP {status}")));
        }

        let envelope: AccountResponse<AccountLogin> = response
            .json()
            .await
            .map_err(|e| ClientError::auth(stage, format!("malformed response: {}", e.without_url())))?;

        if envelope.code != 0 {
            return Err(ClientError::auth(
                stage,
                format!(
                    "code {}: {}",
                    envelope.code,
                    envelope.msg.unwrap_or_else(|| "login refused".into())
                ),
            ));
        }

        let login = envelope
            .data
            .ok_or_else(|| ClientError::auth(stage, "response carried no data"))?;

        info!(country = %login.country_code(), "Account login succeeded");
        Ok(login)
    }
}

impl std::fmt::Debug for AccountClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountClient")
            .field("auth_url", &self.config.auth_url)
            .field("client_id", &self.config.client_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn client(url: String) -> AccountClient {
        let config = AccountConfig {
            auth_url: url,
            ..AccountConfig::default()
        };
        AccountClient::new(config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_login_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".into(), "a@b.c".into()),
                Matcher::UrlEncoded("password".into(), "pw".into()),
                Matcher::UrlEncoded("grant_type".into(), "password".into()),
            ]))
            .match_header("user-agent", "okhttp/3.14.9")
            .with_status(200)
            .with_body(
                r#"{"code":0,"msg":"ok","data":{
                    "access_token":"at","authorization_code":"code1",
                    "refresh_token":"rt","expires_in":3600.0,
                    "userInformation":{"domainAbbreviation":"US","areaCode":"1",
                    "userId":"u1","email":"a@b.c"}}}"#,
            )
            .create_async()
            .await;

        let login = client(server.url()).login("a@b.c", "pw").await.unwrap();
        assert_eq!(login.authorization_code, "code1");
        assert_eq!(login.country_code(), "US");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_nonzero_code_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Regex("^/oauth/token".into()))
            .with_status(200)
            .with_body(r#"{"code":22000,"msg":"wrong password"}"#)
            .create_async()
            .await;

        let err = client(server.url()).login("a", "b").await.unwrap_err();
        assert_eq!(err.stage(), Some(AuthStage::AccountLogin));
        assert!(err.to_string().contains("wrong password"));
    }
}
