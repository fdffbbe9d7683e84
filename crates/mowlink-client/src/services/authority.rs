// ============================================
// File: crates/mowlink-client/src/services/authority.rs
// ============================================
//! # Session Authority
//!
//! ## Creation Reason
//! Owns the authentication chain and the resulting session. Every stage
//! is a separate call so the caller can retry exactly the stage that
//! failed.
//!
//! ## Authentication Chain
//! ```text
//! ┌───────┐ region ┌────────┐ connect ┌───────────┐ oauth_login ┌──────────────┐
//! │ Start │───────►│ Region │────────►│ Connected │────────────►│ OAuthLoggedIn│
//! └───────┘        └────────┘         └───────────┘             └──────┬───────┘
//!                                                                      │ provision_device
//!                           ┌───────────────┐  create_session  ┌───────▼──────┐
//!                           │ SessionActive │◄─────────────────│ Provisioned  │
//!                           └───────┬───────┘                  └──────────────┘
//!                                   │ refresh_session / list_devices / invoke_service
//!                                   ▼
//!                              (stays active)
//! ```
//!
//! ## Main Functionality
//! - `SessionAuthority`: stage calls, refresh, device listing, command
//!   delivery through "invoke service"
//! - `Session`: tokens with absolute expiries
//! - `AuthState`: position in the chain
//!
//! ## ⚠️ Important Note for Next Developer
//! - A stage called out of order fails with `StageOrder` BEFORE any
//!   request is sent
//! - A failed stage leaves the state where it was; retry that stage
//! - The session is swapped whole on refresh; readers hold an `Arc`
//!   and never see a half-updated token pair
//! - Never hold `progress` across an `.await`
//!
//! ## Last Modified
//! v0.1.0 - Initial session authority

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use mowlink_common::time::{signing_timestamp, Timestamp};
use mowlink_common::types::{DeviceIdentity, DeviceSecret, IotId};
use mowlink_core::envelope::IotApiRequest;
use mowlink_core::signature::provisioning_sign;

use crate::cloud::models::{
    BoundDevice, ConnectResult, DevicePage, OAuthLoginResult, ProvisionedIdentity,
    RegionEndpoints, SessionGrant,
};
use crate::cloud::CloudClient;
use crate::config::ClientFingerprint;
use crate::error::{AuthStage, ClientError, Result};
use crate::services::correlator::CommandSink;

// ============================================
// Constants
// ============================================

const REGION_PATH: &str = "/living/account/region/get";
const CONNECT_PATH: &str = "/api/prd/connect.json";
const OAUTH_PATH: &str = "/api/prd/loginbyoauth.json";
const PROVISION_PATH: &str = "/app/aepauth/handle";
const CREATE_SESSION_PATH: &str = "/account/createSessionByAuthCode";
const REFRESH_SESSION_PATH: &str = "/account/checkOrRefreshSession";
const LIST_DEVICES_PATH: &str = "/uc/listBindingByAccount";
const INVOKE_SERVICE_PATH: &str = "/thing/service/invoke";

const SDK_VERSION: &str = "3.4.2";
const OAUTH_PLATFORM: i64 = 23;
const RISK_APP_ID: &str = "com.agilexrobotics";
const PAGE_SIZE: u32 = 100;

/// Service identifier carrying protobuf commands.
pub const PROTOBUF_SYNC_SERVICE: &str = "device_protobuf_sync_service";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const FORM_CONTENT_TYPE_UTF8: &str = "application/x-www-form-urlencoded; charset=utf-8";

// ============================================
// AuthState
// ============================================

/// Position in the authentication chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthState {
    /// Nothing done yet
    Start,
    /// Region endpoints known
    Region,
    /// Handshake done
    Connected,
    /// OAuth sid obtained
    OAuthLoggedIn,
    /// Device identity provisioned
    Provisioned,
    /// Session tokens issued
    SessionActive,
}

impl AuthState {
    /// Stage whose success produces this state.
    const fn produced_by(self) -> AuthStage {
        match self {
            Self::Start | Self::Region => AuthStage::Region,
            Self::Connected => AuthStage::Connect,
            Self::OAuthLoggedIn => AuthStage::OAuthLogin,
            Self::Provisioned => AuthStage::Provision,
            Self::SessionActive => AuthStage::CreateSession,
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Region => "region",
            Self::Connected => "connected",
            Self::OAuthLoggedIn => "oauth-logged-in",
            Self::Provisioned => "provisioned",
            Self::SessionActive => "session-active",
        };
        f.write_str(name)
    }
}

// ============================================
// Session
// ============================================

/// Platform session tokens.
#[derive(Clone)]
pub struct Session {
    /// Account identity id
    pub identity_id: String,
    /// Token for refreshing the session
    pub refresh_token: String,
    /// Absolute expiry of `refresh_token`
    pub refresh_token_expires_at: Timestamp,
    /// Token carried by gateway calls and the broker bind
    pub iot_token: String,
    /// Absolute expiry of `iot_token`
    pub iot_token_expires_at: Timestamp,
    /// When the grant was received
    pub issued_at: Timestamp,
}

impl Session {
    /// Builds a session from a grant received at `now`.
    #[must_use]
    pub fn from_grant(grant: SessionGrant, now: Timestamp) -> Self {
        let secs = |s: i64| Duration::from_secs(u64::try_from(s).unwrap_or(0));
        Self {
            identity_id: grant.identity_id,
            refresh_token: grant.refresh_token,
            refresh_token_expires_at: now.saturating_add(secs(grant.refresh_token_expire)),
            iot_token: grant.iot_token,
            iot_token_expires_at: now.saturating_add(secs(grant.iot_token_expire)),
            issued_at: now,
        }
    }

    /// Returns `true` if the iot token expires within `margin` of `now`.
    #[must_use]
    pub fn is_iot_token_stale(&self, margin: Duration, now: Timestamp) -> bool {
        self.iot_token_expires_at.saturating_sub(margin) <= now
    }

    /// Returns `true` if the refresh token is past its expiry at `now`.
    #[must_use]
    pub fn is_refresh_token_expired(&self, now: Timestamp) -> bool {
        self.refresh_token_expires_at <= now
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity_id", &self.identity_id)
            .field("iot_token_expires_at", &self.iot_token_expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish_non_exhaustive()
    }
}

// ============================================
// Chain Progress
// ============================================

#[derive(Default)]
struct Progress {
    state: Option<AuthState>,
    region: Option<RegionEndpoints>,
    connect: Option<ConnectResult>,
    oauth: Option<OAuthLoginResult>,
    identity: Option<DeviceIdentity>,
}

impl Progress {
    fn state(&self) -> AuthState {
        self.state.unwrap_or(AuthState::Start)
    }

    fn advance(&mut self, to: AuthState) {
        if self.state() < to {
            self.state = Some(to);
        }
    }
}

// ============================================
// SessionAuthority
// ============================================

/// Runs the authentication chain and owns the session.
pub struct SessionAuthority {
    cloud: CloudClient,
    fingerprint: ClientFingerprint,
    refresh_margin: Duration,
    progress: Mutex<Progress>,
    session: RwLock<Option<Arc<Session>>>,
    refresh_guard: tokio::sync::Mutex<()>,
}

impl SessionAuthority {
    /// Creates an authority in state `Start`.
    #[must_use]
    pub fn new(cloud: CloudClient, fingerprint: ClientFingerprint, refresh_margin: Duration) -> Self {
        Self {
            cloud,
            fingerprint,
            refresh_margin,
            progress: Mutex::new(Progress::default()),
            session: RwLock::new(None),
            refresh_guard: tokio::sync::Mutex::new(()),
        }
    }

    // ========================================
    // Accessors
    // ========================================

    /// Current position in the chain.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.progress.lock().state()
    }

    /// Region endpoints, once discovered.
    #[must_use]
    pub fn region_endpoints(&self) -> Option<RegionEndpoints> {
        self.progress.lock().region.clone()
    }

    /// Provisioned identity, once available.
    #[must_use]
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.progress.lock().identity.clone()
    }

    /// Current session snapshot.
    #[must_use]
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    /// Client fingerprint in use.
    #[must_use]
    pub fn fingerprint(&self) -> &ClientFingerprint {
        &self.fingerprint
    }

    /// Fails with `StageOrder` unless the chain reached `required`.
    fn require(&self, stage: AuthStage, required: AuthState) -> Result<()> {
        if self.state() < required {
            warn!(stage = %stage, state = %self.state(), "Stage called out of order");
            return Err(ClientError::StageOrder {
                stage,
                requires: required.produced_by(),
            });
        }
        Ok(())
    }

    fn region_or(&self, stage: AuthStage) -> Result<RegionEndpoints> {
        self.region_endpoints().ok_or(ClientError::StageOrder {
            stage,
            requires: AuthStage::Region,
        })
    }

    fn language(&self) -> String {
        self.cloud.config().language.clone()
    }

    // ========================================
    // Stages
    // ========================================

    /// Discovers the regional endpoints for an account.
    ///
    /// # Errors
    /// Returns `AuthenticationFailure` at `Region` if the gateway does
    /// not answer code 200.
    pub async fn region(&self, country_code: &str, auth_code: &str) -> Result<RegionEndpoints> {
        let stage = AuthStage::Region;
        let request = IotApiRequest::new(
            "1.0.2",
            json!({
                "authCode": auth_code,
                "type": "THIRD_AUTHCODE",
                "countryCode": country_code,
            }),
        )
        .with_language(self.language());

        let host = self.cloud.config().gateway_domain.clone();
        let endpoints: RegionEndpoints = self.cloud.gateway(stage, &host, REGION_PATH, &request).await?;

        info!(region_id = %endpoints.region_id, gateway = %endpoints.api_gateway_endpoint, "Region discovered");

        let mut progress = self.progress.lock();
        progress.region = Some(endpoints.clone());
        progress.advance(AuthState::Region);
        Ok(endpoints)
    }

    /// Performs the device-context handshake.
    ///
    /// # Errors
    /// Returns `StageOrder` before `region`, or `AuthenticationFailure`
    /// at `Connect` if the handshake is refused or incomplete.
    pub async fn connect(&self) -> Result<ConnectResult> {
        let stage = AuthStage::Connect;
        self.require(stage, AuthState::Region)?;

        let config = self.cloud.config();
        let utdid = self.fingerprint.utdid.as_str();
        let body = json!({
            "config": { "version": 0, "lastModify": 0 },
            "context": {
                "sdkVersion": SDK_VERSION,
                "platformName": "android",
                "netType": "wifi",
                "appKey": config.app_key,
                "yunOSId": "",
                "appVersion": config.app_version,
                "utDid": utdid,
                "appAuthToken": utdid,
                "securityToken": utdid,
            },
            "device": {
                "model": "sdk_gphone_x86_arm",
                "brand": "goldfish_x86",
                "platformVersion": "30",
            },
        });

        let doc = self
            .cloud
            .signed_query(
                stage,
                &config.handshake_host,
                CONNECT_PATH,
                "request",
                &body,
                FORM_CONTENT_TYPE,
                &[],
            )
            .await?;

        let vid = string_at(&doc, "/data/vid")
            .ok_or_else(|| ClientError::auth(stage, describe_failure(&doc, "no vid in response")))?;
        let device_id = string_at(&doc, "/data/data/device/data/deviceId")
            .ok_or_else(|| ClientError::auth(stage, "no device id in response"))?;

        debug!("Handshake completed");

        let result = ConnectResult { vid, device_id };
        let mut progress = self.progress.lock();
        progress.connect = Some(result.clone());
        progress.advance(AuthState::Connected);
        Ok(result)
    }

    /// Logs in through the OAuth gateway, producing a session id.
    ///
    /// # Errors
    /// Returns `StageOrder` before `connect`, or `AuthenticationFailure`
    /// at `OAuthLogin` if no sid is issued.
    pub async fn oauth_login(&self, country_code: &str, auth_code: &str) -> Result<OAuthLoginResult> {
        let stage = AuthStage::OAuthLogin;
        self.require(stage, AuthState::Connected)?;
        let region = self.region_or(stage)?;
        let connect = self.progress.lock().connect.clone().ok_or(ClientError::StageOrder {
            stage,
            requires: AuthStage::Connect,
        })?;

        let config = self.cloud.config();
        let utdid = self.fingerprint.utdid.as_str();
        let body = json!({
            "country": country_code,
            "authCode": auth_code,
            "oauthPlateform": OAUTH_PLATFORM,
            "oauthAppKey": config.app_key,
            "riskControlInfo": {
                "appID": RISK_APP_ID,
                "appAuthToken": "",
                "signType": "RSA",
                "sdkVersion": SDK_VERSION,
                "utdid": utdid,
                "umidToken": utdid,
                "deviceId": connect.device_id,
                "USE_OA_PWD_ENCRYPT": "true",
                "USE_H5_NC": "true",
            },
        });

        let doc = self
            .cloud
            .signed_query(
                stage,
                &region.oa_api_gateway_endpoint,
                OAUTH_PATH,
                "loginByOauthRequest",
                &body,
                FORM_CONTENT_TYPE_UTF8,
                &[("vid", connect.vid.as_str())],
            )
            .await?;

        let sid = string_at(&doc, "/data/data/loginSuccessResult/sid")
            .ok_or_else(|| ClientError::auth(stage, describe_failure(&doc, "no sid in response")))?;
        let open_id = string_at(&doc, "/data/data/openAccount/openId");

        info!("OAuth login succeeded");

        let result = OAuthLoginResult { sid, open_id };
        let mut progress = self.progress.lock();
        progress.oauth = Some(result.clone());
        progress.advance(AuthState::OAuthLoggedIn);
        Ok(result)
    }

    /// Provisions the device identity this client connects to the broker as.
    ///
    /// # Errors
    /// Returns `StageOrder` before `oauth_login`, or
    /// `AuthenticationFailure` at `Provision`.
    pub async fn provision_device(&self) -> Result<DeviceIdentity> {
        let stage = AuthStage::Provision;
        self.require(stage, AuthState::OAuthLoggedIn)?;
        let region = self.region_or(stage)?;

        let config = self.cloud.config();
        let timestamp = signing_timestamp();
        let sign = provisioning_sign(
            &config.app_secret,
            &config.app_key,
            &self.fingerprint.client_id,
            &self.fingerprint.device_sn,
            &timestamp,
        )?;

        let request = IotApiRequest::new(
            "1.0.0",
            json!({
                "authInfo": {
                    "clientId": self.fingerprint.client_id,
                    "sign": sign,
                    "deviceSn": self.fingerprint.device_sn,
                    "timestamp": timestamp,
                }
            }),
        )
        .with_language(self.language());

        let issued: ProvisionedIdentity = self
            .cloud
            .gateway(stage, &region.api_gateway_endpoint, PROVISION_PATH, &request)
            .await?;

        let identity = DeviceIdentity::new(
            issued.product_key,
            issued.device_name,
            DeviceSecret::new(issued.device_secret),
        );
        identity
            .validate()
            .map_err(|e| ClientError::auth(stage, e))?;

        info!(
            product_key = %identity.product_key,
            device_name = %identity.device_name,
            "Device identity provisioned"
        );

        let mut progress = self.progress.lock();
        progress.identity = Some(identity.clone());
        progress.advance(AuthState::Provisioned);
        Ok(identity)
    }

    /// Exchanges the OAuth sid for session tokens.
    ///
    /// # Errors
    /// Returns `StageOrder` before `provision_device`, or
    /// `AuthenticationFailure` at `CreateSession`.
    pub async fn create_session(&self) -> Result<Arc<Session>> {
        let stage = AuthStage::CreateSession;
        self.require(stage, AuthState::Provisioned)?;
        let region = self.region_or(stage)?;
        let sid = self
            .progress
            .lock()
            .oauth
            .as_ref()
            .map(|o| o.sid.clone())
            .ok_or(ClientError::StageOrder {
                stage,
                requires: AuthStage::OAuthLogin,
            })?;

        let request = IotApiRequest::new(
            "1.0.4",
            json!({
                "request": {
                    "authCode": sid,
                    "accountType": "OA_SESSION",
                    "appKey": self.cloud.config().app_key,
                }
            }),
        )
        .with_language(self.language());

        let grant: SessionGrant = self
            .cloud
            .gateway(stage, &region.api_gateway_endpoint, CREATE_SESSION_PATH, &request)
            .await?;

        let session = Arc::new(Session::from_grant(grant, Timestamp::now()));
        info!(
            identity_id = %session.identity_id,
            iot_token_expires_at = %session.iot_token_expires_at,
            "Session created"
        );

        *self.session.write() = Some(Arc::clone(&session));
        self.progress.lock().advance(AuthState::SessionActive);
        Ok(session)
    }

    /// Exchanges the refresh token for a new iot token.
    ///
    /// # Errors
    /// Returns `StageOrder` without a session, `SessionExpired` if the
    /// refresh token has run out, or `AuthenticationFailure` at
    /// `RefreshSession`.
    pub async fn refresh_session(&self) -> Result<Arc<Session>> {
        let stage = AuthStage::RefreshSession;
        self.require(stage, AuthState::SessionActive)?;
        let _guard = self.refresh_guard.lock().await;
        self.refresh_locked().await.map_err(|e| {
            warn!(stage = %stage, error = %e, "Session refresh failed");
            e
        })
    }

    async fn refresh_locked(&self) -> Result<Arc<Session>> {
        let stage = AuthStage::RefreshSession;
        let region = self.region_or(stage)?;
        let current = self
            .session()
            .ok_or(ClientError::StageOrder {
                stage,
                requires: AuthStage::CreateSession,
            })?;

        if current.is_refresh_token_expired(Timestamp::now()) {
            return Err(ClientError::session_expired("refresh token expired"));
        }

        let request = IotApiRequest::new(
            "1.0.4",
            json!({
                "request": {
                    "refreshToken": current.refresh_token,
                    "identityId": current.identity_id,
                }
            }),
        )
        .with_language(self.language());

        let grant: SessionGrant = self
            .cloud
            .gateway(stage, &region.api_gateway_endpoint, REFRESH_SESSION_PATH, &request)
            .await?;

        let session = Arc::new(Session::from_grant(grant, Timestamp::now()));
        debug!(iot_token_expires_at = %session.iot_token_expires_at, "Session refreshed");

        *self.session.write() = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Returns a session whose iot token is not stale, refreshing first
    /// when needed.
    ///
    /// # Errors
    /// Returns `SessionExpired` when the refresh token is past expiry,
    /// plus every error of `refresh_session`.
    pub async fn ensure_fresh(&self) -> Result<Arc<Session>> {
        let stage = AuthStage::RefreshSession;
        self.require(stage, AuthState::SessionActive)?;

        let current = self.session().ok_or(ClientError::StageOrder {
            stage,
            requires: AuthStage::CreateSession,
        })?;
        let now = Timestamp::now();
        if !current.is_iot_token_stale(self.refresh_margin, now) {
            return Ok(current);
        }
        if current.is_refresh_token_expired(now) {
            return Err(ClientError::session_expired("refresh token expired"));
        }

        let _guard = self.refresh_guard.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(latest) = self.session() {
            if !latest.is_iot_token_stale(self.refresh_margin, Timestamp::now()) {
                return Ok(latest);
            }
        }
        self.refresh_locked().await
    }

    // ========================================
    // Session Operations
    // ========================================

    /// Lists every device bound to the account, reading all pages.
    ///
    /// # Errors
    /// Returns `StageOrder` without a session, or `AuthenticationFailure`
    /// at `ListDevices`.
    pub async fn list_devices(&self) -> Result<Vec<BoundDevice>> {
        let stage = AuthStage::ListDevices;
        self.require(stage, AuthState::SessionActive)?;
        let region = self.region_or(stage)?;
        let session = self.ensure_fresh().await?;

        let mut devices = Vec::new();
        let mut page_no = 1;
        loop {
            let request = IotApiRequest::new(
                "1.0.8",
                json!({ "pageSize": PAGE_SIZE, "pageNo": page_no }),
            )
            .with_iot_token(session.iot_token.clone())
            .with_language(self.language());

            let page: DevicePage = self
                .cloud
                .gateway(stage, &region.api_gateway_endpoint, LIST_DEVICES_PATH, &request)
                .await?;

            let more = page.has_more(devices.len() + page.data.len());
            devices.extend(page.data);
            if !more {
                break;
            }
            page_no += 1;
        }

        info!(count = devices.len(), "Listed bound devices");
        Ok(devices)
    }

    /// Delivers protobuf `payload` to `iot_id` through "invoke service".
    ///
    /// # Errors
    /// Returns `AuthenticationFailure` at `InvokeService` if the platform
    /// answers with a failure code or HTTP status, `TransportFailure` if
    /// the gateway cannot be reached, plus every error of `ensure_fresh`.
    pub async fn invoke_service(&self, iot_id: &IotId, payload: &[u8]) -> Result<()> {
        let stage = AuthStage::InvokeService;
        self.require(stage, AuthState::SessionActive)?;
        let region = self.region_or(stage)?;
        let session = self.ensure_fresh().await?;

        let request = IotApiRequest::new(
            "1.0.5",
            json!({
                "args": { "content": BASE64.encode(payload) },
                "identifier": PROTOBUF_SYNC_SERVICE,
                "iotId": iot_id.as_str(),
            }),
        )
        .with_iot_token(session.iot_token.clone())
        .with_language(self.language());

        let response = self
            .cloud
            .gateway_raw(stage, &region.api_gateway_endpoint, INVOKE_SERVICE_PATH, &request)
            .await?;

        if response.code == 200 || response.code == 0 {
            debug!(iot_id = %iot_id, bytes = payload.len(), "Service invoked");
            Ok(())
        } else {
            Err(ClientError::auth(stage, response.error_message()))
        }
    }
}

#[async_trait]
impl CommandSink for SessionAuthority {
    async fn deliver(&self, iot_id: &IotId, payload: &[u8]) -> Result<()> {
        self.invoke_service(iot_id, payload).await
    }
}

impl fmt::Debug for SessionAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthority")
            .field("state", &self.state())
            .field("cloud", &self.cloud)
            .finish_non_exhaustive()
    }
}

// ============================================
// Helpers
// ============================================

fn string_at(doc: &Value, pointer: &str) -> Option<String> {
    doc.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Best failure text the OpenAccount hosts offer.
fn describe_failure(doc: &Value, fallback: &str) -> String {
    ["/data/message", "/data/data/message", "/message", "/msg"]
        .iter()
        .find_map(|p| string_at(doc, p))
        .unwrap_or_else(|| fallback.to_string())
}

// ============================================
// Tests
// ============================================
