// ============================================
// File: crates/mowlink-client/src/config.rs
// ============================================
//! # Client Configuration
//!
//! ## Creation Reason
//! Provides configuration management for the mowlink client,
//! supporting TOML files with per-field defaults.
//!
//! ## Main Functionality
//! - `ClientConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Defaults matching the mobile app the platform expects
//!
//! ## Configuration Sections
//! - `cloud`: app credentials, gateway domain, handshake host
//! - `account`: account-login endpoint and OAuth client
//! - `identity`: client fingerprint (random when absent)
//! - `broker`: MQTT port, keep-alive, bind timeout, backoff
//! - `commands`: command deadline and queue capacity
//! - `tasks`: resync / refresh intervals and report parameters
//! - `session`: token refresh margin
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [cloud]
//! language = "en-US"
//!
//! [identity]
//! device_name = "Luba-VSLKJX"
//!
//! [commands]
//! deadline_ms = 5000
//! queue_capacity = 100
//!
//! [tasks]
//! resync_interval_secs = 160
//! refresh_interval_secs = 60
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The app key and secret default to the values the platform issues
//!   to the official app; the gateway rejects anything else
//! - Config changes require a reconnect
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use mowlink_common::types::random_alphanumeric;
use mowlink_transport::BrokerSettings;

use crate::error::{ClientError, Result};

// ============================================
// ClientConfig
// ============================================

/// Main client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Cloud platform configuration.
    #[serde(default)]
    pub cloud: CloudConfig,

    /// Account login configuration.
    #[serde(default)]
    pub account: AccountConfig,

    /// Client fingerprint.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Broker link configuration.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Command correlation configuration.
    #[serde(default)]
    pub commands: CommandsConfig,

    /// Background task configuration.
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Session bookkeeping configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the content cannot be parsed or validated.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ClientError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.cloud.validate()?;
        self.account.validate()?;
        self.broker.validate()?;
        self.commands.validate()?;
        self.tasks.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Broker settings for a connection in `region_id`.
    #[must_use]
    pub fn broker_settings(&self, region_id: &str, cloud_client_id: &str) -> BrokerSettings {
        let mut settings = BrokerSettings::new(region_id, cloud_client_id)
            .with_port(self.broker.port)
            .with_tls(self.broker.tls)
            .with_bind_timeout(Duration::from_millis(self.broker.bind_timeout_ms))
            .with_backoff(
                Duration::from_millis(self.broker.backoff_initial_ms),
                Duration::from_millis(self.broker.backoff_max_ms),
            );
        settings.keep_alive = Duration::from_secs(self.broker.keep_alive_secs);
        settings.channel_capacity = self.broker.channel_capacity;
        if let Some(host) = &self.broker.host {
            settings = settings.with_host(host.clone());
        }
        settings
    }
}

fn validate_scheme(field: &str, scheme: &str) -> Result<()> {
    if matches!(scheme, "http" | "https") {
        Ok(())
    } else {
        Err(ClientError::config_invalid(field, "must be \"http\" or \"https\""))
    }
}

// ============================================
// CloudConfig
// ============================================

/// Cloud platform configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Application key issued by the platform.
    #[serde(default = "default_app_key")]
    pub app_key: String,

    /// Application secret issued by the platform.
    #[serde(default = "default_app_secret")]
    pub app_secret: String,

    /// Application version reported to the platform.
    #[serde(default = "default_app_version")]
    pub app_version: String,

    /// Gateway domain used for region discovery.
    #[serde(default = "default_gateway_domain")]
    pub gateway_domain: String,

    /// Host of the connect handshake.
    #[serde(default = "default_handshake_host")]
    pub handshake_host: String,

    /// URL scheme for every cloud call.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Response language.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_app_key() -> String {
    "34231230".to_string()
}

fn default_app_secret() -> String {
    "1ba85698bb10e19c6437413b61ba3445".to_string()
}

fn default_app_version() -> String {
    "1.11.130".to_string()
}

fn default_gateway_domain() -> String {
    "api.link.aliyun.com".to_string()
}

fn default_handshake_host() -> String {
    "sdk.openaccount.aliyun.com".to_string()
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_language() -> String {
    "en-US".to_string()
}

impl CloudConfig {
    fn validate(&self) -> Result<()> {
        if self.app_key.is_empty() {
            return Err(ClientError::config_invalid("cloud.app_key", "cannot be empty"));
        }
        if self.app_secret.is_empty() {
            return Err(ClientError::config_invalid("cloud.app_secret", "cannot be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ClientError::config_invalid(
                "cloud.request_timeout_secs",
                "must be greater than 0",
            ));
        }
        validate_scheme("cloud.scheme", &self.scheme)
    }

    /// HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            app_key: default_app_key(),
            app_secret: default_app_secret(),
            app_version: default_app_version(),
            gateway_domain: default_gateway_domain(),
            handshake_host: default_handshake_host(),
            scheme: default_scheme(),
            request_timeout_secs: default_request_timeout(),
            language: default_language(),
        }
    }
}

// ============================================
// AccountConfig
// ============================================

/// Account login configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Base URL of the account service.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// OAuth client id.
    #[serde(default = "default_oauth_client_id")]
    pub client_id: String,

    /// OAuth client secret.
    #[serde(default = "default_oauth_client_secret")]
    pub client_secret: String,

    /// `App-Version` header value.
    #[serde(default = "default_app_version_header")]
    pub app_version_header: String,
}

fn default_auth_url() -> String {
    "https://id.mammotion.com".to_string()
}

fn default_oauth_client_id() -> String {
    "MADKALUBAS".to_string()
}

fn default_oauth_client_secret() -> String {
    "GshzGRZJjuMUgd2sYHM7".to_string()
}

fn default_app_version_header() -> String {
    "google Pixel 2 XL taimen-Android 11,1.11.332".to_string()
}

impl AccountConfig {
    fn validate(&self) -> Result<()> {
        if !(self.auth_url.starts_with("http://") || self.auth_url.starts_with("https://")) {
            return Err(ClientError::config_invalid(
                "account.auth_url",
                "must start with http:// or https://",
            ));
        }
        if self.client_id.is_empty() {
            return Err(ClientError::config_invalid("account.client_id", "cannot be empty"));
        }
        Ok(())
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            client_id: default_oauth_client_id(),
            client_secret: default_oauth_client_secret(),
            app_version_header: default_app_version_header(),
        }
    }
}

// ============================================
// IdentityConfig
// ============================================

/// Client fingerprint section.
///
/// Absent values are generated randomly once per process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Client id reported to the platform.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client serial number used by provisioning.
    #[serde(default)]
    pub device_sn: Option<String>,

    /// Device fingerprint used by the handshake.
    #[serde(default)]
    pub utdid: Option<String>,

    /// Bound device to control; the first one when absent.
    #[serde(default)]
    pub device_name: Option<String>,
}

/// Resolved client fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFingerprint {
    /// Client id
    pub client_id: String,
    /// Client serial
    pub device_sn: String,
    /// Handshake fingerprint
    pub utdid: String,
}

impl IdentityConfig {
    /// Resolves configured values, generating missing ones.
    #[must_use]
    pub fn resolve(&self) -> ClientFingerprint {
        ClientFingerprint {
            client_id: self
                .client_id
                .clone()
                .unwrap_or_else(|| random_alphanumeric(8)),
            device_sn: self
                .device_sn
                .clone()
                .unwrap_or_else(|| random_alphanumeric(32)),
            utdid: self.utdid.clone().unwrap_or_else(|| random_alphanumeric(32)),
        }
    }
}

// ============================================
// BrokerConfig
// ============================================

/// Broker link configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Host override; the per-product host is used when absent.
    #[serde(default)]
    pub host: Option<String>,

    /// Broker port.
    #[serde(default = "default_broker_port")]
    pub port: u16,

    /// Whether to use TLS.
    #[serde(default = "default_true")]
    pub tls: bool,

    /// MQTT keep-alive in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Readiness fallback when no bind reply arrives, in milliseconds.
    #[serde(default = "default_bind_timeout")]
    pub bind_timeout_ms: u64,

    /// First reconnect delay in milliseconds.
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,

    /// Largest reconnect delay in milliseconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Capacity of the link channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_broker_port() -> u16 {
    8883
}

fn default_true() -> bool {
    true
}

fn default_keep_alive() -> u64 {
    120
}

fn default_bind_timeout() -> u64 {
    5000
}

fn default_backoff_initial() -> u64 {
    100
}

fn default_backoff_max() -> u64 {
    30_000
}

fn default_channel_capacity() -> usize {
    100
}

impl BrokerConfig {
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ClientError::config_invalid("broker.port", "port cannot be 0"));
        }
        if self.keep_alive_secs < 5 {
            return Err(ClientError::config_invalid(
                "broker.keep_alive_secs",
                "must be at least 5",
            ));
        }
        if self.backoff_initial_ms == 0 || self.backoff_initial_ms > self.backoff_max_ms {
            return Err(ClientError::config_invalid(
                "broker.backoff_initial_ms",
                "must be greater than 0 and not above backoff_max_ms",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ClientError::config_invalid(
                "broker.channel_capacity",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_broker_port(),
            tls: true,
            keep_alive_secs: default_keep_alive(),
            bind_timeout_ms: default_bind_timeout(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

// ============================================
// CommandsConfig
// ============================================

/// Command correlation configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Per-command deadline in milliseconds.
    #[serde(default = "default_deadline")]
    pub deadline_ms: u64,

    /// Commands buffered across all devices.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_deadline() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    100
}

impl CommandsConfig {
    fn validate(&self) -> Result<()> {
        if self.deadline_ms == 0 {
            return Err(ClientError::config_invalid(
                "commands.deadline_ms",
                "must be greater than 0",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ClientError::config_invalid(
                "commands.queue_capacity",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Per-command deadline.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

// ============================================
// TasksConfig
// ============================================

/// Background task configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// BLE sync interval in seconds.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// Session refresh interval in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Whether the refresh task runs.
    #[serde(default = "default_true")]
    pub refresh_enabled: bool,

    /// Report subscription lifetime in milliseconds.
    #[serde(default = "default_report_timeout")]
    pub report_timeout_ms: i32,

    /// Report period in milliseconds.
    #[serde(default = "default_report_period")]
    pub report_period_ms: i32,

    /// Report period when nothing changed, in milliseconds.
    #[serde(default = "default_report_no_change_period")]
    pub report_no_change_period_ms: i32,
}

fn default_resync_interval() -> u64 {
    160
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_report_timeout() -> i32 {
    300_000
}

fn default_report_period() -> i32 {
    500
}

fn default_report_no_change_period() -> i32 {
    1000
}

impl TasksConfig {
    fn validate(&self) -> Result<()> {
        if self.resync_interval_secs == 0 {
            return Err(ClientError::config_invalid(
                "tasks.resync_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ClientError::config_invalid(
                "tasks.refresh_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.report_period_ms <= 0 {
            return Err(ClientError::config_invalid(
                "tasks.report_period_ms",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// BLE sync interval.
    #[must_use]
    pub const fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Session refresh interval.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Report subscription command built from these parameters.
    #[must_use]
    pub const fn report_command(&self) -> mowlink_core::DeviceCommand {
        mowlink_core::DeviceCommand::ReportConfig {
            timeout: self.report_timeout_ms,
            period: self.report_period_ms,
            no_change_period: self.report_no_change_period_ms,
        }
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: default_resync_interval(),
            refresh_interval_secs: default_refresh_interval(),
            refresh_enabled: true,
            report_timeout_ms: default_report_timeout(),
            report_period_ms: default_report_period(),
            report_no_change_period_ms: default_report_no_change_period(),
        }
    }
}

// ============================================
// SessionConfig
// ============================================

/// Session bookkeeping section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Treat the iot token as stale this many seconds before expiry.
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,
}

fn default_refresh_margin() -> u64 {
    300
}

impl SessionConfig {
    /// Refresh margin.
    #[must_use]
    pub const fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: default_refresh_margin(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
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
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.commands.deadline(), Duration::from_secs(5));
        assert_eq!(config.commands.queue_capacity, 100);
        assert_eq!(config.tasks.resync_interval(), Duration::from_secs(160));
        assert_eq!(config.tasks.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.session.refresh_margin(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [cloud]
            scheme = "http"
            gateway_domain = "127.0.0.1:8080"

            [identity]
            device_name = "Luba-ABC"

            [commands]
            deadline_ms = 2500

            [logging]
            level = "debug"
        "#;

        let config = ClientConfig::from_str(toml).unwrap();
        assert_eq!(config.cloud.scheme, "http");
        assert_eq!(config.cloud.app_key, "34231230");
        assert_eq!(config.identity.device_name.as_deref(), Some("Luba-ABC"));
        assert_eq!(config.commands.deadline_ms, 2500);
        assert_eq!(config.commands.queue_capacity, 100);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_errors() {
        let bad = [
            "[cloud]\napp_key = \"\"",
            "[cloud]\napp_secret = \"\"",
            "[cloud]\nscheme = \"ftp\"",
            "[commands]\ndeadline_ms = 0",
            "[commands]\nqueue_capacity = 0",
            "[tasks]\nresync_interval_secs = 0",
            "[broker]\nport = 0",
        ];
        for toml in bad {
            let err = ClientConfig::from_str(toml).unwrap_err();
            assert!(err.is_config_error(), "{toml} -> {err}");
        }
    }

    #[test]
    fn test_identity_resolve() {
        let fixed = IdentityConfig {
            client_id: Some("C1".into()),
            device_sn: Some("D1".into()),
            utdid: Some("U1".into()),
            device_name: None,
        };
        let fp = fixed.resolve();
        assert_eq!(fp.client_id, "C1");
        assert_eq!(fp.device_sn, "D1");

        let random = IdentityConfig::default().resolve();
        assert_eq!(random.client_id.len(), 8);
        assert_eq!(random.device_sn.len(), 32);
    }

    #[test]
    fn test_broker_settings() {
        let mut config = ClientConfig::default();
        config.broker.host = Some("localhost".into());
        config.broker.tls = false;
        let settings = config.broker_settings("eu-central-1", "C1");
        assert_eq!(settings.host_for("pk"), "localhost");
        assert!(!settings.tls);
        assert_eq!(settings.keep_alive, Duration::from_secs(120));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ClientConfig::default();
        let parsed = ClientConfig::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed.cloud.app_key, config.cloud.app_key);
        assert_eq!(parsed.broker.port, config.broker.port);
    }
}
