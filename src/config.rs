//! Service configuration, read from `config/<env>.yaml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::api_auth::{BEARER_SCHEME, DEFAULT_LEGACY_SCHEME, HMAC_SCHEME};
use crate::rate_limit::{RateLimitPolicy, RateLimitSettings};
use crate::token::CacheSettings;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: LogRotation,
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    /// Accounts loaded into the in-memory store at startup
    pub accounts: Vec<SeedAccount>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "bearer_token_service.log".to_string(),
            use_json: false,
            rotation: LogRotation::Never,
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
            cache: CacheSettings::default(),
            rate_limit: RateLimitSettings::default(),
            accounts: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeedAccount {
    pub id: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub qiniu_uid: Option<u32>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Request bodies are buffered for signing up to this size
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// How legacy uids become tenant ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UidMapping {
    /// `qiniu_<uid>`
    #[default]
    Direct,
    /// Account directory lookup
    Lookup,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub timestamp_tolerance_secs: u64,
    pub legacy_scheme: String,
    pub uid_mapping: UidMapping,
    /// Lookup mapping only: create a tenant for unknown uids
    pub auto_create_accounts: bool,
    /// Remember accepted signatures until they leave the tolerance window
    pub reject_replayed_signatures: bool,
    /// Deadline for every store call
    pub store_deadline_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_secs: 15 * 60,
            legacy_scheme: DEFAULT_LEGACY_SCHEME.to_string(),
            uid_mapping: UidMapping::Direct,
            auto_create_accounts: false,
            reject_replayed_signatures: false,
            store_deadline_ms: 2_000,
        }
    }
}

impl AuthConfig {
    pub fn tolerance(&self) -> Duration {
        Duration::from_secs(self.timestamp_tolerance_secs)
    }

    pub fn store_deadline(&self) -> Duration {
        Duration::from_millis(self.store_deadline_ms)
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::load_from(format!("config/{}.yaml", env))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.timestamp_tolerance_secs == 0 {
            return Err(ConfigError::Invalid(
                "auth.timestamp_tolerance_secs must be > 0".into(),
            ));
        }
        if self.auth.store_deadline_ms == 0 {
            return Err(ConfigError::Invalid("auth.store_deadline_ms must be > 0".into()));
        }
        let scheme = self.auth.legacy_scheme.trim();
        if scheme.is_empty() || scheme.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "auth.legacy_scheme must be a single non-empty token".into(),
            ));
        }
        if scheme.eq_ignore_ascii_case(HMAC_SCHEME) || scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
            return Err(ConfigError::Invalid(format!(
                "auth.legacy_scheme {:?} collides with a built-in scheme",
                scheme
            )));
        }
        if self.cache.token_ttl_secs == 0 || self.cache.negative_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache TTLs must be > 0".into()));
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.gateway.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("gateway.max_body_bytes must be > 0".into()));
        }
        for account in &self.accounts {
            if account.id.is_empty() || account.access_key.is_empty() || account.secret_key.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "account {:?} needs id, access_key and secret_key",
                    account.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> AppConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults_from_empty_document() {
        let config = parse("{}");
        assert_eq!(config.auth.timestamp_tolerance_secs, 900);
        assert_eq!(config.auth.legacy_scheme, "QiniuStub");
        assert_eq!(config.auth.uid_mapping, UidMapping::Direct);
        assert!(!config.auth.reject_replayed_signatures);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.token_ttl_secs, 300);
        assert_eq!(config.cache.negative_ttl_secs, 60);
        assert_eq!(config.rate_limit.sweep_interval_secs, 300);
        assert_eq!(config.gateway.max_body_bytes, 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config = parse(
            r#"
log_level: debug
rotation: daily
auth:
  uid_mapping: lookup
  auto_create_accounts: true
rate_limit:
  enable_token_limit: true
  app:
    requests_per_minute: 10
"#,
        );
        assert_eq!(config.rotation, LogRotation::Daily);
        assert_eq!(config.auth.uid_mapping, UidMapping::Lookup);
        assert!(config.auth.auto_create_accounts);
        assert_eq!(config.auth.timestamp_tolerance_secs, 900);
        assert!(config.rate_limit.enable_token_limit);
        assert_eq!(config.rate_limit.app.requests_per_minute, 10);
        assert_eq!(config.rate_limit.app.requests_per_hour, 0);
    }

    #[test]
    fn test_validation_rejects_colliding_scheme() {
        for scheme in ["QINIU", "qiniu", "Bearer", "", "two words"] {
            let mut config = AppConfig::default();
            config.auth.legacy_scheme = scheme.to_string();
            assert!(config.validate().is_err(), "scheme {:?}", scheme);
        }
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = AppConfig::default();
        config.auth.timestamp_tolerance_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cache.negative_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seed_accounts() {
        let config = parse(
            r#"
accounts:
  - id: acct_demo
    access_key: AK_DEMO
    secret_key: SK_DEMO
    rate_limit:
      requests_per_minute: 5
"#,
        );
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].rate_limit.unwrap().requests_per_minute, 5);
        assert!(config.accounts[0].qiniu_uid.is_none());
        assert!(config.validate().is_ok());

        let mut config = config;
        config.accounts[0].secret_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load_from("config/does-not-exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
