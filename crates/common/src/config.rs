use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

use crate::crypto::{AuthorizationKey, SignatureError};

pub const APP_NAME: &str = "keyport";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_API_URL: &str = "https://api.privy.io";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_APP_ID: &str = "PRIVY_APP_ID";
pub const ENV_APP_SECRET: &str = "PRIVY_APP_SECRET";
pub const ENV_AUTHORIZATION_KEY_ID: &str = "PRIVY_AUTHORIZATION_KEY_ID";
pub const ENV_AUTHORIZATION_PRIVATE_KEY: &str = "PRIVY_AUTHORIZATION_PRIVATE_KEY";
pub const ENV_API_URL: &str = "PRIVY_API_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "PRIVY_REQUEST_TIMEOUT_SECS";
pub const ENV_REQUEST_TTL_SECS: &str = "PRIVY_REQUEST_TTL_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid custody API url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid authorization private key: {0}")]
    InvalidAuthorizationKey(#[source] SignatureError),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

/// Unvalidated configuration as read from a file and/or the environment
///
/// Every field is optional here; [`RawExportConfig::validate`] decides what
/// is actually required.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct RawExportConfig {
    /// Custody application id, sent as `privy-app-id` and as the basic-auth user
    #[serde(default)]
    pub app_id: Option<String>,
    /// Custody application secret, the basic-auth password
    #[serde(default)]
    pub app_secret: Option<String>,
    /// Identifier of the registered authorization key
    ///
    /// Required, and carried on the parsed key for display, but never sent:
    /// the custody service identifies the key by its signature.
    #[serde(default)]
    pub authorization_key_id: Option<String>,
    /// Authorization private key (`wallet-auth:...`, base64 PKCS#8, or PEM)
    #[serde(default)]
    pub authorization_private_key: Option<String>,
    /// Base URL of the custody API, defaults to the hosted service
    #[serde(default)]
    pub api_url: Option<String>,
    /// Timeout for the export call in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// If set, requests carry a signed expiry this many seconds in the future
    #[serde(default)]
    pub request_ttl_secs: Option<u64>,
}

impl std::fmt::Debug for RawExportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("RawExportConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &redacted(&self.app_secret))
            .field("authorization_key_id", &self.authorization_key_id)
            .field(
                "authorization_private_key",
                &redacted(&self.authorization_private_key),
            )
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("request_ttl_secs", &self.request_ttl_secs)
            .finish()
    }
}

impl RawExportConfig {
    /// Path of the config file (custom or default `~/.keyport/config.toml`)
    pub fn config_path(custom_path: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)).join(CONFIG_FILE_NAME))
    }

    /// Read a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_toml = fs::read_to_string(path)?;
        Ok(toml::from_str(&config_toml)?)
    }

    /// Load the config file if there is one, then overlay the environment
    ///
    /// A missing file is fine (environment-only deployments), a broken one
    /// is not.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit = custom_path.is_some();
        let path = Self::config_path(custom_path)?;
        let file_config = if path.exists() {
            tracing::debug!("loading config from {}", path.display());
            Self::from_file(&path)?
        } else if explicit {
            return Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file not found: {}", path.display()),
            )));
        } else {
            Self::default()
        };
        file_config.overlay(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup` (normally the process environment) on top
    /// of this config. Set, non-blank values win.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_APP_ID) {
            self.app_id = Some(v);
        }
        if let Some(v) = get(ENV_APP_SECRET) {
            self.app_secret = Some(v);
        }
        if let Some(v) = get(ENV_AUTHORIZATION_KEY_ID) {
            self.authorization_key_id = Some(v);
        }
        if let Some(v) = get(ENV_AUTHORIZATION_PRIVATE_KEY) {
            self.authorization_private_key = Some(v);
        }
        if let Some(v) = get(ENV_API_URL) {
            self.api_url = Some(v);
        }
        if let Some(v) = get(ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = Some(parse_secs(ENV_REQUEST_TIMEOUT_SECS, &v)?);
        }
        if let Some(v) = get(ENV_REQUEST_TTL_SECS) {
            self.request_ttl_secs = Some(parse_secs(ENV_REQUEST_TTL_SECS, &v)?);
        }
        Ok(self)
    }

    /// Check everything once and produce the immutable config
    ///
    /// # Errors
    ///
    /// - `ConfigError::Missing` for the first absent or blank credential
    /// - `ConfigError::InvalidUrl` if the API url can't serve as a base
    /// - `ConfigError::InvalidAuthorizationKey` if the key doesn't parse
    /// - `ConfigError::InvalidValue` for a zero timeout
    pub fn validate(self) -> Result<ExportConfig, ConfigError> {
        let app_id = required(self.app_id, "app_id")?;
        let app_secret = Zeroizing::new(required(self.app_secret, "app_secret")?);
        let authorization_key_id = required(self.authorization_key_id, "authorization_key_id")?;
        let authorization_private_key = Zeroizing::new(required(
            self.authorization_private_key,
            "authorization_private_key",
        )?);

        let api_url = self.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = parse_api_url(&api_url)?;

        let authorization_key =
            AuthorizationKey::parse(authorization_key_id, &authorization_private_key)
                .map_err(ConfigError::InvalidAuthorizationKey)?;

        let request_timeout = match self.request_timeout_secs {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    name: "request_timeout_secs",
                    reason: "must be greater than zero".to_string(),
                })
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_REQUEST_TIMEOUT,
        };
        let request_ttl = self
            .request_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(ExportConfig {
            app_id,
            app_secret,
            authorization_key,
            api_url,
            request_timeout,
            request_ttl,
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parse_secs(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
            name,
            reason: e.to_string(),
        })
}

fn parse_api_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        url: value.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: value.to_string(),
            reason: "expected an http(s) base url".to_string(),
        });
    }
    Ok(url)
}

/// Validated, read-only process configuration for exports
///
/// Built once at startup by [`RawExportConfig::validate`]; exports only ever
/// borrow it.
#[derive(Clone)]
pub struct ExportConfig {
    app_id: String,
    app_secret: Zeroizing<String>,
    authorization_key: AuthorizationKey,
    api_url: Url,
    request_timeout: Duration,
    request_ttl: Option<Duration>,
}

impl std::fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("authorization_key", &self.authorization_key)
            .field("api_url", &self.api_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .field("request_ttl", &self.request_ttl)
            .finish()
    }
}

impl ExportConfig {
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn app_secret(&self) -> &str {
        &self.app_secret
    }

    pub fn authorization_key(&self) -> &AuthorizationKey {
        &self.authorization_key
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn request_ttl(&self) -> Option<Duration> {
        self.request_ttl
    }
}
