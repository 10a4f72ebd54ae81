use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::capabilities::{HttpError, ValidatedUrl, MAX_TIMEOUT_MS};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_REFRESH_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CORRECTION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Upload,
    Correction,
    TokenRefresh,
    Login,
}

impl Endpoint {
    /// Path relative to the API base URL. The trailing slashes are significant
    /// to the backend router.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Upload => "api/upload/",
            Endpoint::Correction => "api/upload/manual/",
            Endpoint::TokenRefresh => "api/token/refresh/",
            Endpoint::Login => "api/login/",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub upload_timeout_ms: u64,
    pub refresh_timeout_ms: u64,
    pub correction_timeout_ms: u64,
    pub login_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
            refresh_timeout_ms: DEFAULT_REFRESH_TIMEOUT_MS,
            correction_timeout_ms: DEFAULT_CORRECTION_TIMEOUT_MS,
            login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ValidatedUrl::new(self.base_url.as_str())
            .map_err(|e| ConfigError::Validation(format!("base_url: {e}")))?;

        for (name, value) in [
            ("upload_timeout_ms", self.upload_timeout_ms),
            ("refresh_timeout_ms", self.refresh_timeout_ms),
            ("correction_timeout_ms", self.correction_timeout_ms),
            ("login_timeout_ms", self.login_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be > 0")));
            }
            if value > MAX_TIMEOUT_MS {
                return Err(ConfigError::Validation(format!(
                    "{name} must be <= {MAX_TIMEOUT_MS}"
                )));
            }
        }
        Ok(())
    }

    pub fn endpoint(&self, endpoint: Endpoint) -> Result<ValidatedUrl, HttpError> {
        let mut base = Url::parse(&self.base_url).map_err(|e| HttpError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        // `join` replaces the last segment unless the base ends in a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let url = base.join(endpoint.path()).map_err(|e| HttpError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        ValidatedUrl::from_url(&url)
    }

    pub fn timeout(&self, endpoint: Endpoint) -> Duration {
        Duration::from_millis(match endpoint {
            Endpoint::Upload => self.upload_timeout_ms,
            Endpoint::Correction => self.correction_timeout_ms,
            Endpoint::TokenRefresh => self.refresh_timeout_ms,
            Endpoint::Login => self.login_timeout_ms,
        })
    }
}
