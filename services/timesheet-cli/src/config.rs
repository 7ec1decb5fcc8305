//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Secrets (API key, client secret, tokens) come from `TIMESHEET_*` env vars
//! or, for the API key, `api_key_file`. They are never read from the TOML
//! directly.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use timesheet_auth::{
    API_BASE_URL, ApiKeyAuth, Authentication, OAuth2Auth, OAuth2Credentials, OAuth21Auth,
    OAuth21Credentials, OAuth21Options, OAuthContext,
};
use timesheet_client::RetryConfig;

pub const API_KEY_ENV: &str = "TIMESHEET_API_KEY";
pub const CLIENT_SECRET_ENV: &str = "TIMESHEET_CLIENT_SECRET";
pub const REFRESH_TOKEN_ENV: &str = "TIMESHEET_REFRESH_TOKEN";
pub const ACCESS_TOKEN_ENV: &str = "TIMESHEET_ACCESS_TOKEN";
pub const CONFIG_PATH_ENV: &str = "TIMESHEET_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "timesheet.toml";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// API endpoint and client settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            log_format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AuthMethod {
    #[serde(rename = "api_key")]
    ApiKey,
    #[serde(rename = "oauth2")]
    OAuth2,
    #[serde(rename = "oauth21")]
    OAuth21,
}

/// Credential settings
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// RFC 8707 resource indicator (OAuth 2.1 only)
    #[serde(default)]
    pub resource: Option<String>,
    /// When set, endpoints are discovered from this issuer instead of the defaults
    #[serde(default)]
    pub issuer: Option<String>,
    /// Path to a file containing the API key (alternative to TIMESHEET_API_KEY)
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    #[serde(skip)]
    pub refresh_token: Option<Secret<String>>,
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
}

fn default_base_url() -> String {
    API_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn secret_from_env(name: &str) -> Option<Secret<String>> {
    std::env::var(name)
        .ok()
        .map(Secret::new)
        .filter(|s| !s.is_blank())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// API key resolution order:
    /// 1. TIMESHEET_API_KEY env var
    /// 2. api_key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        config
            .retry
            .validate()
            .map_err(|e| common::Error::Config(e.to_string()))?;

        if let Some(key) = secret_from_env(API_KEY_ENV) {
            config.auth.api_key = Some(key);
        } else if let Some(ref key_file) = config.auth.api_key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read api_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            let key = key.trim().to_owned();
            if !key.is_empty() {
                config.auth.api_key = Some(Secret::new(key));
            }
        }

        config.auth.client_secret = secret_from_env(CLIENT_SECRET_ENV);
        config.auth.refresh_token = secret_from_env(REFRESH_TOKEN_ENV);
        config.auth.access_token = secret_from_env(ACCESS_TOKEN_ENV);

        Ok(config)
    }

    /// Resolve config file path from CLI arg or TIMESHEET_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Build the configured credential.
    ///
    /// `ctx` supplies the token endpoint used for refreshes.
    pub fn authentication(&self, ctx: &OAuthContext) -> common::Result<Arc<dyn Authentication>> {
        let auth = &self.auth;
        match auth.method {
            AuthMethod::ApiKey => {
                let key = auth.api_key.as_ref().ok_or_else(|| {
                    common::Error::Config(format!(
                        "auth.method = \"api_key\" needs {API_KEY_ENV} or auth.api_key_file"
                    ))
                })?;
                let auth = ApiKeyAuth::new(key.expose().clone())
                    .map_err(|e| common::Error::Config(e.to_string()))?;
                Ok(Arc::new(auth))
            }
            AuthMethod::OAuth2 => {
                let access_token = auth.access_token.as_ref().ok_or_else(|| {
                    common::Error::Config(format!(
                        "auth.method = \"oauth2\" needs {ACCESS_TOKEN_ENV}"
                    ))
                })?;
                let creds = OAuth2Credentials {
                    access_token: access_token.expose().clone(),
                    refresh_token: auth.refresh_token.as_ref().map(|t| t.expose().clone()),
                    client_id: auth.client_id.clone().unwrap_or_default(),
                    client_secret: auth.client_secret.clone(),
                };
                if creds.refresh_token.is_some() && creds.client_id.is_empty() {
                    return Err(common::Error::Config(
                        "auth.client_id is required to refresh OAuth2 tokens".into(),
                    ));
                }
                Ok(Arc::new(OAuth2Auth::with_context(creds, ctx)))
            }
            AuthMethod::OAuth21 => {
                let creds = match (&auth.refresh_token, &auth.access_token) {
                    (Some(refresh), access) => {
                        if access.is_some() {
                            warn!(
                                "{ACCESS_TOKEN_ENV} ignored: oauth21 with a refresh token mints its own access token"
                            );
                        }
                        let client_id = auth.client_id.clone().ok_or_else(|| {
                            common::Error::Config(
                                "auth.client_id is required to refresh OAuth 2.1 tokens".into(),
                            )
                        })?;
                        OAuth21Credentials::Refresh(OAuth21Options {
                            client_id,
                            client_secret: auth.client_secret.clone(),
                            refresh_token: refresh.expose().clone(),
                            resource: auth.resource.clone(),
                        })
                    }
                    (None, Some(access)) => OAuth21Credentials::AccessToken(access.expose().clone()),
                    (None, None) => {
                        return Err(common::Error::Config(format!(
                            "auth.method = \"oauth21\" needs {REFRESH_TOKEN_ENV} or {ACCESS_TOKEN_ENV}"
                        )));
                    }
                };
                Ok(Arc::new(OAuth21Auth::with_context(creds, ctx)))
            }
        }
    }

    /// `client_id` and `redirect_uri`, both required for the browser flows.
    pub fn authorization_client(&self) -> common::Result<(&str, &str)> {
        let client_id = self
            .auth
            .client_id
            .as_deref()
            .ok_or_else(|| common::Error::Config("auth.client_id is required".into()))?;
        let redirect_uri = self
            .auth
            .redirect_uri
            .as_deref()
            .ok_or_else(|| common::Error::Config("auth.redirect_uri is required".into()))?;
        Ok((client_id, redirect_uri))
    }
}
