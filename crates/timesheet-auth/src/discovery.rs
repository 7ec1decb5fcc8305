//! OAuth metadata discovery (RFC 8414, OpenID Connect Discovery, RFC 9728)
//!
//! Fetches the well-known documents for an issuer and caches the combined
//! result per normalized issuer URL for a configurable TTL. The
//! authorization-server document is required; the OpenID configuration and
//! protected-resource documents are optional and their failures are logged
//! and dropped.
//!
//! Concurrent first lookups of the same issuer are not coalesced: each one
//! fetches, and the last to finish wins the cache slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::clock::{self, Clock};
use crate::context::OAuthEndpoints;
use crate::error::{Error, Result};
use crate::pkce::CodeChallengeMethod;

pub const AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";
pub const OPENID_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

/// Default lifetime of a cached discovery result
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default per-document request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// RFC 8414 authorization server metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub response_types_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_types_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_challenge_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_endpoint_auth_methods_supported: Vec<String>,
    #[serde(flatten)]
    pub additional_fields: HashMap<String, serde_json::Value>,
}

/// OpenID Connect provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_types_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(flatten)]
    pub additional_fields: HashMap<String, serde_json::Value>,
}

/// RFC 9728 protected resource metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bearer_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
    #[serde(flatten)]
    pub additional_fields: HashMap<String, serde_json::Value>,
}

/// Everything learned about one issuer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OAuthDiscoveryResult {
    /// Normalized issuer URL; also the cache key
    pub issuer: String,
    pub authorization_server: AuthorizationServerMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openid_configuration: Option<OpenIdConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protected_resource: Option<ProtectedResourceMetadata>,
    pub fetched_at: SystemTime,
}

impl OAuthDiscoveryResult {
    /// Whether the server advertises `method` for PKCE.
    pub fn supports_pkce(&self, method: CodeChallengeMethod) -> bool {
        self.authorization_server
            .code_challenge_methods_supported
            .iter()
            .any(|m| m == method.as_str())
    }

    /// Whether the server accepts `grant_type`. An absent list means the
    /// RFC 8414 default of `authorization_code` and `implicit`.
    pub fn supports_grant_type(&self, grant_type: &str) -> bool {
        let advertised = &self.authorization_server.grant_types_supported;
        if advertised.is_empty() {
            return matches!(grant_type, "authorization_code" | "implicit");
        }
        advertised.iter().any(|g| g == grant_type)
    }

    pub fn endpoints(&self) -> OAuthEndpoints {
        OAuthEndpoints::from(self)
    }
}

/// Tuning for an `OAuthDiscovery` instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    pub fetch_openid_configuration: bool,
    pub fetch_protected_resource: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fetch_openid_configuration: false,
            fetch_protected_resource: false,
        }
    }
}

struct CacheEntry {
    result: OAuthDiscoveryResult,
    expires_at: SystemTime,
}

/// Caller-owned discovery client with an in-memory TTL cache.
pub struct OAuthDiscovery {
    http: reqwest::Client,
    options: DiscoveryOptions,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for OAuthDiscovery {
    fn default() -> Self {
        Self::new(DiscoveryOptions::default())
    }
}

impl std::fmt::Debug for OAuthDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthDiscovery")
            .field("options", &self.options)
            .field("cached_issuers", &self.cache.lock().len())
            .finish_non_exhaustive()
    }
}

impl OAuthDiscovery {
    pub fn new(options: DiscoveryOptions) -> Self {
        Self {
            http: reqwest::Client::new(),
            options,
            clock: clock::system(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Discover metadata for `issuer_url`, serving from cache while fresh.
    pub async fn discover(&self, issuer_url: &str) -> Result<OAuthDiscoveryResult> {
        let issuer = normalize_issuer(issuer_url);
        if issuer.is_empty() {
            return Err(Error::Discovery("issuer URL is empty".into()));
        }

        let now = self.clock.now();
        let cached = {
            let mut cache = self.cache.lock();
            match cache.get(&issuer) {
                Some(entry) if now < entry.expires_at => Some(entry.result.clone()),
                Some(_) => {
                    cache.remove(&issuer);
                    debug!(issuer = %issuer, "discovery cache entry expired");
                    None
                }
                None => None,
            }
        };
        if let Some(result) = cached {
            debug!(issuer = %issuer, "discovery cache hit");
            return Ok(result);
        }

        let authorization_server = self.fetch_authorization_server(&issuer).await?;

        let openid_configuration = if self.options.fetch_openid_configuration {
            self.fetch_optional::<OpenIdConfiguration>(
                &issuer,
                OPENID_CONFIGURATION_PATH,
                &["issuer", "authorization_endpoint", "token_endpoint", "jwks_uri"],
                &[],
            )
            .await
        } else {
            None
        };

        let protected_resource = if self.options.fetch_protected_resource {
            self.fetch_optional::<ProtectedResourceMetadata>(
                &issuer,
                PROTECTED_RESOURCE_PATH,
                &["resource"],
                &["authorization_servers"],
            )
            .await
        } else {
            None
        };

        let fetched_at = self.clock.now();
        let result = OAuthDiscoveryResult {
            issuer: issuer.clone(),
            authorization_server,
            openid_configuration,
            protected_resource,
            fetched_at,
        };

        self.cache.lock().insert(
            issuer.clone(),
            CacheEntry {
                result: result.clone(),
                expires_at: fetched_at + self.options.cache_ttl,
            },
        );
        info!(
            issuer = %issuer,
            openid = result.openid_configuration.is_some(),
            protected_resource = result.protected_resource.is_some(),
            "OAuth metadata discovered"
        );
        Ok(result)
    }

    /// True when a fresh entry exists for `issuer_url`.
    pub fn is_cached(&self, issuer_url: &str) -> bool {
        let issuer = normalize_issuer(issuer_url);
        let now = self.clock.now();
        self.cache
            .lock()
            .get(&issuer)
            .is_some_and(|entry| now < entry.expires_at)
    }

    /// Entries held, including expired ones not yet looked up again.
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn clear_cache_for_issuer(&self, issuer_url: &str) {
        self.cache.lock().remove(&normalize_issuer(issuer_url));
    }

    async fn fetch_authorization_server(&self, issuer: &str) -> Result<AuthorizationServerMetadata> {
        let url = format!("{issuer}{AUTHORIZATION_SERVER_PATH}");
        let document = self.fetch_document(&url).await?;
        parse_document(
            document,
            "authorization server metadata",
            &["issuer", "authorization_endpoint", "token_endpoint"],
            &["response_types_supported"],
        )
    }

    async fn fetch_optional<T: DeserializeOwned>(
        &self,
        issuer: &str,
        path: &str,
        required: &[&str],
        required_lists: &[&str],
    ) -> Option<T> {
        let url = format!("{issuer}{path}");
        let outcome = match self.fetch_document(&url).await {
            Ok(document) => parse_document(document, path, required, required_lists),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(document) => Some(document),
            Err(e) => {
                warn!(url = %url, error = %e, "optional discovery document unavailable");
                None
            }
        }
    }

    async fn fetch_document(&self, url: &str) -> Result<serde_json::Value> {
        debug!(url, "fetching discovery document");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .timeout(self.options.request_timeout)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Discovery(format!("GET {url} returned {status}")));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Error::Discovery(format!("invalid JSON from {url}: {e}")))
    }
}

/// Check required fields by name before typed deserialization so the error
/// names the missing field.
fn parse_document<T: DeserializeOwned>(
    document: serde_json::Value,
    what: &str,
    required: &[&str],
    required_lists: &[&str],
) -> Result<T> {
    for field in required {
        let present = document
            .get(field)
            .and_then(|v| v.as_str())
            .is_some_and(|s| !s.is_empty());
        if !present {
            return Err(Error::Discovery(format!(
                "{what} is missing required field `{field}`"
            )));
        }
    }
    for field in required_lists {
        let present = document
            .get(field)
            .and_then(|v| v.as_array())
            .is_some_and(|a| !a.is_empty());
        if !present {
            return Err(Error::Discovery(format!(
                "{what} is missing required field `{field}` (must be a non-empty array)"
            )));
        }
    }
    serde_json::from_value(document).map_err(|e| Error::Discovery(format!("invalid {what}: {e}")))
}

fn normalize_issuer(issuer_url: &str) -> String {
    issuer_url.trim().trim_end_matches('/').to_string()
}

/// Convenience wrapper around [`OAuthDiscovery::discover`].
///
/// Custom `options` always get a fresh instance; otherwise the supplied
/// instance (and its cache) is used, falling back to a fresh default one.
pub async fn discover_oauth(
    issuer_url: &str,
    options: Option<DiscoveryOptions>,
    instance: Option<&OAuthDiscovery>,
) -> Result<OAuthDiscoveryResult> {
    match (options, instance) {
        (Some(options), _) => OAuthDiscovery::new(options).discover(issuer_url).await,
        (None, Some(discovery)) => discovery.discover(issuer_url).await,
        (None, None) => OAuthDiscovery::default().discover(issuer_url).await,
    }
}
