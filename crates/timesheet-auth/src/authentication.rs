//! Authentication abstraction used by the API client
//!
//! Defines the `Authentication` trait that decouples the request pipeline
//! from credential type. `ApiKeyAuth` is a static header; `OAuth2Auth` and
//! `OAuth21Auth` own bearer tokens and refresh them on demand. The client
//! only ever calls `auth_headers()` before each attempt.

use std::future::Future;
use std::pin::Pin;

use reqwest::header::HeaderMap;

use crate::error::Result;

/// Boxed future returned by trait methods, for dyn-compatibility (`Arc<dyn Authentication>`).
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Credential scheme reported by an `Authentication` implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    ApiKey,
    OAuth2,
    OAuth21,
}

impl AuthScheme {
    /// Label for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::ApiKey => "api_key",
            AuthScheme::OAuth2 => "oauth2",
            AuthScheme::OAuth21 => "oauth2.1",
        }
    }
}

/// Capability contract shared by every credential type.
///
/// - `apply_auth` writes the `Authorization` header from current state
/// - `needs_refresh` is evaluated fresh on every call, never cached
/// - `refresh` renews credentials over the network (if the scheme can)
/// - `auth_headers` refreshes when needed, then returns the headers to send
pub trait Authentication: std::fmt::Debug + Send + Sync {
    fn scheme(&self) -> AuthScheme;

    /// Set the `Authorization` header on `headers`, replacing any existing value.
    fn apply_auth(&self, headers: &mut HeaderMap) -> Result<()>;

    /// Whether `auth_headers` would refresh before answering.
    fn needs_refresh(&self) -> bool;

    /// Renew credentials.
    fn refresh(&self) -> AuthFuture<'_, ()>;

    /// Headers to attach to an outgoing request, refreshing first if needed.
    ///
    /// A refresh failure is returned as-is; no headers are produced from
    /// stale credentials.
    fn auth_headers(&self) -> AuthFuture<'_, HeaderMap> {
        Box::pin(async move {
            if self.needs_refresh() {
                self.refresh().await?;
            }
            let mut headers = HeaderMap::new();
            self.apply_auth(&mut headers)?;
            Ok(headers)
        })
    }
}
