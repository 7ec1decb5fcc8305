//! Static API key authentication
//!
//! Keys have the shape `ts_<id>.<secret>` and are sent as
//! `Authorization: ApiKey <key>`. They never expire and cannot be refreshed.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use common::Secret;

use crate::authentication::{AuthFuture, AuthScheme, Authentication};
use crate::constants::API_KEY_PREFIX;
use crate::error::{Error, Result};

/// Static key credential.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    key: Secret<String>,
}

impl ApiKeyAuth {
    /// Validate `key` and wrap it.
    ///
    /// Fails with distinct messages for a missing key and for a malformed one.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key: String = key.into();
        if key.trim().is_empty() {
            return Err(Error::configuration("API key is required"));
        }
        if !is_valid_api_key(&key) {
            return Err(Error::configuration(format!(
                "Invalid API key format: expected {API_KEY_PREFIX}<id>.<secret>"
            )));
        }
        Ok(Self {
            key: Secret::new(key),
        })
    }

    /// Build from an optional value, treating `None` like an empty key.
    pub fn from_optional(key: Option<String>) -> Result<Self> {
        Self::new(key.unwrap_or_default())
    }

    /// The `<id>` part of the key, safe to log.
    pub fn key_id(&self) -> &str {
        let key = self.key.expose();
        let without_prefix = &key[API_KEY_PREFIX.len()..];
        without_prefix
            .split_once('.')
            .map_or(without_prefix, |(id, _)| id)
    }
}

/// Strict format check: `ts_` prefix, alphanumeric id, exactly one dot,
/// secret over `[A-Za-z0-9_-]`, nothing else (no whitespace).
pub fn is_valid_api_key(key: &str) -> bool {
    let Some(rest) = key.strip_prefix(API_KEY_PREFIX) else {
        return false;
    };
    let Some((id, secret)) = rest.split_once('.') else {
        return false;
    };
    !id.is_empty()
        && !secret.is_empty()
        && id.bytes().all(|b| b.is_ascii_alphanumeric())
        && secret
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl Authentication for ApiKeyAuth {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::ApiKey
    }

    fn apply_auth(&self, headers: &mut HeaderMap) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("ApiKey {}", self.key.expose()))
            .map_err(|e| Error::configuration(format!("API key is not a valid header value: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    fn needs_refresh(&self) -> bool {
        false
    }

    fn refresh(&self) -> AuthFuture<'_, ()> {
        Box::pin(async {
            Err(Error::configuration(
                "API key authentication does not support token refresh",
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "ts_a1B2c3.s3cr3t_value-x";

    #[test]
    fn accepts_documented_shape() {
        let auth = ApiKeyAuth::new(VALID).unwrap();
        assert_eq!(auth.key_id(), "a1B2c3");
    }

    #[test]
    fn missing_key_has_its_own_message() {
        for key in ["", "   "] {
            let err = ApiKeyAuth::new(key).unwrap_err();
            assert_eq!(err.to_string(), "configuration error: API key is required");
        }
        let err = ApiKeyAuth::from_optional(None).unwrap_err();
        assert_eq!(err.to_string(), "configuration error: API key is required");
    }

    #[test]
    fn malformed_keys_are_rejected() {
        for key in [
            "a1B2c3.secret",        // no prefix
            "TS_a1B2c3.secret",     // prefix is case-sensitive
            "ts_a1B2c3",            // no secret
            "ts_.secret",           // empty id
            "ts_a1B2c3.",           // empty secret
            "ts_a1B2c3.sec.ret",    // extra segment
            "ts_a1 B2.secret",      // whitespace
            " ts_a1B2c3.secret",    // leading whitespace
            "ts_a1B2c3.secret\n",   // trailing newline
            "ts_a1-B2.secret",      // id is alphanumeric only
        ] {
            let err = ApiKeyAuth::new(key).unwrap_err();
            assert!(
                err.to_string().contains("Invalid API key format"),
                "{key:?} should be rejected as malformed, got: {err}"
            );
        }
    }

    #[test]
    fn applies_api_key_header() {
        let auth = ApiKeyAuth::new(VALID).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
        auth.apply_auth(&mut headers).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), &format!("ApiKey {VALID}"));
    }

    #[test]
    fn never_needs_refresh() {
        assert!(!ApiKeyAuth::new(VALID).unwrap().needs_refresh());
    }

    #[tokio::test]
    async fn refresh_always_fails() {
        let auth = ApiKeyAuth::new(VALID).unwrap();
        assert!(matches!(auth.refresh().await, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn auth_headers_contains_only_authorization() {
        let auth = ApiKeyAuth::new(VALID).unwrap();
        let headers = auth.auth_headers().await.unwrap();
        assert_eq!(headers.len(), 1);
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[test]
    fn debug_output_redacts_key() {
        let auth = ApiKeyAuth::new(VALID).unwrap();
        assert!(!format!("{auth:?}").contains("s3cr3t"));
    }
}
