//! Access token lifetime inference
//!
//! The token endpoint's `expires_in` is not always present, so token lifetime
//! is read from the access token itself: a compact JWT carries an `exp` claim
//! (seconds since the epoch) in its payload segment. The signature is not
//! checked; the client only needs a hint for when to refresh.
//!
//! Opaque (non-JWT) tokens are common, so an unreadable token falls back to
//! `now + DEFAULT_TOKEN_LIFETIME_SECS`.

use std::time::{Duration, SystemTime};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::constants::DEFAULT_TOKEN_LIFETIME_SECS;

/// Read the `exp` claim of a compact JWT.
///
/// Returns `None` for anything that is not three dot-separated segments with
/// a base64url JSON payload containing a numeric `exp`.
pub fn decode_expiry(token: &str) -> Option<SystemTime> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_f64()?;
    if !exp.is_finite() {
        return None;
    }
    // pre-epoch expiry is still an expired token
    if exp <= 0.0 {
        return Some(SystemTime::UNIX_EPOCH);
    }
    let exp = Duration::try_from_secs_f64(exp).ok()?;

    SystemTime::UNIX_EPOCH.checked_add(exp)
}

/// Expiry of `token`, falling back to one hour after `now`.
pub fn token_expiry(token: &str, now: SystemTime) -> SystemTime {
    decode_expiry(token).unwrap_or_else(|| now + Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS))
}
