//! Bearer token state shared by the OAuth credential types
//!
//! Holds the mutable access/refresh token pair, derives expiry from the
//! access token, and runs refreshes through a single-flight slot: the first
//! caller installs a shared refresh future, concurrent callers clone and
//! await it, so at most one token request is outstanding per credential and
//! every waiter sees the same outcome.
//!
//! Locks are `parking_lot` and are never held across an `.await`.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, info};

use common::Secret;

use crate::clock::Clock;
use crate::constants::REFRESH_BUFFER_SECS;
use crate::error::{Error, Result};
use crate::jwt;
use crate::token::{self, RefreshGrant, TokenResponse};

type SharedRefresh = Shared<BoxFuture<'static, Result<()>>>;

/// Current credential material.
#[derive(Debug, Default)]
pub(crate) struct TokenState {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
    pub token_expiry: Option<SystemTime>,
}

/// Static parameters of the refresh grant.
#[derive(Debug)]
pub(crate) struct RefreshSettings {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
    pub resource: Option<String>,
}

pub(crate) struct BearerCore {
    state: Arc<RwLock<TokenState>>,
    settings: Arc<RefreshSettings>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl BearerCore {
    pub(crate) fn new(
        access_token: Option<String>,
        refresh_token: Option<String>,
        settings: RefreshSettings,
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let token_expiry = access_token
            .as_deref()
            .map(|token| jwt::token_expiry(token, clock.now()));
        let state = TokenState {
            access_token: access_token.map(Secret::new),
            refresh_token: refresh_token.map(Secret::new),
            token_expiry,
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            settings: Arc::new(settings),
            http,
            clock,
            in_flight: Mutex::new(None),
        }
    }

    pub(crate) fn apply_auth(&self, headers: &mut HeaderMap) -> Result<()> {
        let state = self.state.read();
        let token = state.access_token.as_ref().ok_or_else(|| {
            Error::configuration("No access token available; refresh the credentials first")
        })?;
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|e| Error::configuration(format!("access token is not a valid header value: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// True when a refresh token exists and there is either no access token
    /// yet or the current one expires within the refresh buffer.
    pub(crate) fn needs_refresh(&self) -> bool {
        let state = self.state.read();
        if state.refresh_token.is_none() {
            return false;
        }
        if state.access_token.is_none() {
            return true;
        }
        match state.token_expiry {
            Some(expiry) => {
                self.clock.now() + Duration::from_secs(REFRESH_BUFFER_SECS) >= expiry
            }
            None => true,
        }
    }

    pub(crate) fn has_refresh_token(&self) -> bool {
        self.state.read().refresh_token.is_some()
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .access_token
            .as_ref()
            .map(|t| t.expose().clone())
    }

    pub(crate) fn refresh_token(&self) -> Option<String> {
        self.state
            .read()
            .refresh_token
            .as_ref()
            .map(|t| t.expose().clone())
    }

    pub(crate) fn token_expiry(&self) -> Option<SystemTime> {
        self.state.read().token_expiry
    }

    pub(crate) fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Refresh the access token, joining an in-flight refresh if one exists.
    pub(crate) async fn refresh(&self) -> Result<()> {
        if !self.has_refresh_token() {
            return Err(Error::configuration("No refresh token available"));
        }

        let flight = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(existing) => {
                    debug!("joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    let shared = self.start_refresh();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };

        let result = flight.clone().await;

        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }
        result
    }

    /// Build the shared refresh future. It owns clones of the state handles
    /// rather than the core, so the slot never keeps the core alive.
    fn start_refresh(&self) -> SharedRefresh {
        let state = Arc::clone(&self.state);
        let settings = Arc::clone(&self.settings);
        let http = self.http.clone();
        let clock = Arc::clone(&self.clock);

        let fut: BoxFuture<'static, Result<()>> = Box::pin(async move {
            let refresh_token = state
                .read()
                .refresh_token
                .as_ref()
                .map(|t| t.expose().clone())
                .ok_or_else(|| Error::configuration("No refresh token available"))?;

            let grant = RefreshGrant {
                refresh_token: &refresh_token,
                client_id: &settings.client_id,
                client_secret: settings.client_secret.as_ref().map(|s| s.expose().as_str()),
                resource: settings.resource.as_deref(),
            };
            let response = token::refresh_token(&http, &settings.token_endpoint, &grant).await?;
            store_tokens(&state, response, clock.now());
            info!(client_id = %settings.client_id, "access token refreshed");
            Ok(())
        });
        fut.shared()
    }
}

/// Replace the access token (and the refresh token if rotated) and
/// re-derive expiry from the new access token.
fn store_tokens(state: &RwLock<TokenState>, response: TokenResponse, now: SystemTime) {
    let expiry = jwt::token_expiry(&response.access_token, now);
    let mut state = state.write();
    state.access_token = Some(Secret::new(response.access_token));
    if let Some(rotated) = response.refresh_token {
        state.refresh_token = Some(Secret::new(rotated));
    }
    state.token_expiry = Some(expiry);
}
