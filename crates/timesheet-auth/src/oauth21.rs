//! OAuth 2.1 credentials: PKCE authorization-code flow, public clients,
//! RFC 8707 resource indicators and de-duplicated refresh.
//!
//! Lifecycle of one credential:
//!
//! ```text
//! with access token ──► valid ──(clock passes exp - 5m)──► expiring
//! with refresh opts ──► no token                              │
//!        │                                                    │
//!        └──────── auth_headers() while needs_refresh() ◄─────┘
//!                           │
//!                      refreshing (one request, shared by all callers)
//!                      ├─ ok  ──► valid
//!                      └─ err ──► error returned; state unchanged
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use reqwest::header::HeaderMap;
use tracing::info;
use url::Url;

use common::Secret;

use crate::authentication::{AuthFuture, AuthScheme, Authentication};
use crate::bearer::{BearerCore, RefreshSettings};
use crate::context::{OAuthContext, OAuthEndpoints};
use crate::error::{Error, Result};
use crate::pkce::{self, CodeChallengeMethod, PkceCodePair};
use crate::token::{self, CodeExchange};

/// Refresh-only construction: the first `auth_headers()` call fetches an
/// access token.
#[derive(Debug, Clone)]
pub struct OAuth21Options {
    pub client_id: String,
    /// Absent for public (PKCE-only) clients
    pub client_secret: Option<Secret<String>>,
    pub refresh_token: String,
    pub resource: Option<String>,
}

/// What an `OAuth21Auth` is built from.
#[derive(Debug, Clone)]
pub enum OAuth21Credentials {
    AccessToken(String),
    Refresh(OAuth21Options),
}

impl From<String> for OAuth21Credentials {
    fn from(token: String) -> Self {
        OAuth21Credentials::AccessToken(token)
    }
}

impl From<&str> for OAuth21Credentials {
    fn from(token: &str) -> Self {
        OAuth21Credentials::AccessToken(token.to_string())
    }
}

impl From<OAuth21Options> for OAuth21Credentials {
    fn from(options: OAuth21Options) -> Self {
        OAuth21Credentials::Refresh(options)
    }
}

/// Parameters for completing the PKCE authorization-code flow.
#[derive(Debug, Clone)]
pub struct OAuth21CodeParams {
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
    pub code_verifier: String,
    pub resource: Option<String>,
}

/// Query parameters of the authorization URL.
#[derive(Debug, Clone)]
pub struct AuthorizationUrlParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: CodeChallengeMethod,
    pub state: Option<String>,
    pub scope: Option<String>,
    pub resource: Option<String>,
}

impl AuthorizationUrlParams {
    /// Params for a generated PKCE pair, leaving state/scope/resource unset.
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>, pkce: &PkceCodePair) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            code_challenge: pkce.code_challenge.clone(),
            code_challenge_method: pkce.code_challenge_method,
            state: None,
            scope: None,
            resource: None,
        }
    }
}

#[derive(Clone)]
pub struct OAuth21Auth {
    core: Arc<BearerCore>,
}

impl std::fmt::Debug for OAuth21Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let settings = self.core.settings();
        f.debug_struct("OAuth21Auth")
            .field("client_id", &settings.client_id)
            .field("resource", &settings.resource)
            .field("refreshable", &self.core.has_refresh_token())
            .finish_non_exhaustive()
    }
}

impl OAuth21Auth {
    pub fn new(credentials: impl Into<OAuth21Credentials>) -> Self {
        Self::with_context(credentials, &OAuthContext::default())
    }

    pub fn with_context(credentials: impl Into<OAuth21Credentials>, ctx: &OAuthContext) -> Self {
        match credentials.into() {
            OAuth21Credentials::AccessToken(access_token) => Self::build(
                ctx,
                Some(access_token),
                None,
                RefreshSettings {
                    token_endpoint: ctx.endpoints.token_endpoint.clone(),
                    client_id: String::new(),
                    client_secret: None,
                    resource: None,
                },
            ),
            OAuth21Credentials::Refresh(options) => Self::build(
                ctx,
                None,
                Some(options.refresh_token),
                RefreshSettings {
                    token_endpoint: ctx.endpoints.token_endpoint.clone(),
                    client_id: options.client_id,
                    client_secret: options.client_secret,
                    resource: options.resource,
                },
            ),
        }
    }

    fn build(
        ctx: &OAuthContext,
        access_token: Option<String>,
        refresh_token: Option<String>,
        settings: RefreshSettings,
    ) -> Self {
        let core = BearerCore::new(
            access_token,
            refresh_token,
            settings,
            ctx.http.clone(),
            ctx.clock.clone(),
        );
        Self { core: Arc::new(core) }
    }

    /// Exchange an authorization code plus PKCE verifier for tokens.
    ///
    /// The verifier is checked locally first; a malformed one never reaches
    /// the network.
    pub async fn from_authorization_code(ctx: &OAuthContext, params: OAuth21CodeParams) -> Result<Self> {
        if !pkce::is_valid_code_verifier(&params.code_verifier) {
            return Err(Error::configuration(format!(
                "Invalid PKCE code verifier: must be {}-{} characters of [A-Za-z0-9-._~]",
                pkce::MIN_VERIFIER_LENGTH,
                pkce::MAX_VERIFIER_LENGTH
            )));
        }

        let exchange = CodeExchange {
            code: &params.code,
            redirect_uri: &params.redirect_uri,
            client_id: &params.client_id,
            client_secret: params.client_secret.as_ref().map(|s| s.expose().as_str()),
            code_verifier: Some(&params.code_verifier),
            resource: params.resource.as_deref(),
        };
        let response = token::exchange_code(&ctx.http, &ctx.endpoints.token_endpoint, &exchange).await?;
        info!(
            client_id = %params.client_id,
            refreshable = response.refresh_token.is_some(),
            resource = params.resource.as_deref().unwrap_or(""),
            "authorization code exchanged with PKCE"
        );

        let refreshable = response.refresh_token.is_some();
        let settings = RefreshSettings {
            token_endpoint: ctx.endpoints.token_endpoint.clone(),
            client_id: if refreshable { params.client_id } else { String::new() },
            client_secret: if refreshable { params.client_secret } else { None },
            resource: if refreshable { params.resource } else { None },
        };
        Ok(Self::build(
            ctx,
            Some(response.access_token),
            response.refresh_token,
            settings,
        ))
    }

    /// Build the URL the user visits to authorize this client.
    pub fn build_authorization_url(endpoints: &OAuthEndpoints, params: &AuthorizationUrlParams) -> Result<String> {
        let mut url = Url::parse(&endpoints.authorization_endpoint).map_err(|e| {
            Error::configuration(format!(
                "invalid authorization endpoint {}: {e}",
                endpoints.authorization_endpoint
            ))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &params.client_id)
                .append_pair("redirect_uri", &params.redirect_uri)
                .append_pair("code_challenge", &params.code_challenge)
                .append_pair("code_challenge_method", params.code_challenge_method.as_str());
            if let Some(state) = &params.state {
                query.append_pair("state", state);
            }
            if let Some(scope) = &params.scope {
                query.append_pair("scope", scope);
            }
            if let Some(resource) = &params.resource {
                query.append_pair("resource", resource);
            }
        }
        Ok(url.into())
    }

    /// Fresh verifier/challenge pair with the default verifier length.
    pub fn generate_pkce(method: CodeChallengeMethod) -> Result<PkceCodePair> {
        pkce::generate_pkce_code_pair(method, pkce::DEFAULT_VERIFIER_LENGTH)
    }

    pub fn access_token(&self) -> Option<String> {
        self.core.access_token()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.core.refresh_token()
    }

    pub fn token_expiry(&self) -> Option<SystemTime> {
        self.core.token_expiry()
    }

    pub fn resource(&self) -> Option<&str> {
        self.core.settings().resource.as_deref()
    }
}

impl Authentication for OAuth21Auth {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::OAuth21
    }

    fn apply_auth(&self, headers: &mut HeaderMap) -> Result<()> {
        self.core.apply_auth(headers)
    }

    fn needs_refresh(&self) -> bool {
        self.core.needs_refresh()
    }

    fn refresh(&self) -> AuthFuture<'_, ()> {
        Box::pin(self.core.refresh())
    }
}
