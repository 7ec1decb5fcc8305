//! OAuth 2.0 bearer credentials with refresh-token support

use std::time::SystemTime;

use reqwest::header::HeaderMap;
use tracing::info;
use url::Url;

use common::Secret;

use crate::authentication::{AuthFuture, AuthScheme, Authentication};
use crate::bearer::{BearerCore, RefreshSettings};
use crate::context::{OAuthContext, OAuthEndpoints};
use crate::error::{Error, Result};
use crate::token::{self, CodeExchange};

/// Client registration and tokens for a confidential OAuth 2.0 client.
#[derive(Debug, Clone)]
pub struct OAuth2Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
}

/// Parameters for completing the authorization-code flow.
#[derive(Debug, Clone)]
pub struct OAuth2CodeParams {
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
}

/// Bearer credential that refreshes itself through the token endpoint.
///
/// Without a refresh token it behaves as a plain bearer: `needs_refresh()`
/// is always false and `refresh()` fails.
#[derive(Clone)]
pub struct OAuth2Auth {
    core: std::sync::Arc<BearerCore>,
}

impl std::fmt::Debug for OAuth2Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Auth")
            .field("client_id", &self.core.settings().client_id)
            .field("refreshable", &self.core.has_refresh_token())
            .finish_non_exhaustive()
    }
}

impl OAuth2Auth {
    /// Plain bearer token; never refreshes.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self::with_context(
            OAuth2Credentials {
                access_token: access_token.into(),
                refresh_token: None,
                client_id: String::new(),
                client_secret: None,
            },
            &OAuthContext::default(),
        )
    }

    pub fn new(credentials: OAuth2Credentials) -> Self {
        Self::with_context(credentials, &OAuthContext::default())
    }

    pub fn with_context(credentials: OAuth2Credentials, ctx: &OAuthContext) -> Self {
        let settings = RefreshSettings {
            token_endpoint: ctx.endpoints.token_endpoint.clone(),
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            resource: None,
        };
        let core = BearerCore::new(
            Some(credentials.access_token),
            credentials.refresh_token,
            settings,
            ctx.http.clone(),
            ctx.clock.clone(),
        );
        Self {
            core: std::sync::Arc::new(core),
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Returns a refreshable credential when the server issued a refresh
    /// token, a plain bearer otherwise.
    pub async fn from_authorization_code(ctx: &OAuthContext, params: OAuth2CodeParams) -> Result<Self> {
        let exchange = CodeExchange {
            code: &params.code,
            redirect_uri: &params.redirect_uri,
            client_id: &params.client_id,
            client_secret: params.client_secret.as_ref().map(|s| s.expose().as_str()),
            code_verifier: None,
            resource: None,
        };
        let response = token::exchange_code(&ctx.http, &ctx.endpoints.token_endpoint, &exchange).await?;
        info!(
            client_id = %params.client_id,
            refreshable = response.refresh_token.is_some(),
            "authorization code exchanged"
        );

        Ok(Self::with_context(
            OAuth2Credentials {
                access_token: response.access_token,
                refresh_token: response.refresh_token,
                client_id: params.client_id,
                client_secret: params.client_secret,
            },
            ctx,
        ))
    }

    /// Build the URL the user visits to authorize this client.
    pub fn build_authorization_url(
        endpoints: &OAuthEndpoints,
        client_id: &str,
        redirect_uri: &str,
        state: Option<&str>,
    ) -> Result<String> {
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
                .append_pair("client_id", client_id)
                .append_pair("redirect_uri", redirect_uri);
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url.into())
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
}

impl Authentication for OAuth2Auth {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::OAuth2
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::jwt::tests::jwt_with_claims;
    use reqwest::header::AUTHORIZATION;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NOW: u64 = 1_700_000_000;

    fn ctx_for(server: &MockServer, clock: &ManualClock) -> OAuthContext {
        OAuthContext::default()
            .with_endpoints(OAuthEndpoints {
                authorization_endpoint: format!("{}/oauth2/auth", server.uri()),
                token_endpoint: format!("{}/oauth2/token", server.uri()),
            })
            .with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn bearer_sets_header_and_never_refreshes() {
        let auth = OAuth2Auth::bearer("at_plain");
        let mut headers = HeaderMap::new();
        auth.apply_auth(&mut headers).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer at_plain");
        assert!(!auth.needs_refresh());
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails() {
        let auth = OAuth2Auth::bearer("at_plain");
        let err = auth.refresh().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: No refresh token available"
        );
    }

    #[tokio::test]
    async fn refresh_posts_client_credentials() {
        let server = MockServer::start().await;
        let new_token = jwt_with_claims(serde_json::json!({"exp": NOW + 7200}));
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt_1"))
            .and(body_string_contains("client_id=cid"))
            .and(body_string_contains("client_secret=csecret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": new_token,
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let clock = ManualClock::at_unix(NOW);
        let expired = jwt_with_claims(serde_json::json!({"exp": NOW - 10}));
        let auth = OAuth2Auth::with_context(
            OAuth2Credentials {
                access_token: expired,
                refresh_token: Some("rt_1".into()),
                client_id: "cid".into(),
                client_secret: Some(Secret::from("csecret")),
            },
            &ctx_for(&server, &clock),
        );
        assert!(auth.needs_refresh());

        let headers = auth.auth_headers().await.unwrap();
        assert_eq!(
            headers.get(AUTHORIZATION).unwrap(),
            &format!("Bearer {new_token}")
        );
        assert!(!auth.needs_refresh());
        assert_eq!(
            auth.token_expiry(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(NOW + 7200))
        );
    }

    #[tokio::test]
    async fn concurrent_auth_headers_refresh_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "at_fresh"}))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let clock = ManualClock::at_unix(NOW);
        let auth = OAuth2Auth::with_context(
            OAuth2Credentials {
                access_token: jwt_with_claims(serde_json::json!({"exp": NOW})),
                refresh_token: Some("rt".into()),
                client_id: "cid".into(),
                client_secret: None,
            },
            &ctx_for(&server, &clock),
        );

        let (a, b) = tokio::join!(auth.auth_headers(), auth.auth_headers());
        assert_eq!(a.unwrap().get(AUTHORIZATION).unwrap(), "Bearer at_fresh");
        assert_eq!(b.unwrap().get(AUTHORIZATION).unwrap(), "Bearer at_fresh");
    }

    #[tokio::test]
    async fn code_exchange_without_refresh_token_yields_plain_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "at_x"})),
            )
            .mount(&server)
            .await;

        let clock = ManualClock::at_unix(NOW);
        let auth = OAuth2Auth::from_authorization_code(
            &ctx_for(&server, &clock),
            OAuth2CodeParams {
                code: "the-code".into(),
                redirect_uri: "http://localhost:8765/callback".into(),
                client_id: "cid".into(),
                client_secret: Some(Secret::from("csecret")),
            },
        )
        .await
        .unwrap();

        assert_eq!(auth.access_token().as_deref(), Some("at_x"));
        assert!(auth.refresh_token().is_none());
        assert!(!auth.needs_refresh());
    }

    #[tokio::test]
    async fn code_exchange_with_refresh_token_is_refreshable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at_x",
                "refresh_token": "rt_x",
            })))
            .mount(&server)
            .await;

        let clock = ManualClock::at_unix(NOW);
        let auth = OAuth2Auth::from_authorization_code(
            &ctx_for(&server, &clock),
            OAuth2CodeParams {
                code: "c".into(),
                redirect_uri: "http://localhost/cb".into(),
                client_id: "cid".into(),
                client_secret: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(auth.refresh_token().as_deref(), Some("rt_x"));
        // opaque token gets the one hour fallback, outside the refresh window
        assert!(!auth.needs_refresh());
        clock.advance(Duration::from_secs(56 * 60));
        assert!(auth.needs_refresh());
    }

    #[test]
    fn authorization_url_has_required_params() {
        let url = OAuth2Auth::build_authorization_url(
            &OAuthEndpoints::default(),
            "cid",
            "http://localhost:8765/callback",
            Some("xyz"),
        )
        .unwrap();

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/oauth2/auth");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("response_type".into(), "code".into()),
                ("client_id".into(), "cid".into()),
                ("redirect_uri".into(), "http://localhost:8765/callback".into()),
                ("state".into(), "xyz".into()),
            ]
        );
    }

    #[test]
    fn authorization_url_omits_absent_state() {
        let url = OAuth2Auth::build_authorization_url(&OAuthEndpoints::default(), "cid", "http://l/cb", None)
            .unwrap();
        assert!(!url.contains("state="));
    }

    #[test]
    fn debug_does_not_leak_tokens() {
        let auth = OAuth2Auth::bearer("at_secret_value");
        assert!(!format!("{auth:?}").contains("at_secret_value"));
    }
}
