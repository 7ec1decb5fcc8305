//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (initial OAuth flow completion)
//! 2. Token refresh (request-time refresh from `Authentication::auth_headers`)
//!
//! Both operations POST an `application/x-www-form-urlencoded` body to the
//! token endpoint with different grant types. Optional fields
//! (`client_secret`, `code_verifier`, `resource`) are left out of the form
//! entirely when absent so public PKCE clients never send an empty secret.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// Only `access_token` is guaranteed. Whether `refresh_token` is present
/// decides if the resulting auth object can refresh later.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Parameters of an authorization-code exchange.
#[derive(Debug, Clone)]
pub struct CodeExchange<'a> {
    pub code: &'a str,
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    pub client_secret: Option<&'a str>,
    /// PKCE verifier; only sent by OAuth 2.1 flows
    pub code_verifier: Option<&'a str>,
    /// RFC 8707 resource indicator
    pub resource: Option<&'a str>,
}

/// Parameters of a refresh-token grant.
#[derive(Debug, Clone)]
pub struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
    pub client_id: &'a str,
    pub client_secret: Option<&'a str>,
    pub resource: Option<&'a str>,
}

/// OAuth error body (RFC 6749 section 5.2)
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

/// Exchange an authorization code for tokens (initial OAuth flow).
///
/// This is the second step of the authorization-code flow: the user has
/// authorized in their browser and we received the code on the redirect URI.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_endpoint: &str,
    exchange: &CodeExchange<'_>,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", exchange.code),
        ("redirect_uri", exchange.redirect_uri),
        ("client_id", exchange.client_id),
    ];
    if let Some(secret) = exchange.client_secret {
        form.push(("client_secret", secret));
    }
    if let Some(verifier) = exchange.code_verifier {
        form.push(("code_verifier", verifier));
    }
    if let Some(resource) = exchange.resource {
        form.push(("resource", resource));
    }

    debug!(token_endpoint, pkce = exchange.code_verifier.is_some(), "exchanging authorization code");
    let response = client
        .post(token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(endpoint_error(status.as_u16(), body, "token exchange failed"));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::Http(format!("invalid token response: {e}")))
}

/// Refresh an access token using a refresh token.
///
/// A 401/403 means the refresh token was revoked or the client credentials
/// are wrong; that is reported as `InvalidCredentials` so callers re-authenticate.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_endpoint: &str,
    grant: &RefreshGrant<'_>,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", grant.refresh_token),
        ("client_id", grant.client_id),
    ];
    if let Some(secret) = grant.client_secret {
        form.push(("client_secret", secret));
    }
    if let Some(resource) = grant.resource {
        form.push(("resource", resource));
    }

    debug!(token_endpoint, "refreshing access token");
    let response = client
        .post(token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(endpoint_error(status.as_u16(), body, "token refresh failed"));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::Http(format!("invalid refresh response: {e}")))
}

fn endpoint_error(status: u16, body: String, fallback: &str) -> Error {
    let parsed = serde_json::from_str::<OAuthErrorBody>(&body).ok();
    let error_code = parsed.as_ref().and_then(|b| b.error.clone());
    let description = parsed
        .as_ref()
        .and_then(|b| b.error_description.clone().or_else(|| b.message.clone()));

    let message = match (&error_code, description) {
        (Some(code), Some(desc)) => format!("{code}: {desc}"),
        (Some(code), None) => code.clone(),
        (None, Some(desc)) => desc,
        (None, None) => fallback.to_string(),
    };

    Error::TokenEndpoint {
        status,
        message,
        error_code,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn token_response_deserializes_minimal() {
        let json = r#"{"access_token":"at_abc"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert!(token.refresh_token.is_none());
        assert!(token.expires_in.is_none());
    }

    #[test]
    fn token_response_deserializes_full() {
        let json = r#"{"access_token":"at_abc","refresh_token":"rt_def","token_type":"Bearer","expires_in":3600,"scope":"read write"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("rt_def"));
        assert_eq!(token.token_type.as_deref(), Some("Bearer"));
        assert_eq!(token.expires_in, Some(3600));
        assert_eq!(token.scope.as_deref(), Some("read write"));
    }

    #[tokio::test]
    async fn exchange_posts_form_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("code_verifier=verifier"))
            .and(body_string_contains("resource=https%3A%2F%2Fapi.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at_new",
                "refresh_token": "rt_new",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/oauth2/token", server.uri());
        let token = exchange_code(
            &reqwest::Client::new(),
            &endpoint,
            &CodeExchange {
                code: "auth-code",
                redirect_uri: "http://localhost:8765/callback",
                client_id: "client-1",
                client_secret: None,
                code_verifier: Some("verifier"),
                resource: Some("https://api.example.com"),
            },
        )
        .await
        .unwrap();

        assert_eq!(token.access_token, "at_new");
        assert_eq!(token.refresh_token.as_deref(), Some("rt_new"));
    }

    #[tokio::test]
    async fn refresh_omits_absent_client_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at_refreshed",
            })))
            .mount(&server)
            .await;

        let endpoint = format!("{}/oauth2/token", server.uri());
        refresh_token(
            &reqwest::Client::new(),
            &endpoint,
            &RefreshGrant {
                refresh_token: "rt_1",
                client_id: "public-client",
                client_secret: None,
                resource: None,
            },
        )
        .await
        .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("refresh_token=rt_1"));
        assert!(!body.contains("client_secret"), "public client must not send a secret: {body}");
        assert!(!body.contains("resource"));
    }

    #[tokio::test]
    async fn refresh_rejection_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("revoked"))
            .mount(&server)
            .await;

        let result = refresh_token(
            &reqwest::Client::new(),
            &server.uri(),
            &RefreshGrant {
                refresh_token: "rt_revoked",
                client_id: "client-1",
                client_secret: Some("secret"),
                resource: None,
            },
        )
        .await;

        assert!(matches!(result, Err(Error::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn exchange_error_body_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "authorization code expired",
            })))
            .mount(&server)
            .await;

        let err = exchange_code(
            &reqwest::Client::new(),
            &server.uri(),
            &CodeExchange {
                code: "stale",
                redirect_uri: "http://localhost/cb",
                client_id: "client-1",
                client_secret: Some("secret"),
                code_verifier: None,
                resource: None,
            },
        )
        .await
        .unwrap_err();

        match err {
            Error::TokenEndpoint {
                status,
                message,
                error_code,
                ..
            } => {
                assert_eq!(status, 400);
                assert_eq!(error_code.as_deref(), Some("invalid_grant"));
                assert_eq!(message, "invalid_grant: authorization code expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unparseable_error_body_uses_fallback_message() {
        let err = endpoint_error(502, "<html>bad gateway</html>".into(), "token refresh failed");
        match err {
            Error::TokenEndpoint { message, error_code, body, .. } => {
                assert_eq!(message, "token refresh failed");
                assert!(error_code.is_none());
                assert_eq!(body, "<html>bad gateway</html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
