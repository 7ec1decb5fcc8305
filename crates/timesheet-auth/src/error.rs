//! Error types for authentication and discovery operations

/// Errors from credential handling, token endpoint calls and OAuth discovery.
///
/// `Clone` so a single refresh outcome can be handed to every caller waiting
/// on the same in-flight refresh.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Programmer or configuration mistake: malformed API key, invalid PKCE
    /// verifier, refresh requested without a refresh token.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Token endpoint answered with a non-success status
    #[error("token endpoint returned {status}: {message}")]
    TokenEndpoint {
        status: u16,
        message: String,
        error_code: Option<String>,
        body: String,
    },

    /// Refresh token or client credentials were rejected (401/403)
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("OAuth discovery failed: {0}")]
    Discovery(String),
}

impl Error {
    /// Shorthand for building a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_endpoint_error_display_includes_status() {
        let err = Error::TokenEndpoint {
            status: 400,
            message: "invalid_grant: code expired".into(),
            error_code: Some("invalid_grant".into()),
            body: "{}".into(),
        };
        assert_eq!(
            err.to_string(),
            "token endpoint returned 400: invalid_grant: code expired"
        );
    }

    #[test]
    fn configuration_shorthand() {
        let err = Error::configuration("No refresh token available");
        assert!(matches!(err, Error::Configuration(ref m) if m == "No refresh token available"));
    }
}
