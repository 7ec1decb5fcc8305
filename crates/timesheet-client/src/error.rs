//! Error taxonomy for API calls
//!
//! Every failure surfaced by `ApiClient` is one of four kinds:
//!
//! - `ApiError`: non-retryable HTTP status, exhausted retries, transport
//!   failure, or an undecodable response
//! - `AuthenticationError`: HTTP 401 or a credential refresh that was rejected
//! - `RateLimitError`: HTTP 429, carrying `Retry-After` verbatim
//! - `Configuration`: caller or setup mistake, raised before any request
//!
//! All kinds render as `<message> (HTTP <status>[, Code: <code>])` when a
//! status is known.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

/// Fixed code carried by authentication errors when the server gave none.
pub const AUTHENTICATION_ERROR_CODE: &str = "AUTHENTICATION_ERROR";

/// Fixed code carried by every rate-limit error.
pub const RATE_LIMIT_ERROR_CODE: &str = "RATE_LIMIT_EXCEEDED";

fn write_with_suffix(
    f: &mut fmt::Formatter<'_>,
    message: &str,
    status: Option<u16>,
    code: Option<&str>,
) -> fmt::Result {
    f.write_str(message)?;
    match (status, code) {
        (Some(status), Some(code)) => write!(f, " (HTTP {status}, Code: {code})"),
        (Some(status), None) => write!(f, " (HTTP {status})"),
        (None, Some(code)) => write!(f, " (Code: {code})"),
        (None, None) => Ok(()),
    }
}

/// Generic API failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub message: String,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_code: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            response_body: None,
            error_code: None,
        }
    }

    /// Build from a failed HTTP response body, lifting message and code out
    /// of a JSON error document when there is one.
    pub fn from_response(status: u16, body: String) -> Self {
        let details = ErrorDetails::parse(&body);
        Self {
            message: details
                .message
                .unwrap_or_else(|| format!("Request failed with status {status}")),
            status_code: Some(status),
            error_code: details.code,
            response_body: Some(body),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = Some(body.into());
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_with_suffix(f, &self.message, self.status_code, self.error_code.as_deref())
    }
}

impl std::error::Error for ApiError {}

/// Credentials missing, expired or rejected. Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationError {
    pub message: String,
    pub status_code: u16,
    pub error_code: String,
    pub response_body: Option<String>,
}

impl AuthenticationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: 401,
            error_code: AUTHENTICATION_ERROR_CODE.to_string(),
            response_body: None,
        }
    }

    /// Build from a 401 response, keeping the server's message and code if
    /// the body carries them.
    pub fn from_response(status: u16, body: String) -> Self {
        let details = ErrorDetails::parse(&body);
        Self {
            message: details
                .message
                .unwrap_or_else(|| "Authentication failed".to_string()),
            status_code: status,
            error_code: details
                .code
                .unwrap_or_else(|| AUTHENTICATION_ERROR_CODE.to_string()),
            response_body: Some(body),
        }
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_with_suffix(f, &self.message, Some(self.status_code), Some(&self.error_code))
    }
}

impl std::error::Error for AuthenticationError {}

/// HTTP 429. `retry_after` is the raw `Retry-After` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitError {
    pub message: String,
    pub retry_after: Option<String>,
    pub response_body: Option<String>,
}

impl RateLimitError {
    pub fn new(message: impl Into<String>, retry_after: Option<String>) -> Self {
        Self {
            message: message.into(),
            retry_after,
            response_body: None,
        }
    }

    /// Build from a 429 response; `retry_after` is the header value untouched.
    pub fn from_response(body: String, retry_after: Option<String>) -> Self {
        let details = ErrorDetails::parse(&body);
        Self {
            message: details
                .message
                .unwrap_or_else(|| "Rate limit exceeded".to_string()),
            retry_after,
            response_body: Some(body),
        }
    }

    pub fn status_code(&self) -> u16 {
        429
    }

    pub fn error_code(&self) -> &'static str {
        RATE_LIMIT_ERROR_CODE
    }

    /// `Retry-After` as an instant.
    ///
    /// Accepts epoch seconds (`"0"`, `"-60"`, `"1700000000.5"`) and RFC 3339,
    /// RFC 2822 or ISO-8601 dates. Missing, empty and unparseable values
    /// give `None`.
    pub fn retry_after_date(&self) -> Option<DateTime<Utc>> {
        parse_retry_after(self.retry_after.as_deref()?)
    }
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_with_suffix(f, &self.message, Some(429), Some(RATE_LIMIT_ERROR_CODE))
    }
}

impl std::error::Error for RateLimitError {}

fn parse_retry_after(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(secs) = raw.parse::<f64>() {
        if !secs.is_finite() {
            return None;
        }
        let millis = (secs * 1000.0).round();
        if millis.abs() > i64::MAX as f64 {
            return None;
        }
        return DateTime::from_timestamp_millis(millis as i64);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // ISO-8601 without an offset is read as UTC
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Message and code pulled from a JSON error body.
#[derive(Debug, Default, Deserialize)]
struct ErrorDetails {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default, alias = "errorCode")]
    code: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl ErrorDetails {
    fn parse(body: &str) -> Self {
        let Ok(mut details) = serde_json::from_str::<ErrorDetails>(body) else {
            return Self::default();
        };
        // `error` is a code string (OAuth style) or a nested object
        match details.error.take() {
            Some(serde_json::Value::String(code)) => {
                details.code.get_or_insert(code);
            }
            Some(serde_json::Value::Object(nested)) => {
                if details.message.is_none() {
                    details.message = nested
                        .get("message")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                }
                if details.code.is_none() {
                    details.code = nested
                        .get("code")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                }
            }
            _ => {}
        }
        if details.message.is_none() {
            details.message = details.error_description.take();
        }
        details
    }
}

/// Every way an API call can fail.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// HTTP status associated with the failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api(e) => e.status_code,
            Error::Authentication(e) => Some(e.status_code),
            Error::RateLimit(e) => Some(e.status_code()),
            Error::Configuration(_) => None,
        }
    }

    /// Server-provided or fixed error code, if any.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Error::Api(e) => e.error_code.as_deref(),
            Error::Authentication(e) => Some(&e.error_code),
            Error::RateLimit(e) => Some(e.error_code()),
            Error::Configuration(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

/// Credential failures map onto the same taxonomy as HTTP failures.
impl From<timesheet_auth::Error> for Error {
    fn from(e: timesheet_auth::Error) -> Self {
        use timesheet_auth::Error as AuthError;
        match e {
            AuthError::Configuration(message) => Error::Configuration(message),
            AuthError::InvalidCredentials(message) => {
                Error::Authentication(AuthenticationError::new(format!(
                    "Token refresh failed: {message}"
                )))
            }
            AuthError::TokenEndpoint {
                status,
                message,
                error_code,
                body,
            } if status == 401 || status == 403 => Error::Authentication(AuthenticationError {
                message,
                status_code: status,
                error_code: error_code.unwrap_or_else(|| AUTHENTICATION_ERROR_CODE.to_string()),
                response_body: Some(body),
            }),
            AuthError::TokenEndpoint {
                status,
                message,
                error_code,
                body,
            } => Error::Api(ApiError {
                message,
                status_code: Some(status),
                response_body: Some(body),
                error_code,
            }),
            AuthError::Http(message) | AuthError::Discovery(message) => {
                Error::Api(ApiError::new(message))
            }
        }
    }
}

/// Result alias for API calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rate_limited(retry_after: Option<&str>) -> RateLimitError {
        RateLimitError::new("Rate limit exceeded", retry_after.map(str::to_string))
    }

    #[test]
    fn display_shapes() {
        let plain = ApiError::new("Network error: connection refused");
        assert_eq!(plain.to_string(), "Network error: connection refused");

        let with_status = ApiError::new("Bad request").with_status(400);
        assert_eq!(with_status.to_string(), "Bad request (HTTP 400)");

        let with_code = ApiError::new("Bad request")
            .with_status(400)
            .with_error_code("VALIDATION_FAILED");
        assert_eq!(
            with_code.to_string(),
            "Bad request (HTTP 400, Code: VALIDATION_FAILED)"
        );

        assert_eq!(
            rate_limited(None).to_string(),
            "Rate limit exceeded (HTTP 429, Code: RATE_LIMIT_EXCEEDED)"
        );
        assert_eq!(
            AuthenticationError::new("Authentication failed").to_string(),
            "Authentication failed (HTTP 401, Code: AUTHENTICATION_ERROR)"
        );
    }

    #[test]
    fn transparent_enum_display() {
        let err: Error = ApiError::new("boom").with_status(500).into();
        assert_eq!(err.to_string(), "boom (HTTP 500)");
        assert_eq!(err.status_code(), Some(500));
    }

    #[test]
    fn response_body_message_and_code_are_extracted() {
        let body = r#"{"message":"Task not found","code":"NOT_FOUND"}"#.to_string();
        let err = ApiError::from_response(404, body.clone());
        assert_eq!(err.message, "Task not found");
        assert_eq!(err.error_code.as_deref(), Some("NOT_FOUND"));
        assert_eq!(err.response_body.as_deref(), Some(body.as_str()));
    }

    #[test]
    fn oauth_style_error_body() {
        let err = AuthenticationError::from_response(
            401,
            r#"{"error":"invalid_token","error_description":"token expired"}"#.into(),
        );
        assert_eq!(err.message, "token expired");
        assert_eq!(err.error_code, "invalid_token");
    }

    #[test]
    fn nested_error_object() {
        let err = ApiError::from_response(
            422,
            r#"{"error":{"message":"title is required","code":"VALIDATION"}}"#.into(),
        );
        assert_eq!(err.message, "title is required");
        assert_eq!(err.error_code.as_deref(), Some("VALIDATION"));
    }

    #[test]
    fn non_json_body_gets_generic_message() {
        let err = ApiError::from_response(500, "<html>oops</html>".into());
        assert_eq!(err.message, "Request failed with status 500");
        assert!(err.error_code.is_none());

        let auth = AuthenticationError::from_response(401, String::new());
        assert_eq!(auth.message, "Authentication failed");
        assert_eq!(auth.error_code, AUTHENTICATION_ERROR_CODE);
    }

    #[test]
    fn retry_after_missing_or_garbage_is_none() {
        assert!(rate_limited(None).retry_after_date().is_none());
        assert!(rate_limited(Some("")).retry_after_date().is_none());
        assert!(rate_limited(Some("   ")).retry_after_date().is_none());
        assert!(rate_limited(Some("soon")).retry_after_date().is_none());
        assert!(rate_limited(Some("NaN")).retry_after_date().is_none());
        assert!(rate_limited(Some("inf")).retry_after_date().is_none());
    }

    #[test]
    fn retry_after_epoch_seconds() {
        assert_eq!(
            rate_limited(Some("0")).retry_after_date(),
            DateTime::from_timestamp_millis(0)
        );
        assert_eq!(
            rate_limited(Some("-60")).retry_after_date(),
            DateTime::from_timestamp_millis(-60_000)
        );
        assert_eq!(
            rate_limited(Some("1700000000")).retry_after_date(),
            DateTime::from_timestamp_millis(1_700_000_000_000)
        );
        assert_eq!(
            rate_limited(Some("1.5")).retry_after_date(),
            DateTime::from_timestamp_millis(1_500)
        );
    }

    #[test]
    fn retry_after_iso_dates() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            rate_limited(Some("2025-01-02T03:04:05Z")).retry_after_date(),
            Some(expected)
        );
        assert_eq!(
            rate_limited(Some("2025-01-02T05:04:05+02:00")).retry_after_date(),
            Some(expected)
        );
        assert_eq!(
            rate_limited(Some("2025-01-02T03:04:05.000")).retry_after_date(),
            Some(expected)
        );
        assert_eq!(
            rate_limited(Some("2025-01-02")).retry_after_date(),
            Some(Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn retry_after_http_date() {
        let err = rate_limited(Some("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(
            err.retry_after_date(),
            Some(Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap())
        );
    }

    #[test]
    fn auth_errors_map_into_taxonomy() {
        let err: Error = timesheet_auth::Error::configuration("No refresh token available").into();
        assert!(matches!(err, Error::Configuration(_)));

        let err: Error = timesheet_auth::Error::InvalidCredentials("revoked".into()).into();
        assert!(matches!(err, Error::Authentication(ref a) if a.status_code == 401));

        let err: Error = timesheet_auth::Error::TokenEndpoint {
            status: 403,
            message: "denied".into(),
            error_code: Some("access_denied".into()),
            body: "{}".into(),
        }
        .into();
        assert_eq!(err.error_code(), Some("access_denied"));
        assert!(matches!(err, Error::Authentication(_)));

        let err: Error = timesheet_auth::Error::TokenEndpoint {
            status: 500,
            message: "token refresh failed".into(),
            error_code: None,
            body: "oops".into(),
        }
        .into();
        assert!(matches!(err, Error::Api(ref a) if a.status_code == Some(500)));
    }
}
