//! Timesheet OAuth and API constants
//!
//! Fixed endpoints of the hosted Timesheet service. Every type that talks to
//! these endpoints also accepts an override (see `OAuthEndpoints`) so
//! self-hosted deployments and mock servers can be targeted.

/// Base URL of the REST API
pub const API_BASE_URL: &str = "https://api.timesheet.io";

/// Authorization endpoint for the authorization-code flow
pub const AUTHORIZE_ENDPOINT: &str = "https://api.timesheet.io/oauth2/auth";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://api.timesheet.io/oauth2/token";

/// Path of the token endpoint relative to the API base URL.
/// Requests to this path are sent without auth headers.
pub const TOKEN_ENDPOINT_PATH: &str = "/oauth2/token";

/// Literal every API key starts with
pub const API_KEY_PREFIX: &str = "ts_";

/// Access tokens whose `exp` cannot be read are assumed valid for this long
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 60 * 60;

/// Tokens are refreshed once they are this close to expiry
pub const REFRESH_BUFFER_SECS: u64 = 5 * 60;
