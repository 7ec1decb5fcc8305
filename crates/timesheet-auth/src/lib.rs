//! Timesheet API authentication library
//!
//! Credential types behind one `Authentication` trait, plus the OAuth
//! plumbing they need: PKCE generation, token exchange/refresh, JWT expiry
//! decoding and well-known metadata discovery. It has no dependency on the
//! HTTP client crate and can be used on its own.
//!
//! Typical OAuth 2.1 flow:
//! 1. `OAuth21Auth::generate_pkce()` creates a verifier/challenge pair
//! 2. User authorizes via `OAuth21Auth::build_authorization_url()`
//! 3. `OAuth21Auth::from_authorization_code()` exchanges the returned code
//! 4. The client calls `auth_headers()` before each request; expiring tokens
//!    are refreshed once, however many requests are waiting

pub mod api_key;
pub mod authentication;
mod bearer;
pub mod clock;
pub mod constants;
pub mod context;
pub mod discovery;
pub mod error;
pub mod jwt;
pub mod oauth2;
pub mod oauth21;
pub mod pkce;
pub mod token;

pub use api_key::{ApiKeyAuth, is_valid_api_key};
pub use authentication::{AuthFuture, AuthScheme, Authentication};
pub use clock::{Clock, ManualClock, SystemClock};
pub use constants::*;
pub use context::{OAuthContext, OAuthEndpoints};
pub use discovery::{
    DiscoveryOptions, OAuthDiscovery, OAuthDiscoveryResult, discover_oauth,
};
pub use error::{Error, Result};
pub use oauth2::{OAuth2Auth, OAuth2CodeParams, OAuth2Credentials};
pub use oauth21::{
    AuthorizationUrlParams, OAuth21Auth, OAuth21CodeParams, OAuth21Credentials, OAuth21Options,
};
pub use pkce::{
    CodeChallengeMethod, PkceCodePair, generate_code_challenge, generate_code_verifier,
    generate_pkce_code_pair, is_valid_code_verifier,
};
pub use token::TokenResponse;
