//! Endpoint and runtime settings shared by the OAuth flows

use std::sync::Arc;

use crate::clock::{self, Clock};
use crate::constants::{AUTHORIZE_ENDPOINT, TOKEN_ENDPOINT};
use crate::discovery::OAuthDiscoveryResult;

/// Authorization and token endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            authorization_endpoint: AUTHORIZE_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
        }
    }
}

impl From<&OAuthDiscoveryResult> for OAuthEndpoints {
    fn from(result: &OAuthDiscoveryResult) -> Self {
        Self {
            authorization_endpoint: result.authorization_server.authorization_endpoint.clone(),
            token_endpoint: result.authorization_server.token_endpoint.clone(),
        }
    }
}

/// Everything an OAuth credential needs besides the credential itself:
/// where to send token requests, which HTTP client to use, and which clock
/// decides expiry.
#[derive(Clone)]
pub struct OAuthContext {
    pub endpoints: OAuthEndpoints,
    pub http: reqwest::Client,
    pub clock: Arc<dyn Clock>,
}

impl Default for OAuthContext {
    fn default() -> Self {
        Self {
            endpoints: OAuthEndpoints::default(),
            http: reqwest::Client::new(),
            clock: clock::system(),
        }
    }
}

impl std::fmt::Debug for OAuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthContext")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl OAuthContext {
    pub fn with_endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
