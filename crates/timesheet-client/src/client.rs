//! Request pipeline: auth injection, retry with backoff, error translation.
//!
//! One logical call runs up to `max_retries + 1` strictly sequential
//! attempts. Before every attempt the credential is asked for fresh headers
//! (which may refresh it); calls to the token endpoint itself go out
//! without them.
//!
//! Failure classification per attempt, in order:
//! 1. transport error → `ApiError`, not retried
//! 2. 401 → `AuthenticationError`, not retried
//! 3. 429 → `RateLimitError` with `Retry-After`, not retried
//! 4. status in the retryable set with attempts left → sleep, retry
//! 5. anything else → `ApiError` with status, body and server error code

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER,
    USER_AGENT,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};
use url::Url;
use uuid::Uuid;

use timesheet_auth::{API_BASE_URL, Authentication, TOKEN_ENDPOINT_PATH};

use crate::api::{ProjectsApi, TasksApi, TeamsApi};
use crate::error::{ApiError, AuthenticationError, Error, RateLimitError, Result};
use crate::retry::RetryConfig;
use crate::sleep::{Sleeper, TokioSleeper};

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_USER_AGENT: &str = concat!("timesheet-client/", env!("CARGO_PKG_VERSION"));

/// Header carrying the per-call correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// How a successful response body is handed back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    #[default]
    Json,
    /// Raw bytes (PDF and CSV exports)
    Bytes,
}

/// One logical API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, e.g. `/v1/tasks`
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub query: Option<serde_json::Value>,
    /// Caller overrides; kept over defaults and auth headers except `Authorization`
    pub headers: HeaderMap,
    pub response_type: ResponseType,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            query: None,
            headers: HeaderMap::new(),
            response_type: ResponseType::Json,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn with_body<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::configuration(format!("request body is not serializable: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Attach query parameters (any struct or map that serializes to an object).
    pub fn with_query<Q: Serialize + ?Sized>(mut self, query: &Q) -> Result<Self> {
        let value = serde_json::to_value(query)
            .map_err(|e| Error::configuration(format!("query is not serializable: {e}")))?;
        self.query = Some(value);
        Ok(self)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }
}

/// Timesheet API client.
///
/// Cheap to clone; clones share the HTTP connection pool, credential and
/// retry policy.
///
/// ```no_run
/// use std::sync::Arc;
/// use timesheet_auth::ApiKeyAuth;
/// use timesheet_client::{ApiClient, RetryConfig};
///
/// # async fn example() -> timesheet_client::Result<()> {
/// let client = ApiClient::builder()
///     .authentication(ApiKeyAuth::new("ts_abc123.s3cr3t")?)
///     .retry_config(RetryConfig::default())
///     .build()?;
///
/// let page = client.tasks().list(&Default::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    auth: Arc<dyn Authentication>,
    retry: RetryConfig,
    timeout: Duration,
    user_agent: HeaderValue,
    sleeper: Arc<dyn Sleeper>,
}

/// Successful response of one call.
struct RawResponse {
    status: u16,
    body: Vec<u8>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("auth", &self.inner.auth.scheme().as_str())
            .field("retry", &self.inner.retry)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Client against the hosted API with the given credential and policy.
    pub fn new(auth: Arc<dyn Authentication>, retry: RetryConfig) -> Result<Self> {
        Self::builder()
            .shared_authentication(auth)
            .retry_config(retry)
            .build()
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.inner.retry
    }

    pub fn authentication(&self) -> &Arc<dyn Authentication> {
        &self.inner.auth
    }

    pub fn tasks(&self) -> TasksApi {
        TasksApi::new(self.clone())
    }

    pub fn projects(&self) -> ProjectsApi {
        ProjectsApi::new(self.clone())
    }

    pub fn teams(&self) -> TeamsApi {
        TeamsApi::new(self.clone())
    }

    /// Run `request` to completion and decode the JSON body.
    ///
    /// An empty success body decodes as JSON `null`, so `()` and `Option<T>`
    /// work for endpoints that return nothing.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let raw = self.execute(&request).await?;
        let decoded = if raw.body.iter().all(u8::is_ascii_whitespace) {
            serde_json::from_value(serde_json::Value::Null)
        } else {
            serde_json::from_slice(&raw.body)
        };
        decoded.map_err(|e| {
            ApiError::new(format!("Failed to decode response: {e}"))
                .with_status(raw.status)
                .with_response_body(String::from_utf8_lossy(&raw.body))
                .into()
        })
    }

    /// Run `request` to completion and return the body untouched.
    pub async fn request_bytes(&self, request: ApiRequest) -> Result<Vec<u8>> {
        let request = request.with_response_type(ResponseType::Bytes);
        Ok(self.execute(&request).await?.body)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.request(ApiRequest::get(path).with_query(query)?).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::post(path).with_body(body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::put(path).with_body(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(ApiRequest::delete(path)).await
    }

    fn url(&self, path: &str) -> Result<Url> {
        let joined = format!(
            "{}/{}",
            self.inner.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| Error::configuration(format!("invalid request path {path}: {e}")))
    }

    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse> {
        let url = self.url(&request.path)?;
        let skip_auth = url.path() == TOKEN_ENDPOINT_PATH;
        let request_id = Uuid::new_v4().to_string();
        let retry = &self.inner.retry;
        let total_attempts = retry.total_attempts();
        let method = request.method.as_str();

        for attempt in 0..total_attempts {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt - 1);
                warn!(
                    request_id = %request_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                );
                self.inner.sleeper.sleep(delay).await;
            }

            let headers = self.headers_for(request, &request_id, skip_auth).await?;
            let mut builder = self
                .inner
                .http
                .request(request.method.clone(), url.clone())
                .headers(headers)
                .timeout(self.inner.timeout);
            if let Some(query) = &request.query {
                builder = builder.query(query);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            debug!(request_id = %request_id, method, path = %url.path(), attempt, "sending request");
            let started = Instant::now();
            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    crate::metrics::record_request(method, None, started.elapsed().as_secs_f64());
                    error!(request_id = %request_id, error = %e, "request failed before a response");
                    return Err(ApiError::new(format!("Network error: {e}")).into());
                }
            };

            let status = response.status();
            let code = status.as_u16();
            crate::metrics::record_request(method, Some(code), started.elapsed().as_secs_f64());

            if status.is_success() {
                let body = response.bytes().await.map_err(|e| {
                    ApiError::new(format!("Failed to read response body: {e}")).with_status(code)
                })?;
                debug!(request_id = %request_id, status = code, bytes = body.len(), "request succeeded");
                return Ok(RawResponse {
                    status: code,
                    body: body.to_vec(),
                });
            }

            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();

            match code {
                401 => {
                    warn!(request_id = %request_id, "request rejected as unauthenticated");
                    return Err(AuthenticationError::from_response(code, body).into());
                }
                429 => {
                    warn!(
                        request_id = %request_id,
                        retry_after = retry_after.as_deref().unwrap_or(""),
                        "rate limited"
                    );
                    return Err(RateLimitError::from_response(body, retry_after).into());
                }
                _ if retry.is_retryable(code) && attempt + 1 < total_attempts => {
                    crate::metrics::record_retry(code);
                    debug!(request_id = %request_id, status = code, "retryable status");
                }
                _ => {
                    if retry.is_retryable(code) {
                        error!(request_id = %request_id, status = code, attempts = total_attempts, "retries exhausted");
                    } else {
                        debug!(request_id = %request_id, status = code, "non-retryable status");
                    }
                    return Err(ApiError::from_response(code, body).into());
                }
            }
        }

        // Every path through the final attempt returns.
        Err(ApiError::new("Unknown error occurred").into())
    }

    /// Defaults, then caller headers, then auth headers. Auth never replaces
    /// a caller header except `Authorization`.
    async fn headers_for(&self, request: &ApiRequest, request_id: &str, skip_auth: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.inner.user_agent.clone());
        let accept = match request.response_type {
            ResponseType::Json => HeaderValue::from_static("application/json"),
            ResponseType::Bytes => HeaderValue::from_static("*/*"),
        };
        headers.insert(ACCEPT, accept);
        if request.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }

        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }

        if skip_auth {
            return Ok(headers);
        }

        let auth_headers = self.inner.auth.auth_headers().await?;
        for (name, value) in &auth_headers {
            if name == AUTHORIZATION || !request.headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        Ok(headers)
    }
}

/// Builder for [`ApiClient`].
pub struct ClientBuilder {
    base_url: Option<String>,
    auth: Option<Arc<dyn Authentication>>,
    retry: RetryConfig,
    timeout: Duration,
    user_agent: Option<String>,
    http: Option<reqwest::Client>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            auth: None,
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
            http: None,
            sleeper: None,
        }
    }

    /// Defaults to `https://api.timesheet.io`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn authentication(self, auth: impl Authentication + 'static) -> Self {
        self.shared_authentication(Arc::new(auth))
    }

    pub fn shared_authentication(mut self, auth: Arc<dyn Authentication>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let auth = self
            .auth
            .ok_or_else(|| Error::configuration("authentication is required"))?;

        let raw_base = self.base_url.as_deref().unwrap_or(API_BASE_URL);
        let base_url = Url::parse(raw_base)
            .map_err(|e| Error::configuration(format!("invalid base URL {raw_base}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::configuration(format!(
                "base URL must be http(s), got {raw_base}"
            )));
        }

        if self.timeout.is_zero() {
            return Err(Error::configuration("timeout must be greater than zero"));
        }

        let user_agent = self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| Error::configuration(format!("invalid user agent: {e}")))?;

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .build()
                .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?,
        };

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                auth,
                retry: self.retry,
                timeout: self.timeout,
                user_agent,
                sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
            }),
        })
    }
}
