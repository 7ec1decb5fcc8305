//! HTTP client SDK for the Timesheet time-tracking API.
//!
//! `ApiClient` executes each call with per-attempt credential headers,
//! exponential backoff on configured status codes, and a closed error
//! taxonomy (`ApiError`, `AuthenticationError`, `RateLimitError`,
//! configuration errors). Credentials come from `timesheet-auth`.
//!
//! ```no_run
//! use timesheet_auth::OAuth21Auth;
//! use timesheet_client::{ApiClient, ListQuery, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = ApiClient::builder()
//!     .authentication(OAuth21Auth::new("access-token"))
//!     .build()?;
//!
//! let mut query = ListQuery::default().limit(50);
//! loop {
//!     let page = client.tasks().list(&query).await?;
//!     for task in &page.items {
//!         println!("{} {:?}", task.id, task.description);
//!     }
//!     match page.next_page() {
//!         Some(next) => query = query.page(next),
//!         None => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod sleep;
pub mod types;

pub use api::{ProjectsApi, TasksApi, TeamsApi};
pub use client::{ApiClient, ApiRequest, ClientBuilder, DEFAULT_TIMEOUT, ResponseType};
pub use error::{ApiError, AuthenticationError, Error, RateLimitError, Result};
pub use retry::RetryConfig;
pub use sleep::{RecordingSleeper, Sleeper, TokioSleeper};
pub use types::{ListQuery, Page, PageParams, SortOrder};
