//! Shared building blocks for the Timesheet SDK workspace
//!
//! Holds the secret wrapper used for API keys, client secrets and tokens, and
//! the error type returned by configuration loading.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
