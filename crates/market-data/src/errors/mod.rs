//! Error types and retry classification for source fetchers.
//!
//! This module provides:
//! - [`FetchError`]: The error enum every fetcher returns
//! - [`RetryClass`]: Classification for determining retry behavior
//!
//! A `FetchError` is always local to one source. The acquisition coordinator
//! turns it into a failed job and keeps going with the other sources.

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur while fetching records from one source.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The endpoint could not be reached, timed out, or answered with an
    /// unexpected HTTP status.
    #[error("Network error: {provider} - {message}")]
    Network {
        /// The source that failed
        provider: String,
        /// Transport level detail
        message: String,
    },

    /// The source answered, but the payload does not match its wire contract.
    /// Never turned into zero-valued records.
    #[error("Malformed response: {provider} - {message}")]
    MalformedResponse {
        /// The source that returned the payload
        provider: String,
        /// What was wrong with it
        message: String,
    },

    /// The source throttled the request (HTTP 429 or an in-band notice).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The source that rate limited the request
        provider: String,
    },

    /// The requested range or granularity is outside what the source serves.
    #[error("Unsupported range: {provider} - {reason}")]
    UnsupportedRange {
        /// The source that cannot serve the request
        provider: String,
        /// Why the request can't be served
        reason: String,
    },
}

impl FetchError {
    pub fn network(provider: &str, message: impl Into<String>) -> Self {
        Self::Network {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: &str) -> Self {
        Self::RateLimited {
            provider: provider.to_string(),
        }
    }

    pub fn unsupported(provider: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedRange {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use aurum_market_data::errors::{FetchError, RetryClass};
    ///
    /// let error = FetchError::rate_limited("YAHOO");
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = FetchError::malformed("STOOQ", "missing Close column");
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient errors - retry with backoff
            Self::Network { .. } | Self::RateLimited { .. } => RetryClass::WithBackoff,

            // Same request, same answer
            Self::MalformedResponse { .. } | Self::UnsupportedRange { .. } => RetryClass::Never,
        }
    }

    /// The source the error belongs to.
    pub fn provider(&self) -> &str {
        match self {
            Self::Network { provider, .. }
            | Self::MalformedResponse { provider, .. }
            | Self::RateLimited { provider }
            | Self::UnsupportedRange { provider, .. } => provider,
        }
    }
}
