//! Source fetcher trait definitions.
//!
//! This module defines the core [`Fetcher`] trait that every wire-format
//! implementation provides, and the [`FetchRequest`] it is handed.

use async_trait::async_trait;

use crate::errors::FetchError;
use crate::models::{DateRange, Granularity, PriceRecord, SourceDescriptor, WireFormatKind};

use super::retry::RetryPolicy;

/// What one job asks a fetcher for, already fitted to the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Window, clamped to the source's history depth.
    pub range: DateRange,
    /// Interval the source will be queried at.
    pub granularity: Granularity,
}

impl FetchRequest {
    /// Fits a requested range and granularity to what `descriptor` serves.
    ///
    /// Fails with [`FetchError::UnsupportedRange`] when the source has no
    /// suitable granularity or no history inside the range.
    pub fn resolve(
        descriptor: &SourceDescriptor,
        range: &DateRange,
        requested: Granularity,
    ) -> Result<Self, FetchError> {
        let granularity = descriptor.resolve_granularity(requested).ok_or_else(|| {
            FetchError::unsupported(
                &descriptor.id,
                format!("no granularity at or above {} is served", requested),
            )
        })?;

        let range = descriptor.clamp_range(range).ok_or_else(|| {
            FetchError::unsupported(
                &descriptor.id,
                format!(
                    "range {} .. {} is outside {} years of history",
                    range.start, range.end, descriptor.years_of_history
                ),
            )
        })?;

        Ok(Self { range, granularity })
    }
}

/// Trait for source fetchers.
///
/// One implementation per [`WireFormat`](crate::models::WireFormat). Fetchers
/// are stateless between calls and safe to share across jobs; all pacing state
/// lives inside a single `fetch` call.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use aurum_market_data::provider::{Fetcher, FetchRequest};
///
/// struct MyFetcher;
///
/// #[async_trait]
/// impl Fetcher for MyFetcher {
///     fn id(&self) -> &'static str {
///         "MY_FORMAT"
///     }
///
///     fn wire_format(&self) -> WireFormatKind {
///         WireFormatKind::StooqCsv
///     }
///
///     async fn fetch(
///         &self,
///         descriptor: &SourceDescriptor,
///         request: &FetchRequest,
///     ) -> Result<Vec<PriceRecord>, FetchError> {
///         // ... download and parse
///     }
/// }
/// ```
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Identifier for logging, e.g. "YAHOO_CHART".
    fn id(&self) -> &'static str;

    /// The wire format this fetcher understands.
    fn wire_format(&self) -> WireFormatKind;

    /// How often a transient failure is retried. Default: 3 attempts.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Fetch records for one source.
    ///
    /// Returns records inside `request.range`, ordered by timestamp ascending.
    /// Every failure is reported as a [`FetchError`]; implementations must not panic
    /// on bad payloads.
    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        request: &FetchRequest,
    ) -> Result<Vec<PriceRecord>, FetchError>;
}
