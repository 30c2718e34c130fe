//! Aurum Market Data Crate
//!
//! This crate acquires historical OHLCV candles for one instrument from many
//! heterogeneous sources at once.
//!
//! # Overview
//!
//! The market data crate supports:
//! - A static catalog of sources with history depth, granularities and quotas
//! - REST, CSV, binary candle and local file formats behind one trait
//! - Per-source rate limiting and retry with backoff
//! - Bounded concurrent acquisition with shared progress counters
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  SourceRegistry  |  (static catalog of SourceDescriptor)
//! +------------------+
//!          |
//!          v
//! +------------------------+     +------------------+
//! | AcquisitionCoordinator | --> |   FetcherSet     |  (wire format -> Fetcher)
//! +------------------------+     +------------------+
//!          |                              |
//!          |                              v
//!          |                     +------------------+
//!          |                     |   RateLimiter    |  (token bucket per fetch)
//!          |                     +------------------+
//!          v
//! +------------------+
//! |   SourceBatch    |  (PriceRecord per source, plus JobReport)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`SourceDescriptor`] - One catalogued source
//! - [`PriceRecord`] - One OHLCV candle
//! - [`Granularity`] - Candle interval
//! - [`DateRange`] - UTC time window
//! - [`FetchError`] - Per-source failure with retry classification

pub mod acquisition;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;

// Re-export all public types from models
pub use models::{
    DateRange, Granularity, PriceRecord, RateLimit, RecordOrigin, SourceDescriptor, WireFormat,
    WireFormatKind,
};

// Re-export acquisition types
pub use acquisition::{
    AcquisitionCoordinator, AcquisitionOutcome, AcquisitionProgress, AcquisitionRequest,
    JobFailure, JobReport, JobStatus, ProgressSnapshot, SourceBatch, DEFAULT_MAX_CONCURRENCY,
};

// Re-export provider types
pub use provider::{fetch_with_retry, ApiKeys, FetchRequest, Fetcher, FetcherSet, RetryPolicy};

// Re-export registry types
pub use registry::{RateLimiter, SourceRegistry};

// Re-export error types
pub use errors::{FetchError, RetryClass};
