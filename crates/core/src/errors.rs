//! Core error types for the Aurum pipeline.
//!
//! Fetch failures never reach this level: the acquisition coordinator turns
//! them into failed jobs. What is left is configuration that makes a run
//! meaningless, and I/O while exporting.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Root error type for the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

/// Configuration rejected before any fetch is dispatched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("source registry is empty")]
    EmptyRegistry,

    #[error("instrument identifier is empty")]
    EmptyInstrument,

    #[error("range ends before it starts: {start} .. {end}")]
    NegativeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("max_concurrency must be > 0")]
    ZeroConcurrency,

    #[error("gap threshold must be > 0 seconds, got {0}")]
    NonPositiveGapThreshold(i64),

    #[error("gap interval must be > 0 seconds, got {0}")]
    NonPositiveGapInterval(i64),

    #[error("gap threshold of {0} seconds is out of range")]
    GapThresholdTooLarge(i64),

    #[error("gap interval of {0} seconds is out of range")]
    GapIntervalTooLarge(i64),

    #[error("sigma multiple must be a positive number, got {0}")]
    NonPositiveSigma(f64),

    #[error("max candle move must be a positive number, got {0}")]
    NonPositiveCandleMove(f64),

    #[error("price band {min} .. {max} is empty")]
    EmptyPriceBand { min: f64, max: f64 },

    #[error("invalid quality weights: {0}")]
    InvalidWeights(String),
}

/// Errors while writing the consolidated series.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
