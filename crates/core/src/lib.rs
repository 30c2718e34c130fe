//! Aurum Core - consolidation, cleaning and scoring of historical prices.
//!
//! This crate turns the per-source batches produced by `aurum-market-data`
//! into one canonical series and a quality report. Every stage here is a
//! deterministic, single-threaded transform; only acquisition is concurrent.

pub mod config;
pub mod consolidation;
pub mod errors;
pub mod export;
pub mod gap_filler;
pub mod pipeline;
pub mod quality;
pub mod series;
pub mod validation;

pub use config::{
    AcquisitionConfig, GapFillConfig, PipelineConfig, PriceBand, QualityWeights, ValidatorConfig,
};
pub use consolidation::{consolidate, Consolidation, SourceContribution};
pub use export::{export_csv, export_csv_string, write_csv};
pub use gap_filler::{GapFillOutcome, GapFiller};
pub use pipeline::{Pipeline, PipelineOutput, PipelineRequest, RunSummary, StageCounts};
pub use quality::{Grade, QualityComponents, QualityInputs, QualityReport, QualityScorer};
pub use series::PriceSeries;
pub use validation::{CloseStats, RejectionReason, SeriesValidator, ValidationOutcome};

// Re-export error types
pub use errors::{ConfigError, ExportError, PipelineError, Result};
