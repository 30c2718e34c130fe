//! Concurrent acquisition from every registered source.
//!
//! This module provides:
//! - [`AcquisitionCoordinator`]: bounded fan-out of one job per source
//! - [`AcquisitionJob`] / [`JobReport`]: per-source lifecycle and outcome
//! - [`AcquisitionProgress`]: shared counters observers can poll mid-run

mod coordinator;
mod job;
mod progress;

pub use coordinator::{
    AcquisitionCoordinator, AcquisitionOutcome, AcquisitionRequest, DEFAULT_MAX_CONCURRENCY,
};
pub use job::{AcquisitionJob, JobFailure, JobReport, JobStatus, SourceBatch};
pub use progress::{AcquisitionProgress, ProgressSnapshot};
