use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::errors::FetchError;
use crate::models::{DateRange, Granularity, PriceRecord, SourceDescriptor, WireFormatKind};

/// Lifecycle of one acquisition job: `Queued -> Fetching -> Completed | Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Fetching,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Why a job ended without records.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("No fetcher registered for wire format {0:?}")]
    NoFetcher(WireFormatKind),

    #[error("Cancelled")]
    Cancelled,

    #[error("Fetcher panicked: {0}")]
    Panicked(String),
}

/// One in-flight fetch against one source.
#[derive(Debug)]
pub struct AcquisitionJob {
    descriptor: Arc<SourceDescriptor>,
    range: DateRange,
    granularity: Granularity,
    status: JobStatus,
    records_fetched: usize,
}

impl AcquisitionJob {
    pub fn new(descriptor: Arc<SourceDescriptor>, range: DateRange, granularity: Granularity) -> Self {
        Self {
            descriptor,
            range,
            granularity,
            status: JobStatus::Queued,
            records_fetched: 0,
        }
    }

    pub fn descriptor(&self) -> &Arc<SourceDescriptor> {
        &self.descriptor
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn records_fetched(&self) -> usize {
        self.records_fetched
    }

    pub(crate) fn start(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Fetching;
        }
    }

    pub(crate) fn complete(&mut self, records: usize) {
        if !self.status.is_terminal() {
            self.status = JobStatus::Completed;
            self.records_fetched = records;
        }
    }

    pub(crate) fn fail(&mut self) {
        if !self.status.is_terminal() {
            self.status = JobStatus::Failed;
            self.records_fetched = 0;
        }
    }

    /// Terminal report; the job itself is discarded after this.
    pub(crate) fn into_report(self, failure: Option<JobFailure>, elapsed: Duration) -> JobReport {
        JobReport {
            source_id: self.descriptor.id.clone(),
            source_name: self.descriptor.name.clone(),
            status: self.status,
            records_fetched: self.records_fetched,
            failure,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// What remains of a job once it is terminal.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub source_id: String,
    pub source_name: String,
    pub status: JobStatus,
    pub records_fetched: usize,
    #[serde(serialize_with = "serialize_failure")]
    pub failure: Option<JobFailure>,
    pub elapsed_ms: u64,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

fn serialize_failure<S: Serializer>(failure: &Option<JobFailure>, serializer: S) -> Result<S::Ok, S::Error> {
    match failure {
        Some(f) => serializer.serialize_some(&f.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Records contributed by one source.
#[derive(Clone, Debug)]
pub struct SourceBatch {
    pub descriptor: Arc<SourceDescriptor>,
    /// Interval the source was actually queried at. Coarser than the request
    /// when the source does not serve the requested granularity.
    pub granularity: Granularity,
    pub records: Vec<PriceRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RateLimit, WireFormat};
    use chrono::{TimeZone, Utc};

    fn job() -> AcquisitionJob {
        let descriptor = SourceDescriptor {
            id: "STOOQ".to_string(),
            name: "Stooq".to_string(),
            symbol: "xauusd".to_string(),
            granularities: vec![Granularity::OneDay],
            years_of_history: 20,
            nominal_quality: 0.92,
            rate_limit: RateLimit::per_hour(500),
            endpoint: String::new(),
            wire_format: WireFormat::StooqCsv,
        };
        let range = DateRange::new(
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        AcquisitionJob::new(Arc::new(descriptor), range, Granularity::OneDay)
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = job();
        assert_eq!(job.status(), JobStatus::Queued);
        job.start();
        assert_eq!(job.status(), JobStatus::Fetching);
        job.complete(250);
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.records_fetched(), 250);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut job = job();
        job.start();
        job.fail();
        job.complete(10);
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.records_fetched(), 0);
    }

    #[test]
    fn test_report_serializes_failure_as_text() {
        let mut job = job();
        job.start();
        job.fail();
        let report = job.into_report(
            Some(JobFailure::Fetch(FetchError::rate_limited("STOOQ"))),
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failure"], "Rate limited: STOOQ");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["elapsedMs"], 1500);
    }
}
