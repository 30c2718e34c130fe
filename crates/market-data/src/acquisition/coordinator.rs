//! Fan-out of fetch jobs across every registered source.
//!
//! ```text
//!  SourceRegistry ──► one AcquisitionJob per descriptor
//!                          │
//!                          ▼
//!        Semaphore(max_concurrency) ──► JoinSet of tokio tasks
//!                          │                 │
//!                          │     resolve ► fetch_with_retry ► progress
//!                          ▼
//!     AcquisitionOutcome { batches, reports }
//! ```
//!
//! A failing, throttled or panicking source only fails its own job. The
//! coordinator never retries; retries belong to each fetcher's policy.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::models::{DateRange, Granularity, PriceRecord};
use crate::provider::{fetch_with_retry, FetchRequest, FetcherSet};
use crate::registry::SourceRegistry;

use super::job::{AcquisitionJob, JobFailure, JobReport, SourceBatch};
use super::progress::AcquisitionProgress;

/// Default bounded worker count.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// What to acquire from every source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquisitionRequest {
    pub range: DateRange,
    pub granularity: Granularity,
}

/// Everything the sources produced, successful or not.
#[derive(Debug, Default)]
pub struct AcquisitionOutcome {
    /// One batch per completed job.
    pub batches: Vec<SourceBatch>,
    /// One report per job, in registry order.
    pub reports: Vec<JobReport>,
    /// Sum of each source's nominal capacity for the request.
    pub expected_points: u64,
}

impl AcquisitionOutcome {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    pub fn total_records(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }
}

/// Runs one job per source on a bounded pool.
pub struct AcquisitionCoordinator {
    fetchers: FetcherSet,
    max_concurrency: usize,
    progress: Arc<AcquisitionProgress>,
}

impl AcquisitionCoordinator {
    pub fn new(fetchers: FetcherSet, max_concurrency: usize) -> Self {
        Self {
            fetchers,
            max_concurrency: max_concurrency.max(1),
            progress: Arc::new(AcquisitionProgress::new()),
        }
    }

    /// Shared progress counters, readable while [`run`](Self::run) is in flight.
    pub fn progress(&self) -> Arc<AcquisitionProgress> {
        Arc::clone(&self.progress)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Acquire from every source in `registry`.
    ///
    /// Returns once every dispatched job is terminal. After `cancel` fires no
    /// new job is dispatched and in-flight jobs stop at their next suspension
    /// point; both are reported as cancelled failures. Records collected
    /// before cancellation are kept.
    pub async fn run(
        &self,
        registry: &SourceRegistry,
        request: &AcquisitionRequest,
        cancel: &CancellationToken,
    ) -> AcquisitionOutcome {
        let expected_points: u64 = registry
            .iter()
            .map(|d| d.expected_points(&request.range, request.granularity))
            .sum();
        self.progress.begin(registry.len(), expected_points);
        info!(
            "Acquiring {} .. {} at {} from {} sources ({} workers, ~{} points expected)",
            request.range.start,
            request.range.end,
            request.granularity,
            registry.len(),
            self.max_concurrency,
            expected_points
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut reports: Vec<(usize, JobReport)> = Vec::with_capacity(registry.len());
        let mut batches: Vec<(usize, SourceBatch)> = Vec::new();
        // Task id -> registry index and a copy of the job, for tasks that die.
        let mut dispatched: HashMap<Id, (usize, AcquisitionJob)> = HashMap::new();

        let mut pending = registry
            .iter()
            .map(|d| AcquisitionJob::new(Arc::clone(d), request.range, request.granularity))
            .enumerate();

        while let Some((index, job)) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                for (index, job) in std::iter::once((index, job)).chain(pending.by_ref()) {
                    debug!("Source '{}' not dispatched: cancelled", job.descriptor().id);
                    reports.push((index, self.cancelled_before_dispatch(job)));
                }
                break;
            };

            let shadow = AcquisitionJob::new(Arc::clone(job.descriptor()), *job.range(), job.granularity());
            let fetchers = self.fetchers.clone();
            let progress = Arc::clone(&self.progress);
            let cancel = cancel.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                let (report, batch) = run_job(job, &fetchers, &progress, &cancel).await;
                (index, report, batch)
            });
            dispatched.insert(handle.id(), (index, shadow));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, (index, report, batch))) => {
                    dispatched.remove(&id);
                    reports.push((index, report));
                    if let Some(batch) = batch {
                        batches.push((index, batch));
                    }
                }
                Err(e) => match dispatched.remove(&e.id()) {
                    Some((index, job)) => reports.push((index, self.lost_task_report(job, &e))),
                    None => error!("Acquisition task did not finish: {}", e),
                },
            }
        }

        reports.sort_by_key(|(index, _)| *index);
        batches.sort_by_key(|(index, _)| *index);

        let outcome = AcquisitionOutcome {
            batches: batches.into_iter().map(|(_, b)| b).collect(),
            reports: reports.into_iter().map(|(_, r)| r).collect(),
            expected_points,
        };
        info!(
            "Acquisition finished: {} sources succeeded, {} failed, {} records in {:?}",
            outcome.succeeded(),
            outcome.failed(),
            outcome.total_records(),
            self.progress.elapsed()
        );
        outcome
    }

    /// Report for a task that ended without returning, e.g. a panic outside
    /// the fetch itself or an abort.
    fn lost_task_report(&self, mut job: AcquisitionJob, error: &JoinError) -> JobReport {
        error!("Source '{}' task did not finish: {}", job.descriptor().id, error);
        job.fail();
        self.progress.record_failed();
        let failure = if error.is_cancelled() {
            JobFailure::Cancelled
        } else {
            JobFailure::Panicked(error.to_string())
        };
        job.into_report(Some(failure), std::time::Duration::ZERO)
    }

    fn cancelled_before_dispatch(&self, mut job: AcquisitionJob) -> JobReport {
        job.fail();
        self.progress.record_failed();
        job.into_report(Some(JobFailure::Cancelled), std::time::Duration::ZERO)
    }
}

/// Runs one job to a terminal state. Never panics outward.
async fn run_job(
    mut job: AcquisitionJob,
    fetchers: &FetcherSet,
    progress: &AcquisitionProgress,
    cancel: &CancellationToken,
) -> (JobReport, Option<SourceBatch>) {
    let started = Instant::now();
    let descriptor = Arc::clone(job.descriptor());
    job.start();
    progress.set_current_source(&descriptor.name);

    let result = fetch_job(&job, fetchers, cancel).await;

    match result {
        Ok((granularity, records)) => {
            job.complete(records.len());
            progress.record_completed(records.len());
            info!(
                "Source '{}' completed: {} records in {:?}",
                descriptor.id,
                records.len(),
                started.elapsed()
            );
            let report = job.into_report(None, started.elapsed());
            (
                report,
                Some(SourceBatch {
                    descriptor,
                    granularity,
                    records,
                }),
            )
        }
        Err(failure) => {
            job.fail();
            progress.record_failed();
            warn!("Source '{}' failed: {}", descriptor.id, failure);
            (job.into_report(Some(failure), started.elapsed()), None)
        }
    }
}

async fn fetch_job(
    job: &AcquisitionJob,
    fetchers: &FetcherSet,
    cancel: &CancellationToken,
) -> Result<(Granularity, Vec<PriceRecord>), JobFailure> {
    let descriptor = job.descriptor();
    let kind = descriptor.wire_format.kind();
    let fetcher = fetchers.get(kind).ok_or(JobFailure::NoFetcher(kind))?;
    let request = FetchRequest::resolve(descriptor, job.range(), job.granularity())?;
    debug!(
        "Source '{}' fetching {} .. {} at {} via {}",
        descriptor.id,
        request.range.start,
        request.range.end,
        request.granularity,
        fetcher.id()
    );

    let fetch = AssertUnwindSafe(fetch_with_retry(fetcher.as_ref(), descriptor, &request)).catch_unwind();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(JobFailure::Cancelled),
        outcome = fetch => match outcome {
            Ok(Ok(records)) => Ok((request.granularity, records)),
            Ok(Err(e)) => Err(JobFailure::Fetch(e)),
            Err(panic) => Err(JobFailure::Panicked(panic_message(panic.as_ref()))),
        },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
