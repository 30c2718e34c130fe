//! Aggregate acquisition progress shared between running jobs and observers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::warn;
use serde::Serialize;

/// Running totals updated by jobs as they finish.
///
/// Counters are atomics; the current source name and start time sit behind
/// mutexes that are never held across an await point.
#[derive(Debug, Default)]
pub struct AcquisitionProgress {
    downloaded_points: AtomicU64,
    total_expected_points: AtomicU64,
    jobs_total: AtomicUsize,
    jobs_completed: AtomicUsize,
    jobs_failed: AtomicUsize,
    current_source: Mutex<Option<String>>,
    started_at: Mutex<Option<Instant>>,
}

/// Point-in-time copy of [`AcquisitionProgress`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub downloaded_points: u64,
    pub total_expected_points: u64,
    pub jobs_total: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub current_source: Option<String>,
    /// Downloaded points per second since the run began.
    pub points_per_second: f64,
}

impl ProgressSnapshot {
    /// Share of jobs that reached a terminal state.
    pub fn job_fraction(&self) -> f64 {
        if self.jobs_total == 0 {
            return 1.0;
        }
        (self.jobs_completed + self.jobs_failed) as f64 / self.jobs_total as f64
    }

    /// Downloaded over expected points, capped at 1.
    pub fn point_fraction(&self) -> f64 {
        if self.total_expected_points == 0 {
            return 0.0;
        }
        (self.downloaded_points as f64 / self.total_expected_points as f64).min(1.0)
    }
}

impl AcquisitionProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| {
            warn!("Acquisition progress mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Resets the counters for a new run.
    pub fn begin(&self, jobs_total: usize, total_expected_points: u64) {
        self.downloaded_points.store(0, Ordering::SeqCst);
        self.total_expected_points.store(total_expected_points, Ordering::SeqCst);
        self.jobs_total.store(jobs_total, Ordering::SeqCst);
        self.jobs_completed.store(0, Ordering::SeqCst);
        self.jobs_failed.store(0, Ordering::SeqCst);
        *Self::lock(&self.current_source) = None;
        *Self::lock(&self.started_at) = Some(Instant::now());
    }

    pub fn set_current_source(&self, name: &str) {
        *Self::lock(&self.current_source) = Some(name.to_string());
    }

    pub fn record_completed(&self, points: usize) {
        self.downloaded_points.fetch_add(points as u64, Ordering::SeqCst);
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn elapsed(&self) -> Duration {
        Self::lock(&self.started_at)
            .map(|started| started.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let downloaded_points = self.downloaded_points.load(Ordering::SeqCst);
        let elapsed = self.elapsed().as_secs_f64();
        let points_per_second = if elapsed > 0.0 {
            downloaded_points as f64 / elapsed
        } else {
            0.0
        };

        ProgressSnapshot {
            downloaded_points,
            total_expected_points: self.total_expected_points.load(Ordering::SeqCst),
            jobs_total: self.jobs_total.load(Ordering::SeqCst),
            jobs_completed: self.jobs_completed.load(Ordering::SeqCst),
            jobs_failed: self.jobs_failed.load(Ordering::SeqCst),
            current_source: Self::lock(&self.current_source).clone(),
            points_per_second,
        }
    }
}
