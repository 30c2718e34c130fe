use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive UTC time window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window ending at `end` and reaching `years` calendar years back.
    pub fn years_back(end: DateTime<Utc>, years: u32) -> Self {
        Self {
            start: end - years_to_duration(years),
            end,
        }
    }

    /// A range whose end precedes its start has negative duration.
    pub fn is_valid(&self) -> bool {
        self.end >= self.start
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Moves the start forward to `earliest` if needed. `None` when nothing is left.
    pub fn clamp_start(&self, earliest: DateTime<Utc>) -> Option<DateRange> {
        let start = self.start.max(earliest);
        if start > self.end {
            return None;
        }
        Some(DateRange { start, end: self.end })
    }

    /// Splits the range into contiguous windows no longer than `span`.
    pub fn chunks(&self, span: Duration) -> Vec<DateRange> {
        if !self.is_valid() || span <= Duration::zero() {
            return Vec::new();
        }

        let mut windows = Vec::new();
        let mut cursor = self.start;
        loop {
            let end = (cursor + span).min(self.end);
            windows.push(DateRange { start: cursor, end });
            if end >= self.end {
                break;
            }
            cursor = end;
        }
        windows
    }
}

/// 365.25 days per year.
pub(crate) fn years_to_duration(years: u32) -> Duration {
    Duration::seconds((years as f64 * 365.25 * 86_400.0) as i64)
}
