//! Quality scoring of a cleaned series.
//!
//! The score is a weighted mean of four components, each in `[0, 1]`:
//!
//! | Component    | Formula                          |
//! |--------------|----------------------------------|
//! | coverage     | `1 - gaps / len`                 |
//! | cleanliness  | `1 - anomalies / raw`            |
//! | completeness | `min(1, acquired / expected)`    |
//! | consistency  | OHLC-consistent share pre-clean  |
//!
//! `raw` is everything handed to the validator, gap-filled points included,
//! so interpolation dilutes the anomaly share in cleanliness. Consistency is
//! measured over observed (non-interpolated) candles only: filled points are
//! consistent by construction.
//!
//! An empty series always scores 0.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::QualityWeights;
use crate::series::PriceSeries;

// =============================================================================
// Grade
// =============================================================================

/// Letter grade derived from fixed score bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Grade {
    #[serde(rename = "D")]
    D,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Grade::APlus
        } else if score >= 0.8 {
            Grade::A
        } else if score >= 0.7 {
            Grade::B
        } else if score >= 0.6 {
            Grade::C
        } else {
            Grade::D
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Inputs and report
// =============================================================================

/// Counts gathered by the earlier stages.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QualityInputs {
    /// Gaps found before filling.
    pub gaps_detected: usize,
    /// Records the validator rejected as anomalies.
    pub anomalies: usize,
    /// Records the validator rejected for any reason.
    pub rejected: usize,
    /// Records handed to the validator, interpolated ones included.
    pub raw_count: usize,
    /// Records returned by all sources before consolidation.
    pub acquired_points: u64,
    /// Summed capacity of every dispatched source.
    pub expected_points: u64,
    /// OHLC-consistent share of the observed validator input.
    pub consistency_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityComponents {
    pub coverage: f64,
    pub cleanliness: f64,
    pub completeness: f64,
    pub consistency: f64,
}

/// Derived description of a cleaned series. Recomputing it on the same input
/// yields the same report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub total_records: usize,
    pub interpolated_records: usize,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub span_seconds: i64,
    pub gap_count: usize,
    pub anomaly_count: usize,
    pub rejected_count: usize,
    pub raw_count: usize,
    pub acquired_points: u64,
    pub expected_points: u64,
    pub consistency_ratio: f64,
    pub components: QualityComponents,
    pub score: f64,
    pub grade: Grade,
}

impl QualityReport {
    /// Whether the series is good enough for a consumer requiring `min_score`.
    pub fn passes(&self, min_score: f64) -> bool {
        self.score >= min_score
    }
}

// =============================================================================
// Scorer
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    weights: QualityWeights,
}

impl QualityScorer {
    pub fn new(weights: QualityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.weights
    }

    pub fn components(&self, series: &PriceSeries, inputs: &QualityInputs) -> QualityComponents {
        if series.is_empty() {
            return QualityComponents::default();
        }
        let len = series.len() as f64;
        QualityComponents {
            coverage: unit(1.0 - inputs.gaps_detected as f64 / len),
            cleanliness: if inputs.raw_count == 0 {
                1.0
            } else {
                unit(1.0 - inputs.anomalies as f64 / inputs.raw_count as f64)
            },
            completeness: if inputs.expected_points == 0 {
                0.0
            } else {
                unit(inputs.acquired_points as f64 / inputs.expected_points as f64)
            },
            consistency: unit(inputs.consistency_ratio),
        }
    }

    pub fn score(&self, components: &QualityComponents) -> f64 {
        let w = &self.weights;
        let total = w.total();
        if total.is_nan() || total <= 0.0 {
            return 0.0;
        }
        let weighted = components.coverage * w.coverage
            + components.cleanliness * w.cleanliness
            + components.completeness * w.completeness
            + components.consistency * w.consistency;
        unit(weighted / total)
    }

    pub fn report(&self, series: &PriceSeries, inputs: &QualityInputs) -> QualityReport {
        let components = self.components(series, inputs);
        let score = if series.is_empty() {
            0.0
        } else {
            self.score(&components)
        };

        QualityReport {
            total_records: series.len(),
            interpolated_records: series.interpolated_count(),
            first_timestamp: series.start(),
            last_timestamp: series.end(),
            span_seconds: series.span().map(|d| d.num_seconds()).unwrap_or(0),
            gap_count: inputs.gaps_detected,
            anomaly_count: inputs.anomalies,
            rejected_count: inputs.rejected,
            raw_count: inputs.raw_count,
            acquired_points: inputs.acquired_points,
            expected_points: inputs.expected_points,
            consistency_ratio: inputs.consistency_ratio,
            components,
            score,
            grade: Grade::from_score(score),
        }
    }
}

/// Clamps to `[0, 1]`; NaN becomes 0.
fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
