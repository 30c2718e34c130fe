//! Structural and statistical cleaning of a price series.
//!
//! Records are filtered, never modified:
//! - Structural checks: finite positive prices, OHLC invariant, non-negative
//!   volume, instrument price band
//! - Extreme single-candle moves
//! - Global `k·σ` outliers on `close`, computed over the structurally valid
//!   records only

use std::collections::BTreeMap;
use std::fmt;

use aurum_market_data::PriceRecord;
use log::{debug, warn};
use serde::Serialize;

use crate::config::ValidatorConfig;
use crate::series::PriceSeries;

// =============================================================================
// Rejection reasons
// =============================================================================

/// Why a record was dropped. Checked in declaration order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// An OHLC value is zero, negative, NaN or infinite.
    NonPositivePrice,
    /// `low <= min(open, close) <= max(open, close) <= high` does not hold.
    OhlcInconsistent,
    NegativeVolume,
    OutsidePriceBand,
    /// `|close - open| / open` above the configured limit.
    ExtremeMove,
    /// `close` too many standard deviations from the mean.
    StatisticalOutlier,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::NonPositivePrice => "non_positive_price",
            RejectionReason::OhlcInconsistent => "ohlc_inconsistent",
            RejectionReason::NegativeVolume => "negative_volume",
            RejectionReason::OutsidePriceBand => "outside_price_band",
            RejectionReason::ExtremeMove => "extreme_move",
            RejectionReason::StatisticalOutlier => "statistical_outlier",
        }
    }

    pub fn is_structural(&self) -> bool {
        !self.is_anomaly()
    }

    /// Implausible but well-formed observations.
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self,
            RejectionReason::ExtremeMove | RejectionReason::StatisticalOutlier
        )
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Summary statistics of `close` over the structurally valid records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseStats {
    pub samples: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

/// Result of [`SeriesValidator::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    pub series: PriceSeries,
    /// Records handed to the validator.
    pub input_count: usize,
    pub rejections: BTreeMap<RejectionReason, usize>,
    /// Share of observed (non-interpolated) input records that satisfied the
    /// OHLC invariant before cleaning. 1.0 when nothing was observed.
    pub consistency_ratio: f64,
    /// `None` when statistical rejection was skipped.
    pub close_stats: Option<CloseStats>,
}

impl ValidationOutcome {
    pub fn rejected(&self) -> usize {
        self.rejections.values().sum()
    }

    pub fn rejected_for(&self, reason: RejectionReason) -> usize {
        self.rejections.get(&reason).copied().unwrap_or(0)
    }

    /// Rejections counted as anomalies by the quality score.
    pub fn anomalies(&self) -> usize {
        self.rejections
            .iter()
            .filter(|(reason, _)| reason.is_anomaly())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn structural_rejections(&self) -> usize {
        self.rejected() - self.anomalies()
    }
}

// =============================================================================
// Validator
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SeriesValidator {
    config: ValidatorConfig,
}

impl SeriesValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Structural checks for one record.
    pub fn check_structure(&self, record: &PriceRecord) -> Result<(), RejectionReason> {
        if record.prices().iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(RejectionReason::NonPositivePrice);
        }
        if !record.is_ohlc_consistent() {
            return Err(RejectionReason::OhlcInconsistent);
        }
        if record.volume().is_some_and(|v| v < 0.0 || v.is_nan()) {
            return Err(RejectionReason::NegativeVolume);
        }
        let band = self.config.price_band;
        if !record.prices().iter().all(|p| band.contains(*p)) {
            return Err(RejectionReason::OutsidePriceBand);
        }
        Ok(())
    }

    fn is_extreme_move(&self, record: &PriceRecord) -> bool {
        (record.close() - record.open()).abs() / record.open() > self.config.max_candle_move
    }

    /// Drops invalid records. Output order is input order.
    pub fn validate(&self, series: PriceSeries) -> ValidationOutcome {
        let input_count = series.len();
        if input_count == 0 {
            return ValidationOutcome {
                consistency_ratio: 1.0,
                ..Default::default()
            };
        }

        let (observed, consistent) = series
            .iter()
            .filter(|r| !r.is_interpolated())
            .fold((0usize, 0usize), |(seen, ok), r| {
                (seen + 1, ok + usize::from(r.is_ohlc_consistent()))
            });
        let mut rejections: BTreeMap<RejectionReason, usize> = BTreeMap::new();

        let structurally_valid: Vec<PriceRecord> = series
            .into_iter()
            .filter(|record| match self.check_structure(record) {
                Ok(()) => true,
                Err(reason) => {
                    *rejections.entry(reason).or_default() += 1;
                    false
                }
            })
            .collect();

        let close_stats = self.close_stats(&structurally_valid);
        let limit = close_stats.map(|s| self.config.sigma_multiple * s.std_dev);

        let kept: Vec<PriceRecord> = structurally_valid
            .into_iter()
            .filter(|record| {
                let reason = if self.is_extreme_move(record) {
                    Some(RejectionReason::ExtremeMove)
                } else {
                    match (close_stats, limit) {
                        (Some(stats), Some(limit)) if (record.close() - stats.mean).abs() > limit => {
                            Some(RejectionReason::StatisticalOutlier)
                        }
                        _ => None,
                    }
                };
                match reason {
                    Some(reason) => {
                        *rejections.entry(reason).or_default() += 1;
                        false
                    }
                    None => true,
                }
            })
            .collect();

        let outcome = ValidationOutcome {
            series: PriceSeries::from_ordered(kept),
            input_count,
            rejections,
            consistency_ratio: if observed == 0 {
                1.0
            } else {
                consistent as f64 / observed as f64
            },
            close_stats,
        };

        if outcome.rejected() > 0 {
            warn!(
                "Validator rejected {} of {} records ({} anomalies)",
                outcome.rejected(),
                input_count,
                outcome.anomalies()
            );
        }
        debug!("Validator rejections by reason: {:?}", outcome.rejections);
        outcome
    }

    /// Mean and population σ of `close`, or `None` below `min_samples`.
    fn close_stats(&self, records: &[PriceRecord]) -> Option<CloseStats> {
        let samples = records.len();
        if samples == 0 || samples < self.config.min_samples {
            return None;
        }
        let n = samples as f64;
        let mean = records.iter().map(|r| r.close()).sum::<f64>() / n;
        let variance = records
            .iter()
            .map(|r| (r.close() - mean).powi(2))
            .sum::<f64>()
            / n;
        Some(CloseStats {
            samples,
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceBand;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn candle(h: i64, close: f64) -> PriceRecord {
        PriceRecord::new(hour(h), close, close + 1.0, close - 1.0, close, Some(1.0))
    }

    /// Closes alternating 1999/2001, with `outlier` at the end when given.
    fn steady(n: i64, outlier: Option<f64>) -> PriceSeries {
        let mut records: Vec<_> = (0..n)
            .map(|h| candle(h, if h % 2 == 0 { 1999.0 } else { 2001.0 }))
            .collect();
        if let Some(close) = outlier {
            records.push(candle(n, close));
        }
        PriceSeries::from_records(records)
    }

    #[test]
    fn test_clean_series_passes() {
        let outcome = SeriesValidator::default().validate(steady(50, None));
        assert_eq!(outcome.series.len(), 50);
        assert_eq!(outcome.rejected(), 0);
        assert_eq!(outcome.consistency_ratio, 1.0);
        let stats = outcome.close_stats.unwrap();
        assert!((stats.mean - 2000.0).abs() < 1e-9);
        assert!((stats.std_dev - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistical_outlier_rejected() {
        let outcome = SeriesValidator::default().validate(steady(100, Some(2600.0)));
        assert_eq!(outcome.input_count, 101);
        assert_eq!(outcome.series.len(), 100);
        assert_eq!(outcome.rejected_for(RejectionReason::StatisticalOutlier), 1);
        assert_eq!(outcome.anomalies(), 1);
        assert!(outcome.series.iter().all(|r| r.close() < 2600.0));
    }

    #[test]
    fn test_statistics_skipped_below_min_samples() {
        let outcome = SeriesValidator::default().validate(steady(5, Some(2600.0)));
        assert!(outcome.close_stats.is_none());
        assert_eq!(outcome.rejected(), 0);
    }

    #[test]
    fn test_structural_rejections() {
        let records = vec![
            candle(0, 2000.0),
            // high below close
            PriceRecord::new(hour(1), 2000.0, 2000.5, 1999.0, 2001.0, None),
            // non-positive price
            PriceRecord::new(hour(2), 0.0, 2000.0, 0.0, 1999.0, None),
            // negative volume
            PriceRecord::new(hour(3), 2000.0, 2001.0, 1999.0, 2000.0, Some(-5.0)),
            // out of the gold band
            candle(4, 120.0),
            // NaN close
            PriceRecord::new(hour(5), 2000.0, 2001.0, 1999.0, f64::NAN, None),
        ];
        let outcome = SeriesValidator::default().validate(PriceSeries::from_records(records));

        assert_eq!(outcome.series.len(), 1);
        assert_eq!(outcome.rejected_for(RejectionReason::OhlcInconsistent), 1);
        assert_eq!(outcome.rejected_for(RejectionReason::NonPositivePrice), 2);
        assert_eq!(outcome.rejected_for(RejectionReason::NegativeVolume), 1);
        assert_eq!(outcome.rejected_for(RejectionReason::OutsidePriceBand), 1);
        assert_eq!(outcome.anomalies(), 0);
        assert_eq!(outcome.structural_rejections(), 5);
        // the NaN record cannot satisfy the invariant
        assert!((outcome.consistency_ratio - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_consistency_counts_observed_records_only() {
        let mut records = vec![
            candle(0, 2000.0),
            PriceRecord::new(hour(1), 2000.0, 2000.5, 1999.0, 2001.0, None),
        ];
        records.extend((2..10).map(|h| PriceRecord::interpolated(hour(h), 2000.0, 2000.0, 2000.0, 2000.0)));
        records.push(candle(10, 2000.0));
        let outcome = SeriesValidator::default().validate(PriceSeries::from_records(records));

        assert_eq!(outcome.input_count, 11);
        // 2 of 3 observed candles are consistent; filled points are ignored.
        assert!((outcome.consistency_ratio - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_consistency_of_fully_interpolated_input() {
        let records = (0..3)
            .map(|h| PriceRecord::interpolated(hour(h), 2000.0, 2000.0, 2000.0, 2000.0))
            .collect();
        let outcome = SeriesValidator::default().validate(PriceSeries::from_records(records));
        assert_eq!(outcome.consistency_ratio, 1.0);
    }

    #[test]
    fn test_extreme_move_rejected() {
        let mut records: Vec<_> = steady(20, None).into_records();
        records.push(PriceRecord::new(hour(40), 2000.0, 2250.0, 1999.0, 2240.0, None));
        let outcome = SeriesValidator::default().validate(PriceSeries::from_records(records));
        assert_eq!(outcome.rejected_for(RejectionReason::ExtremeMove), 1);
        assert_eq!(outcome.series.len(), 20);
    }

    #[test]
    fn test_custom_band() {
        let validator = SeriesValidator::new(ValidatorConfig {
            price_band: PriceBand {
                min: 10.0,
                max: 100.0,
            },
            ..Default::default()
        });
        let outcome = validator.validate(PriceSeries::from_records(vec![candle(0, 50.0), candle(1, 2000.0)]));
        assert_eq!(outcome.series.len(), 1);
        assert_eq!(outcome.series.records()[0].close(), 50.0);
    }

    #[test]
    fn test_empty_series() {
        let outcome = SeriesValidator::default().validate(PriceSeries::new());
        assert!(outcome.series.is_empty());
        assert_eq!(outcome.input_count, 0);
        assert_eq!(outcome.consistency_ratio, 1.0);
    }
}
