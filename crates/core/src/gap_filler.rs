//! Temporal gap detection and linear interpolation.

use std::collections::HashMap;

use aurum_market_data::{Granularity, PriceRecord};
use chrono::Duration;
use log::debug;

use crate::config::GapFillConfig;
use crate::series::PriceSeries;

/// Spacing used when neither configured nor inferable.
const FALLBACK_INTERVAL_SECS: i64 = 3_600;

/// Result of [`GapFiller::fill`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapFillOutcome {
    pub series: PriceSeries,
    /// Adjacent pairs further apart than the threshold, counted before filling.
    pub gaps_detected: usize,
    pub points_synthesized: usize,
}

/// Fills gaps with interpolated candles.
///
/// For a gap between records `a` and `b`, a record is synthesized every
/// `interval` after `a` while strictly before `b`, at most
/// `max_points_per_gap` per gap. At time fraction `f`:
///
/// - `open  = a.close + (b.open  - a.close) * f`
/// - `close = a.close + (b.close - a.close) * f`
/// - `high  = max(a.high, b.high)`, `low = min(a.low, b.low)`
/// - no volume, flagged interpolated
#[derive(Debug, Clone)]
pub struct GapFiller {
    config: GapFillConfig,
    fallback_interval: Duration,
}

impl Default for GapFiller {
    fn default() -> Self {
        Self::new(GapFillConfig::default())
    }
}

impl GapFiller {
    pub fn new(config: GapFillConfig) -> Self {
        Self {
            config,
            fallback_interval: Duration::seconds(FALLBACK_INTERVAL_SECS),
        }
    }

    /// Filler for a series requested at `granularity`.
    ///
    /// The threshold is widened to at least two candles, so consecutive daily
    /// candles are not gaps, and `granularity` becomes the fallback spacing.
    pub fn for_granularity(mut config: GapFillConfig, granularity: Granularity) -> Self {
        let candle = granularity.as_seconds();
        config.threshold_secs = config.threshold_secs.max(2 * candle);
        Self {
            config,
            fallback_interval: Duration::seconds(candle),
        }
    }

    pub fn config(&self) -> &GapFillConfig {
        &self.config
    }

    /// Fills gaps using the configured interval, or one inferred from the series.
    pub fn fill(&self, series: PriceSeries) -> GapFillOutcome {
        let interval = self
            .config
            .interval()
            .unwrap_or_else(|| self.infer_interval(&series));
        self.fill_with_interval(series, interval)
    }

    /// Fills gaps at an explicit spacing. Non-positive spacing disables synthesis
    /// but gaps are still counted.
    pub fn fill_with_interval(&self, series: PriceSeries, interval: Duration) -> GapFillOutcome {
        let threshold = self.config.threshold();
        let cap = self.config.max_points_per_gap;
        let records = series.into_records();

        let mut filled = Vec::with_capacity(records.len());
        let mut gaps_detected = 0;
        let mut points_synthesized = 0;

        for (i, record) in records.iter().enumerate() {
            filled.push(*record);
            let Some(next) = records.get(i + 1) else {
                break;
            };
            if next.timestamp() - record.timestamp() <= threshold {
                continue;
            }

            gaps_detected += 1;
            let synthesized = interpolate(record, next, interval, cap);
            debug!(
                "Gap {} .. {}: synthesized {} records",
                record.timestamp(),
                next.timestamp(),
                synthesized.len()
            );
            points_synthesized += synthesized.len();
            filled.extend(synthesized);
        }

        GapFillOutcome {
            series: PriceSeries::from_ordered(filled),
            gaps_detected,
            points_synthesized,
        }
    }

    /// Most frequent positive spacing that is not itself a gap. Ties go to the
    /// smaller spacing; without any such spacing the fallback interval is used.
    pub fn infer_interval(&self, series: &PriceSeries) -> Duration {
        let threshold = self.config.threshold().num_seconds();
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for pair in series.records().windows(2) {
            let spacing = (pair[1].timestamp() - pair[0].timestamp()).num_seconds();
            if spacing > 0 && spacing <= threshold {
                *counts.entry(spacing).or_default() += 1;
            }
        }

        counts
            .into_iter()
            .max_by(|(a_spacing, a_count), (b_spacing, b_count)| {
                a_count.cmp(b_count).then(b_spacing.cmp(a_spacing))
            })
            .map(|(spacing, _)| Duration::seconds(spacing))
            .unwrap_or(self.fallback_interval)
    }
}

fn interpolate(a: &PriceRecord, b: &PriceRecord, interval: Duration, cap: usize) -> Vec<PriceRecord> {
    let mut out = Vec::new();
    if interval <= Duration::zero() {
        return out;
    }

    let total = (b.timestamp() - a.timestamp()).num_seconds() as f64;
    let high = a.high().max(b.high());
    let low = a.low().min(b.low());
    let mut t = a.timestamp() + interval;

    while t < b.timestamp() && out.len() < cap {
        let fraction = (t - a.timestamp()).num_seconds() as f64 / total;
        let open = a.close() + (b.open() - a.close()) * fraction;
        let close = a.close() + (b.close() - a.close()) * fraction;
        out.push(PriceRecord::interpolated(t, open, high, low, close));
        t += interval;
    }
    out
}
