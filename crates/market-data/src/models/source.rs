use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::granularity::Granularity;
use super::range::{years_to_duration, DateRange};

/// Request budget published by a source.
///
/// Controls how aggressively a fetcher may call the source before the
/// vendor starts throttling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Requests allowed per window.
    pub requests: u32,

    /// Length of the window.
    pub window: Duration,

    /// Requests that may be sent back-to-back before pacing kicks in.
    pub burst: u32,
}

impl RateLimit {
    pub fn per_minute(requests: u32) -> Self {
        Self {
            requests,
            window: Duration::from_secs(60),
            burst: 1,
        }
    }

    pub fn per_hour(requests: u32) -> Self {
        Self {
            requests,
            window: Duration::from_secs(3_600),
            burst: 1,
        }
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst.max(1);
        self
    }

    /// Tokens regained per second.
    pub fn refill_rate(&self) -> f64 {
        let window = self.window.as_secs_f64();
        if window <= 0.0 {
            return f64::INFINITY;
        }
        self.requests.max(1) as f64 / window
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

/// Payload shape of a source, and therefore which fetcher handles it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireFormat {
    /// Yahoo chart API: parallel timestamp/quote arrays.
    YahooChartJson,
    /// Alpha Vantage FX time series keyed by timestamp.
    AlphaVantageJson,
    /// MetalPriceAPI timeframe endpoint, inverted USD rates per day.
    MetalPriceJson,
    /// Nasdaq Data Link (Quandl) dataset with named columns.
    NasdaqDatasetJson,
    /// Stooq CSV download.
    StooqCsv,
    /// Local delimited dump, e.g. a Kaggle dataset.
    CsvFile {
        delimiter: u8,
        timestamp_format: String,
    },
    /// Dukascopy candle files, 24-byte big-endian frames.
    DukascopyCandles { price_scale: u32 },
    /// Seeded random walk. Only placed in a registry on purpose.
    Synthetic { seed: u64 },
}

/// Data-free discriminant of [`WireFormat`], used to look up fetchers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormatKind {
    YahooChartJson,
    AlphaVantageJson,
    MetalPriceJson,
    NasdaqDatasetJson,
    StooqCsv,
    CsvFile,
    DukascopyCandles,
    Synthetic,
}

impl WireFormat {
    pub fn kind(&self) -> WireFormatKind {
        match self {
            WireFormat::YahooChartJson => WireFormatKind::YahooChartJson,
            WireFormat::AlphaVantageJson => WireFormatKind::AlphaVantageJson,
            WireFormat::MetalPriceJson => WireFormatKind::MetalPriceJson,
            WireFormat::NasdaqDatasetJson => WireFormatKind::NasdaqDatasetJson,
            WireFormat::StooqCsv => WireFormatKind::StooqCsv,
            WireFormat::CsvFile { .. } => WireFormatKind::CsvFile,
            WireFormat::DukascopyCandles { .. } => WireFormatKind::DukascopyCandles,
            WireFormat::Synthetic { .. } => WireFormatKind::Synthetic,
        }
    }
}

/// Static description of one historical data source.
///
/// Loaded once into the registry and shared read-only by every job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Stable identifier, e.g. "YAHOO".
    pub id: String,

    /// Human readable name.
    pub name: String,

    /// Source-specific symbol for the instrument ("GC=F", "XAUUSD", ...).
    pub symbol: String,

    /// Candle intervals the source serves.
    pub granularities: Vec<Granularity>,

    /// How far back the source reaches.
    pub years_of_history: u32,

    /// Prior trust in the source, 0..=1. Used to break conflicts.
    pub nominal_quality: f64,

    pub rate_limit: RateLimit,

    /// Base URL, or a `file://` path for local datasets.
    pub endpoint: String,

    pub wire_format: WireFormat,
}

impl SourceDescriptor {
    pub fn supports(&self, granularity: Granularity) -> bool {
        self.granularities.contains(&granularity)
    }

    /// The requested granularity if served, else the finest served granularity
    /// that is coarser than the request. Finer data is never substituted.
    pub fn resolve_granularity(&self, requested: Granularity) -> Option<Granularity> {
        if self.supports(requested) {
            return Some(requested);
        }
        self.granularities
            .iter()
            .copied()
            .filter(|g| *g > requested)
            .min()
    }

    /// Earliest instant the source has data for, counted back from `end`.
    pub fn history_start(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        end - years_to_duration(self.years_of_history)
    }

    /// Intersects the request with the source's history depth.
    pub fn clamp_range(&self, range: &DateRange) -> Option<DateRange> {
        if !range.is_valid() {
            return None;
        }
        range.clamp_start(self.history_start(range.end))
    }

    /// Nominal number of candles the source can contribute for the request.
    pub fn expected_points(&self, range: &DateRange, requested: Granularity) -> u64 {
        let Some(granularity) = self.resolve_granularity(requested) else {
            return 0;
        };
        let Some(clamped) = self.clamp_range(range) else {
            return 0;
        };
        (clamped.duration().num_seconds() / granularity.as_seconds()).max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn descriptor(granularities: Vec<Granularity>, years: u32) -> SourceDescriptor {
        SourceDescriptor {
            id: "TEST".to_string(),
            name: "Test".to_string(),
            symbol: "XAUUSD".to_string(),
            granularities,
            years_of_history: years,
            nominal_quality: 0.9,
            rate_limit: RateLimit::per_minute(10),
            endpoint: "https://example.invalid".to_string(),
            wire_format: WireFormat::StooqCsv,
        }
    }

    #[test]
    fn test_resolve_granularity_prefers_exact() {
        let d = descriptor(vec![Granularity::OneHour, Granularity::OneDay], 5);
        assert_eq!(d.resolve_granularity(Granularity::OneHour), Some(Granularity::OneHour));
    }

    #[test]
    fn test_resolve_granularity_falls_back_to_coarser() {
        let d = descriptor(vec![Granularity::OneDay], 5);
        assert_eq!(d.resolve_granularity(Granularity::OneHour), Some(Granularity::OneDay));

        let d = descriptor(vec![Granularity::OneMinute], 5);
        assert_eq!(d.resolve_granularity(Granularity::OneHour), None);
    }

    #[test]
    fn test_clamp_range_to_history() {
        let d = descriptor(vec![Granularity::OneDay], 1);
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        let clamped = d.clamp_range(&DateRange::new(start, end)).unwrap();
        assert_eq!(clamped.end, end);
        assert!(clamped.start > start);
        assert_eq!(clamped.duration().num_days(), 365);
    }

    #[test]
    fn test_expected_points() {
        let d = descriptor(vec![Granularity::OneHour], 10);
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(d.expected_points(&DateRange::new(start, end), Granularity::OneHour), 24);
        assert_eq!(d.expected_points(&DateRange::new(end, start), Granularity::OneHour), 0);
    }

    #[test]
    fn test_rate_limit_refill() {
        let limit = RateLimit::per_minute(5);
        assert!((limit.refill_rate() - 5.0 / 60.0).abs() < 1e-9);
        assert_eq!(RateLimit::per_hour(2000).with_burst(0).burst, 1);
    }
}
