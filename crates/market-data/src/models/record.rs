use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a record came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Reported by a source.
    #[default]
    Observed,
    /// Synthesized by the gap filler.
    Interpolated,
}

/// One OHLCV candle.
///
/// Construction does not validate: fetchers may hand back candles that break
/// the OHLC invariant and the validator filters them later. Fields are only
/// readable after construction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<f64>,
    #[serde(default)]
    origin: RecordOrigin,
}

impl PriceRecord {
    /// Create an observed record.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            origin: RecordOrigin::Observed,
        }
    }

    /// Create a record synthesized between two observations. Never carries volume.
    pub fn interpolated(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: None,
            origin: RecordOrigin::Interpolated,
        }
    }

    /// Flat candle for sources that only publish one price per period.
    pub fn flat(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self::new(timestamp, price, price, price, price, None)
    }

    /// Same candle, different timestamp.
    pub(crate) fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn open(&self) -> f64 {
        self.open
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn close(&self) -> f64 {
        self.close
    }

    pub fn volume(&self) -> Option<f64> {
        self.volume
    }

    pub fn origin(&self) -> RecordOrigin {
        self.origin
    }

    pub fn has_volume(&self) -> bool {
        self.volume.is_some()
    }

    pub fn is_interpolated(&self) -> bool {
        self.origin == RecordOrigin::Interpolated
    }

    /// `low <= min(open, close) <= max(open, close) <= high`
    pub fn is_ohlc_consistent(&self) -> bool {
        // Spelled out so a NaN anywhere fails the check.
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }

    /// Open, high, low, close in that order.
    pub fn prices(&self) -> [f64; 4] {
        [self.open, self.high, self.low, self.close]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_record_is_observed() {
        let record = PriceRecord::new(ts(), 2040.0, 2050.0, 2035.0, 2045.0, Some(1200.0));
        assert!(!record.is_interpolated());
        assert!(record.has_volume());
        assert_eq!(record.prices(), [2040.0, 2050.0, 2035.0, 2045.0]);
    }

    #[test]
    fn test_interpolated_record_has_no_volume() {
        let record = PriceRecord::interpolated(ts(), 2040.0, 2050.0, 2035.0, 2045.0);
        assert!(record.is_interpolated());
        assert_eq!(record.volume(), None);
    }

    #[test]
    fn test_ohlc_consistency() {
        let ok = PriceRecord::new(ts(), 2040.0, 2050.0, 2035.0, 2045.0, None);
        assert!(ok.is_ohlc_consistent());

        let high_below_close = PriceRecord::new(ts(), 2040.0, 2042.0, 2035.0, 2045.0, None);
        assert!(!high_below_close.is_ohlc_consistent());

        let low_above_open = PriceRecord::new(ts(), 2040.0, 2050.0, 2041.0, 2045.0, None);
        assert!(!low_above_open.is_ohlc_consistent());

        let nan_close = PriceRecord::new(ts(), 2040.0, 2050.0, 2035.0, f64::NAN, None);
        assert!(!nan_close.is_ohlc_consistent());
    }

    #[test]
    fn test_flat_record_is_consistent() {
        let record = PriceRecord::flat(ts(), 1985.5);
        assert!(record.is_ohlc_consistent());
        assert_eq!(record.close(), 1985.5);
    }
}
