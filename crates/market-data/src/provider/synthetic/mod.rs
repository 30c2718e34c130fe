//! Seeded random-walk fetcher.
//!
//! Produces plausible gold candles without touching the network. It is a test
//! double and demo source: nothing in the built-in catalog uses it, so it only
//! ever contributes data when a registry names it explicitly.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::FetchError;
use crate::models::{PriceRecord, SourceDescriptor, WireFormat, WireFormatKind};
use crate::provider::{finalize, FetchRequest, Fetcher, RetryPolicy};

const FETCHER_ID: &str = "SYNTHETIC";
const START_PRICE: f64 = 1_800.0;
const MIN_PRICE: f64 = 800.0;
const MAX_PRICE: f64 = 2_500.0;
/// Per-step move, as a fraction of price.
const MAX_STEP: f64 = 0.005;
const MAX_POINTS: usize = 250_000;

/// Fetcher for [`WireFormat::Synthetic`].
#[derive(Default)]
pub struct SyntheticFetcher;

impl SyntheticFetcher {
    pub fn new() -> Self {
        Self
    }

    /// Generate the walk for `request`. Same seed and request, same candles.
    pub fn generate(seed: u64, request: &FetchRequest) -> Vec<PriceRecord> {
        let mut rng = StdRng::seed_from_u64(seed);
        let step = request.granularity.as_seconds();
        let Some(mut cursor) = align_up(request.range.start, step) else {
            return Vec::new();
        };

        let mut price = START_PRICE;
        let mut records = Vec::new();
        while cursor <= request.range.end && records.len() < MAX_POINTS {
            let open = price;
            let close = (open * (1.0 + rng.gen_range(-MAX_STEP..MAX_STEP))).clamp(MIN_PRICE, MAX_PRICE);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.002));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.002));
            let volume = rng.gen_range(100.0..5_000.0_f64).round();

            records.push(PriceRecord::new(cursor, open, high, low, close, Some(volume)));
            price = close;
            cursor += Duration::seconds(step);
        }
        records
    }
}

fn align_up(timestamp: DateTime<Utc>, step: i64) -> Option<DateTime<Utc>> {
    let seconds = timestamp.timestamp();
    let remainder = seconds.rem_euclid(step);
    let aligned = if remainder == 0 { seconds } else { seconds + step - remainder };
    Utc.timestamp_opt(aligned, 0).single()
}

#[async_trait]
impl Fetcher for SyntheticFetcher {
    fn id(&self) -> &'static str {
        FETCHER_ID
    }

    fn wire_format(&self) -> WireFormatKind {
        WireFormatKind::Synthetic
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        request: &FetchRequest,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        let WireFormat::Synthetic { seed } = descriptor.wire_format else {
            return Err(FetchError::unsupported(&descriptor.id, "descriptor is not synthetic"));
        };
        Ok(finalize(Self::generate(seed, request), request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, Granularity};

    fn request() -> FetchRequest {
        FetchRequest {
            range: DateRange::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            ),
            granularity: Granularity::OneHour,
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(
            SyntheticFetcher::generate(7, &request()),
            SyntheticFetcher::generate(7, &request())
        );
        assert_ne!(
            SyntheticFetcher::generate(7, &request()),
            SyntheticFetcher::generate(8, &request())
        );
    }

    #[test]
    fn test_candles_are_valid_and_on_grid() {
        let records = SyntheticFetcher::generate(42, &request());
        assert_eq!(records.len(), 24);
        assert_eq!(records[0].timestamp(), Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());
        for record in &records {
            assert!(record.is_ohlc_consistent());
            assert!(record.close() >= MIN_PRICE && record.close() <= MAX_PRICE);
            assert!(record.has_volume());
        }
    }
}
