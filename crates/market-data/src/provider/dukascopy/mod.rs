//! Dukascopy binary candle fetcher.
//!
//! Candle files live under
//! `{endpoint}/{SYMBOL}/{year}/{month-1:02}/...`:
//!
//! | Granularity | File | Covers |
//! |-------------|------|--------|
//! | 1min | `{yyyy}/{mm}/{dd}/BID_candles_min_1.bi5` | one day |
//! | 1h | `{yyyy}/{mm}/BID_candles_hour_1.bi5` | one month |
//! | 1d | `{yyyy}/BID_candles_day_1.bi5` | one year |
//!
//! Months are zero-based. Each file is LZMA-compressed and decodes to 24-byte
//! big-endian frames:
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+
//! | u32    | u32    | u32    | u32    | u32    | f32    |
//! | offset | open   | close  | low    | high   | volume |
//! +--------+--------+--------+--------+--------+--------+
//! ```
//!
//! `offset` is seconds from the start of the file's period; prices are integer
//! points divided by the instrument's price scale. Periods without data answer
//! 404 or an empty body.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use log::debug;
use reqwest::Client;

use crate::errors::FetchError;
use crate::models::{Granularity, PriceRecord, SourceDescriptor, WireFormat, WireFormatKind};
use crate::provider::http::{build_client, get_bytes};
use crate::provider::{finalize, FetchRequest, Fetcher};
use crate::registry::RateLimiter;

const FETCHER_ID: &str = "DUKASCOPY_CANDLES";
const FRAME_LEN: usize = 24;
/// First byte of an LZMA-alone header with the default lc/lp/pb properties.
const LZMA_PROPERTIES_BYTE: u8 = 0x5D;

/// One candle file and the instant its offsets count from.
#[derive(Clone, Debug, PartialEq, Eq)]
struct CandleFile {
    path: String,
    base: DateTime<Utc>,
}

/// Fetcher for [`WireFormat::DukascopyCandles`].
pub struct DukascopyFetcher {
    client: Client,
}

impl DukascopyFetcher {
    pub fn new() -> Self {
        Self {
            client: build_client(),
        }
    }

    /// Files covering `request`, oldest first.
    fn plan_files(
        provider: &str,
        symbol: &str,
        request: &FetchRequest,
    ) -> Result<Vec<CandleFile>, FetchError> {
        let symbol = symbol.to_ascii_uppercase();
        let first = request.range.start.date_naive();
        let last = request.range.end.date_naive();

        let mut cursor = match request.granularity {
            Granularity::OneMinute => first,
            Granularity::OneHour => first.with_day(1).unwrap_or(first),
            Granularity::OneDay => NaiveDate::from_ymd_opt(first.year(), 1, 1).unwrap_or(first),
            other => {
                return Err(FetchError::unsupported(
                    provider,
                    format!("no {} candle files", other),
                ))
            }
        };

        let mut files = Vec::new();
        while cursor <= last {
            let base = cursor
                .and_hms_opt(0, 0, 0)
                .and_then(|dt| Utc.from_local_datetime(&dt).single())
                .ok_or_else(|| FetchError::unsupported(provider, format!("bad period {}", cursor)))?;
            let year = cursor.year();
            let month = cursor.month0();
            let path = match request.granularity {
                Granularity::OneMinute => format!(
                    "{}/{}/{:02}/{:02}/BID_candles_min_1.bi5",
                    symbol,
                    year,
                    month,
                    cursor.day()
                ),
                Granularity::OneHour => {
                    format!("{}/{}/{:02}/BID_candles_hour_1.bi5", symbol, year, month)
                }
                _ => format!("{}/{}/BID_candles_day_1.bi5", symbol, year),
            };
            files.push(CandleFile { path, base });

            let next = match request.granularity {
                Granularity::OneMinute => cursor.succ_opt(),
                Granularity::OneHour => cursor.checked_add_months(Months::new(1)),
                _ => cursor.checked_add_months(Months::new(12)),
            };
            cursor = match next {
                Some(next) => next,
                None => break,
            };
        }

        Ok(files)
    }

    /// Decode one file body into candles.
    pub(crate) fn decode(
        provider: &str,
        base: DateTime<Utc>,
        price_scale: u32,
        bytes: &[u8],
    ) -> Result<Vec<PriceRecord>, FetchError> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let decompressed;
        let payload: &[u8] = if bytes[0] == LZMA_PROPERTIES_BYTE {
            let mut input = bytes;
            let mut output = Vec::new();
            lzma_rs::lzma_decompress(&mut input, &mut output)
                .map_err(|e| FetchError::malformed(provider, format!("LZMA: {:?}", e)))?;
            decompressed = output;
            &decompressed
        } else {
            bytes
        };

        if payload.len() % FRAME_LEN != 0 {
            return Err(FetchError::malformed(
                provider,
                format!("{} bytes is not a whole number of {}-byte frames", payload.len(), FRAME_LEN),
            ));
        }

        let scale = price_scale.max(1) as f64;
        let records = payload
            .chunks_exact(FRAME_LEN)
            .map(|frame| {
                let offset = be_u32(frame, 0);
                let open = be_u32(frame, 4) as f64 / scale;
                let close = be_u32(frame, 8) as f64 / scale;
                let low = be_u32(frame, 12) as f64 / scale;
                let high = be_u32(frame, 16) as f64 / scale;
                let volume = f32::from_bits(be_u32(frame, 20)) as f64;
                let timestamp = base + Duration::seconds(offset as i64);
                PriceRecord::new(timestamp, open, high, low, close, Some(volume))
            })
            .collect();

        Ok(records)
    }
}

impl Default for DukascopyFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn be_u32(frame: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
}

#[async_trait]
impl Fetcher for DukascopyFetcher {
    fn id(&self) -> &'static str {
        FETCHER_ID
    }

    fn wire_format(&self) -> WireFormatKind {
        WireFormatKind::DukascopyCandles
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        request: &FetchRequest,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        let provider = descriptor.id.as_str();
        let WireFormat::DukascopyCandles { price_scale } = descriptor.wire_format else {
            return Err(FetchError::unsupported(provider, "descriptor is not a Dukascopy source"));
        };

        let files = Self::plan_files(provider, &descriptor.symbol, request)?;
        let limiter = RateLimiter::new(provider, &descriptor.rate_limit);
        let endpoint = descriptor.endpoint.trim_end_matches('/');
        debug!("{}: {} candle files to download", provider, files.len());

        let mut records = Vec::new();
        for file in files {
            limiter.acquire().await;

            let url = reqwest::Url::parse(&format!("{}/{}", endpoint, file.path))
                .map_err(|e| FetchError::malformed(provider, format!("Failed to build URL: {}", e)))?;
            let Some(bytes) = get_bytes(&self.client, provider, url).await? else {
                continue;
            };
            let mut batch = Self::decode(provider, file.base, price_scale, &bytes)?;
            records.append(&mut batch);
        }

        Ok(finalize(records, request))
    }
}
