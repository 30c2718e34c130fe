//! Yahoo Finance chart fetcher.
//!
//! Reads the v8 chart endpoint (`GC=F` for COMEX gold futures). Intraday
//! history is requested in windows of at most 180 days because Yahoo rejects
//! longer intraday spans.
//!
//! Intraday bars only exist for a trailing window counted back from now (about
//! 730 days for 1h, 60 days for 5m to 30m, 30 days for 1m). Older windows are
//! answered with HTTP 422, so requests are clamped to that depth first.

mod models;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::debug;
use reqwest::Client;

use crate::errors::FetchError;
use crate::models::{DateRange, Granularity, PriceRecord, SourceDescriptor, WireFormatKind};
use crate::provider::http::{build_client, build_url, get_text};
use crate::provider::{finalize, FetchRequest, Fetcher};
use crate::registry::RateLimiter;

use models::{YahooChartResponse, YahooQuoteArrays};

const FETCHER_ID: &str = "YAHOO_CHART";
const INTRADAY_WINDOW_DAYS: i64 = 180;
/// One-minute bars are served at most 7 days per request.
const MINUTE_WINDOW_DAYS: i64 = 7;

/// Fetcher for [`WireFormat::YahooChartJson`](crate::models::WireFormat::YahooChartJson).
pub struct YahooChartFetcher {
    client: Client,
}

impl YahooChartFetcher {
    pub fn new() -> Self {
        Self {
            client: build_client(),
        }
    }

    fn interval(granularity: Granularity) -> &'static str {
        match granularity {
            Granularity::OneMinute => "1m",
            Granularity::FiveMinutes => "5m",
            Granularity::FifteenMinutes => "15m",
            Granularity::ThirtyMinutes => "30m",
            Granularity::OneHour => "1h",
            Granularity::OneDay => "1d",
        }
    }

    /// How far back from now Yahoo serves bars at `granularity`. `None` for daily.
    fn intraday_depth(granularity: Granularity) -> Option<Duration> {
        match granularity {
            Granularity::OneMinute => Some(Duration::days(29)),
            Granularity::FiveMinutes | Granularity::FifteenMinutes | Granularity::ThirtyMinutes => {
                Some(Duration::days(59))
            }
            Granularity::OneHour => Some(Duration::days(729)),
            Granularity::OneDay => None,
        }
    }

    /// Request windows for `request`, clamped to the intraday depth as of `now`.
    ///
    /// Fails with [`FetchError::UnsupportedRange`] when the whole request is
    /// older than the depth.
    pub(crate) fn plan_windows(
        provider: &str,
        request: &FetchRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<DateRange>, FetchError> {
        let Some(depth) = Self::intraday_depth(request.granularity) else {
            return Ok(vec![request.range]);
        };

        let earliest = now - depth;
        let range = request.range.clamp_start(earliest).ok_or_else(|| {
            FetchError::unsupported(
                provider,
                format!(
                    "{} bars are only served after {}",
                    request.granularity, earliest
                ),
            )
        })?;
        if range.start > request.range.start {
            debug!(
                "{}: {} history clamped to {} .. {}",
                provider, request.granularity, range.start, range.end
            );
        }

        let span = if request.granularity == Granularity::OneMinute {
            MINUTE_WINDOW_DAYS
        } else {
            INTRADAY_WINDOW_DAYS
        };
        Ok(range.chunks(Duration::days(span)))
    }

    /// Parse one chart payload.
    ///
    /// Rows with a null open, high, low or close are skipped; arrays of
    /// different length are a malformed payload.
    pub(crate) fn parse_chart(provider: &str, body: &str) -> Result<Vec<PriceRecord>, FetchError> {
        let response: YahooChartResponse = serde_json::from_str(body)
            .map_err(|e| FetchError::malformed(provider, format!("Failed to parse response: {}", e)))?;

        if let Some(error) = response.chart.error {
            if error.code.contains("Too Many") {
                return Err(FetchError::rate_limited(provider));
            }
            return Err(FetchError::malformed(
                provider,
                format!("{}: {}", error.code, error.description.unwrap_or_default()),
            ));
        }

        let result = response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| FetchError::malformed(provider, "chart result missing"))?;

        if result.timestamp.is_empty() {
            return Ok(Vec::new());
        }

        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::malformed(provider, "quote indicators missing"))?;
        check_lengths(provider, result.timestamp.len(), &quote)?;

        let mut records = Vec::with_capacity(result.timestamp.len());
        for (i, &seconds) in result.timestamp.iter().enumerate() {
            let (Some(open), Some(high), Some(low), Some(close)) =
                (quote.open[i], quote.high[i], quote.low[i], quote.close[i])
            else {
                continue;
            };
            let timestamp = Utc
                .timestamp_opt(seconds, 0)
                .single()
                .ok_or_else(|| FetchError::malformed(provider, format!("bad timestamp {}", seconds)))?;
            let volume = quote.volume.get(i).copied().flatten();

            records.push(PriceRecord::new(timestamp, open, high, low, close, volume));
        }

        Ok(records)
    }
}

impl Default for YahooChartFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn check_lengths(provider: &str, expected: usize, quote: &YahooQuoteArrays) -> Result<(), FetchError> {
    let lengths = [
        ("open", quote.open.len()),
        ("high", quote.high.len()),
        ("low", quote.low.len()),
        ("close", quote.close.len()),
    ];
    for (name, len) in lengths {
        if len != expected {
            return Err(FetchError::malformed(
                provider,
                format!("{} has {} values for {} timestamps", name, len, expected),
            ));
        }
    }
    if !quote.volume.is_empty() && quote.volume.len() != expected {
        return Err(FetchError::malformed(
            provider,
            format!("volume has {} values for {} timestamps", quote.volume.len(), expected),
        ));
    }
    Ok(())
}

#[async_trait]
impl Fetcher for YahooChartFetcher {
    fn id(&self) -> &'static str {
        FETCHER_ID
    }

    fn wire_format(&self) -> WireFormatKind {
        WireFormatKind::YahooChartJson
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        request: &FetchRequest,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        let provider = descriptor.id.as_str();
        let limiter = RateLimiter::new(provider, &descriptor.rate_limit);
        let base = format!("{}/{}", descriptor.endpoint.trim_end_matches('/'), descriptor.symbol);

        let windows = Self::plan_windows(provider, request, Utc::now())?;

        let mut records = Vec::new();
        for window in windows {
            limiter.acquire().await;

            let period1 = window.start.timestamp().to_string();
            let period2 = window.end.timestamp().to_string();
            let url = build_url(
                provider,
                &base,
                &[
                    ("period1", period1.as_str()),
                    ("period2", period2.as_str()),
                    ("interval", Self::interval(request.granularity)),
                    ("includePrePost", "false"),
                    ("events", "history"),
                ],
            )?;

            let body = get_text(&self.client, provider, url).await?;
            let mut batch = Self::parse_chart(provider, &body)?;
            debug!(
                "{}: {} candles for {} .. {}",
                provider,
                batch.len(),
                window.start,
                window.end
            );
            records.append(&mut batch);
        }

        Ok(finalize(records, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "GC=F"},
                "timestamp": [1704200400, 1704204000, 1704207600],
                "indicators": {"quote": [{
                    "open":   [2063.1, null, 2066.0],
                    "high":   [2065.0, null, 2070.2],
                    "low":    [2060.4, null, 2064.9],
                    "close":  [2064.2, null, 2069.8],
                    "volume": [1200, null, 0]
                }]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_skips_null_rows() {
        let records = YahooChartFetcher::parse_chart("YAHOO", CHART).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp().timestamp(), 1704200400);
        assert_eq!(records[0].volume(), Some(1200.0));
        assert_eq!(records[1].close(), 2069.8);
    }

    #[test]
    fn test_parse_chart_length_mismatch() {
        let body = r#"{"chart":{"result":[{"timestamp":[1,2],"indicators":{"quote":[{
            "open":[1.0],"high":[1.0,1.0],"low":[1.0,1.0],"close":[1.0,1.0]}]}}],"error":null}}"#;
        let err = YahooChartFetcher::parse_chart("YAHOO", body).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn test_parse_chart_error_object() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let err = YahooChartFetcher::parse_chart("YAHOO", body).unwrap_err();
        assert_eq!(
            err,
            FetchError::malformed("YAHOO", "Not Found: No data found")
        );
    }

    #[test]
    fn test_parse_chart_empty_window() {
        let body = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(YahooChartFetcher::parse_chart("YAHOO", body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_chart_garbage() {
        assert!(YahooChartFetcher::parse_chart("YAHOO", "<html>").is_err());
    }

    fn request(granularity: Granularity, start: DateTime<Utc>, end: DateTime<Utc>) -> FetchRequest {
        FetchRequest {
            range: DateRange::new(start, end),
            granularity,
        }
    }

    #[test]
    fn test_plan_clamps_hourly_to_trailing_depth() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let twenty_years = request(Granularity::OneHour, now - Duration::days(20 * 365), now);

        let windows = YahooChartFetcher::plan_windows("YAHOO", &twenty_years, now).unwrap();
        assert_eq!(windows.first().unwrap().start, now - Duration::days(729));
        assert_eq!(windows.last().unwrap().end, now);
        assert_eq!(windows.len(), 5);
        assert!(windows.iter().all(|w| w.duration() <= Duration::days(180)));
    }

    #[test]
    fn test_plan_daily_is_one_window() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let daily = request(Granularity::OneDay, now - Duration::days(20 * 365), now);
        let windows = YahooChartFetcher::plan_windows("YAHOO", &daily, now).unwrap();
        assert_eq!(windows, vec![daily.range]);
    }

    #[test]
    fn test_plan_minute_bars_use_short_windows() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let minutes = request(Granularity::OneMinute, now - Duration::days(365), now);
        let windows = YahooChartFetcher::plan_windows("YAHOO", &minutes, now).unwrap();
        assert_eq!(windows.first().unwrap().start, now - Duration::days(29));
        assert!(windows.iter().all(|w| w.duration() <= Duration::days(7)));
    }

    #[test]
    fn test_plan_rejects_request_older_than_depth() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let old = request(
            Granularity::OneHour,
            now - Duration::days(3_000),
            now - Duration::days(1_000),
        );
        let err = YahooChartFetcher::plan_windows("YAHOO", &old, now).unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedRange { .. }));
    }

    #[test]
    fn test_fetcher_identity() {
        let fetcher = YahooChartFetcher::new();
        assert_eq!(fetcher.id(), "YAHOO_CHART");
        assert_eq!(fetcher.wire_format(), WireFormatKind::YahooChartJson);
        assert_eq!(YahooChartFetcher::interval(Granularity::OneHour), "1h");
    }
}
