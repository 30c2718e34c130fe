//! Alpha Vantage FX time series fetcher.
//!
//! Uses `FX_INTRADAY` (15min / 60min) and `FX_DAILY` with `outputsize=full`,
//! quoting the descriptor's symbol against USD. The API returns the whole
//! series in one payload; records outside the request window are dropped.
//!
//! Note: Alpha Vantage free tier is limited to 5 API calls per minute.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::errors::FetchError;
use crate::models::{Granularity, PriceRecord, SourceDescriptor, WireFormatKind};
use crate::provider::csv_table::parse_timestamp;
use crate::provider::http::{build_client, build_url, get_text};
use crate::provider::{finalize, FetchRequest, Fetcher};
use crate::registry::RateLimiter;

const FETCHER_ID: &str = "ALPHA_VANTAGE_FX";
const QUOTE_CURRENCY: &str = "USD";

/// Fetcher for [`WireFormat::AlphaVantageJson`](crate::models::WireFormat::AlphaVantageJson).
pub struct AlphaVantageFetcher {
    client: Client,
    api_key: String,
}

// ============================================================================
// Response structures for Alpha Vantage API
// ============================================================================

/// FX_INTRADAY / FX_DAILY response. The series key depends on the interval,
/// e.g. "Time Series FX (60min)", so it is captured through `flatten`.
#[derive(Debug, Deserialize)]
struct FxSeriesResponse {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(flatten)]
    sections: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FxCandle {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: Option<String>,
}

// ============================================================================
// AlphaVantageFetcher implementation
// ============================================================================

impl AlphaVantageFetcher {
    pub fn new(api_key: String) -> Self {
        Self {
            client: build_client(),
            api_key,
        }
    }

    /// API function and, for intraday series, its interval parameter.
    fn function_params(granularity: Granularity) -> (&'static str, Option<&'static str>) {
        match granularity {
            Granularity::OneMinute => ("FX_INTRADAY", Some("1min")),
            Granularity::FiveMinutes => ("FX_INTRADAY", Some("5min")),
            Granularity::FifteenMinutes => ("FX_INTRADAY", Some("15min")),
            Granularity::ThirtyMinutes => ("FX_INTRADAY", Some("30min")),
            Granularity::OneHour => ("FX_INTRADAY", Some("60min")),
            Granularity::OneDay => ("FX_DAILY", None),
        }
    }

    /// Check for API-level errors in the response.
    fn check_api_error(provider: &str, response: &FxSeriesResponse) -> Result<(), FetchError> {
        if let Some(ref msg) = response.error_message {
            return Err(FetchError::malformed(provider, msg.clone()));
        }

        // "Note" and "Information" usually indicate rate limiting
        for msg in [&response.note, &response.information].into_iter().flatten() {
            if msg.contains("API call frequency") || msg.contains("rate limit") {
                return Err(FetchError::rate_limited(provider));
            }
            warn!("Alpha Vantage notice for {}: {}", provider, msg);
        }

        Ok(())
    }

    fn parse_number(provider: &str, key: &str, field: &str, value: &str) -> Result<f64, FetchError> {
        value.trim().parse::<f64>().map_err(|_| {
            FetchError::malformed(provider, format!("{}: bad {} '{}'", key, field, value))
        })
    }

    fn parse_key(provider: &str, key: &str) -> Result<DateTime<Utc>, FetchError> {
        parse_timestamp(key, "%Y-%m-%d %H:%M:%S")
            .or_else(|| parse_timestamp(key, "%Y-%m-%d"))
            .ok_or_else(|| FetchError::malformed(provider, format!("bad timestamp '{}'", key)))
    }

    /// Parse an FX series payload into records (unordered).
    pub(crate) fn parse_series(provider: &str, body: &str) -> Result<Vec<PriceRecord>, FetchError> {
        let response: FxSeriesResponse = serde_json::from_str(body)
            .map_err(|e| FetchError::malformed(provider, format!("Failed to parse response: {}", e)))?;

        Self::check_api_error(provider, &response)?;

        let series = response
            .sections
            .into_iter()
            .find(|(key, _)| key.starts_with("Time Series"))
            .map(|(_, value)| value)
            .ok_or_else(|| FetchError::malformed(provider, "time series section missing"))?;

        let candles: HashMap<String, FxCandle> = serde_json::from_value(series)
            .map_err(|e| FetchError::malformed(provider, format!("bad time series entry: {}", e)))?;

        candles
            .into_iter()
            .map(|(key, candle)| {
                let timestamp = Self::parse_key(provider, &key)?;
                let volume = match candle.volume.as_deref() {
                    Some(v) => Some(Self::parse_number(provider, &key, "volume", v)?),
                    None => None,
                };
                Ok(PriceRecord::new(
                    timestamp,
                    Self::parse_number(provider, &key, "open", &candle.open)?,
                    Self::parse_number(provider, &key, "high", &candle.high)?,
                    Self::parse_number(provider, &key, "low", &candle.low)?,
                    Self::parse_number(provider, &key, "close", &candle.close)?,
                    volume,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl Fetcher for AlphaVantageFetcher {
    fn id(&self) -> &'static str {
        FETCHER_ID
    }

    fn wire_format(&self) -> WireFormatKind {
        WireFormatKind::AlphaVantageJson
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        request: &FetchRequest,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        let provider = descriptor.id.as_str();
        let (function, interval) = Self::function_params(request.granularity);

        let mut params = vec![
            ("function", function),
            ("from_symbol", descriptor.symbol.as_str()),
            ("to_symbol", QUOTE_CURRENCY),
            ("outputsize", "full"),
        ];
        if let Some(interval) = interval {
            params.push(("interval", interval));
        }
        params.push(("apikey", self.api_key.as_str()));

        let url = build_url(provider, &descriptor.endpoint, &params)?;

        let limiter = RateLimiter::new(provider, &descriptor.rate_limit);
        limiter.acquire().await;

        let body = get_text(&self.client, provider, url).await?;
        let records = Self::parse_series(provider, &body)?;
        debug!("{}: {} candles before range filter", provider, records.len());

        Ok(finalize(records, request))
    }
}
