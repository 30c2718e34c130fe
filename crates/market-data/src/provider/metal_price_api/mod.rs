//! MetalPriceAPI timeframe fetcher for precious metals.
//!
//! The timeframe endpoint returns one rate per calendar day for at most 365
//! days per call, so longer ranges are paginated. Rates are quoted as
//! "1 USD = rate troy ounces"; the price per ounce is `1 / rate`. Only a
//! single daily price is published, so candles are flat and carry no volume.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::errors::FetchError;
use crate::models::{Granularity, PriceRecord, SourceDescriptor, WireFormatKind};
use crate::provider::csv_table::parse_timestamp;
use crate::provider::http::{build_client, build_url, get_text};
use crate::provider::{finalize, FetchRequest, Fetcher};
use crate::registry::RateLimiter;

const FETCHER_ID: &str = "METAL_PRICE_TIMEFRAME";
const BASE_CURRENCY: &str = "USD";
const MAX_WINDOW_DAYS: i64 = 365;
const HTTP_TOO_MANY_REQUESTS: u16 = 429;

/// API response from the timeframe endpoint
#[derive(Debug, Deserialize)]
struct TimeframeResponse {
    success: bool,
    /// date -> currency -> rate
    #[serde(default)]
    rates: HashMap<String, HashMap<String, f64>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "statusCode")]
    status_code: Option<u16>,
    message: Option<String>,
}

/// Fetcher for [`WireFormat::MetalPriceJson`](crate::models::WireFormat::MetalPriceJson).
pub struct MetalPriceFetcher {
    client: Client,
    api_key: String,
}

impl MetalPriceFetcher {
    pub fn new(api_key: String) -> Self {
        Self {
            client: build_client(),
            api_key,
        }
    }

    /// Parse a timeframe payload for `symbol`.
    ///
    /// A `USD{symbol}` entry is a direct price; otherwise the `{symbol}` rate is
    /// inverted. Days without either entry are skipped.
    pub(crate) fn parse_timeframe(
        provider: &str,
        symbol: &str,
        body: &str,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        let response: TimeframeResponse = serde_json::from_str(body)
            .map_err(|e| FetchError::malformed(provider, format!("Failed to parse response: {}", e)))?;

        if !response.success {
            let error = response.error;
            if error.as_ref().and_then(|e| e.status_code) == Some(HTTP_TOO_MANY_REQUESTS) {
                return Err(FetchError::rate_limited(provider));
            }
            let message = error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "API request failed".to_string());
            return Err(FetchError::malformed(provider, message));
        }

        let direct_key = format!("{}{}", BASE_CURRENCY, symbol);
        let mut records = Vec::with_capacity(response.rates.len());
        for (date, rates) in response.rates {
            let price = if let Some(&price) = rates.get(&direct_key) {
                price
            } else if let Some(&rate) = rates.get(symbol) {
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(FetchError::malformed(
                        provider,
                        format!("{}: invalid rate {}", date, rate),
                    ));
                }
                1.0 / rate
            } else {
                continue;
            };

            let timestamp = parse_timestamp(&date, "%Y-%m-%d")
                .ok_or_else(|| FetchError::malformed(provider, format!("bad date '{}'", date)))?;
            records.push(PriceRecord::flat(timestamp, price));
        }

        Ok(records)
    }
}

#[async_trait]
impl Fetcher for MetalPriceFetcher {
    fn id(&self) -> &'static str {
        FETCHER_ID
    }

    fn wire_format(&self) -> WireFormatKind {
        WireFormatKind::MetalPriceJson
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        request: &FetchRequest,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        let provider = descriptor.id.as_str();
        if request.granularity != Granularity::OneDay {
            return Err(FetchError::unsupported(
                provider,
                format!("only daily rates are published, not {}", request.granularity),
            ));
        }

        let limiter = RateLimiter::new(provider, &descriptor.rate_limit);
        let endpoint = format!("{}/timeframe", descriptor.endpoint.trim_end_matches('/'));

        let mut records = Vec::new();
        for window in request.range.chunks(Duration::days(MAX_WINDOW_DAYS)) {
            limiter.acquire().await;

            let start_date = window.start.format("%Y-%m-%d").to_string();
            let end_date = window.end.format("%Y-%m-%d").to_string();
            let url = build_url(
                provider,
                &endpoint,
                &[
                    ("api_key", self.api_key.as_str()),
                    ("start_date", start_date.as_str()),
                    ("end_date", end_date.as_str()),
                    ("base", BASE_CURRENCY),
                    ("currencies", descriptor.symbol.as_str()),
                ],
            )?;

            let body = get_text(&self.client, provider, url).await?;
            let mut batch = Self::parse_timeframe(provider, &descriptor.symbol, &body)?;
            debug!("{}: {} daily rates for {} .. {}", provider, batch.len(), start_date, end_date);
            records.append(&mut batch);
        }

        Ok(finalize(records, request))
    }
}
