//! Stooq CSV download fetcher.
//!
//! `https://stooq.com/q/d/l/?s=xauusd&i=d&d1=YYYYMMDD&d2=YYYYMMDD` returns a
//! header row `Date,Open,High,Low,Close[,Volume]` followed by one line per
//! day. Stooq answers with plain-text notices instead of HTTP errors when
//! there is nothing to return or the daily quota is spent.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;

use crate::errors::FetchError;
use crate::models::{Granularity, PriceRecord, SourceDescriptor, WireFormatKind};
use crate::provider::csv_table::{parse_table, CsvLayout};
use crate::provider::http::{build_client, build_url, get_text};
use crate::provider::{finalize, FetchRequest, Fetcher};
use crate::registry::RateLimiter;

const FETCHER_ID: &str = "STOOQ_CSV";

const LAYOUT: CsvLayout<'static> = CsvLayout {
    delimiter: b',',
    timestamp_format: "%Y-%m-%d",
};

/// Fetcher for [`WireFormat::StooqCsv`](crate::models::WireFormat::StooqCsv).
pub struct StooqFetcher {
    client: Client,
}

impl StooqFetcher {
    pub fn new() -> Self {
        Self {
            client: build_client(),
        }
    }

    fn interval(granularity: Granularity) -> Option<&'static str> {
        match granularity {
            Granularity::OneDay => Some("d"),
            _ => None,
        }
    }

    pub(crate) fn parse_body(provider: &str, body: &str) -> Result<Vec<PriceRecord>, FetchError> {
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("no data") {
            return Ok(Vec::new());
        }
        if trimmed.to_ascii_lowercase().contains("exceeded the daily hits limit") {
            return Err(FetchError::rate_limited(provider));
        }
        parse_table(provider, trimmed, LAYOUT)
    }
}

impl Default for StooqFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for StooqFetcher {
    fn id(&self) -> &'static str {
        FETCHER_ID
    }

    fn wire_format(&self) -> WireFormatKind {
        WireFormatKind::StooqCsv
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        request: &FetchRequest,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        let provider = descriptor.id.as_str();
        let interval = Self::interval(request.granularity).ok_or_else(|| {
            FetchError::unsupported(provider, format!("no {} download", request.granularity))
        })?;

        let d1 = request.range.start.format("%Y%m%d").to_string();
        let d2 = request.range.end.format("%Y%m%d").to_string();
        let url = build_url(
            provider,
            &descriptor.endpoint,
            &[
                ("s", descriptor.symbol.as_str()),
                ("i", interval),
                ("d1", d1.as_str()),
                ("d2", d2.as_str()),
            ],
        )?;

        let limiter = RateLimiter::new(provider, &descriptor.rate_limit);
        limiter.acquire().await;

        let body = get_text(&self.client, provider, url).await?;
        let records = Self::parse_body(provider, &body)?;
        debug!("{}: {} rows", provider, records.len());

        Ok(finalize(records, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_daily_download() {
        let body = "Date,Open,High,Low,Close\r\n2024-01-02,2062.98,2078.61,2058.1,2060.0\r\n2024-01-03,2060.0,2064.5,2030.4,2041.9\r\n";
        let records = StooqFetcher::parse_body("STOOQ", body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].low(), 2030.4);
    }

    #[test]
    fn test_no_data_is_empty() {
        assert!(StooqFetcher::parse_body("STOOQ", "No data").unwrap().is_empty());
    }

    #[test]
    fn test_hits_limit_is_rate_limited() {
        assert_eq!(
            StooqFetcher::parse_body("STOOQ", "Exceeded the daily hits limit"),
            Err(FetchError::rate_limited("STOOQ"))
        );
    }

    #[test]
    fn test_html_is_malformed() {
        let err = StooqFetcher::parse_body("STOOQ", "<html><body>maintenance</body></html>").unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn test_only_daily_interval() {
        assert_eq!(StooqFetcher::interval(Granularity::OneDay), Some("d"));
        assert_eq!(StooqFetcher::interval(Granularity::OneHour), None);
    }
}
