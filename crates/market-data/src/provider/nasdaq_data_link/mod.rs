//! Nasdaq Data Link (formerly Quandl) dataset fetcher.
//!
//! Datasets such as `CHRIS/CME_GC1` return a column-name list plus rows of
//! mixed JSON values. Columns are located by name; continuous futures series
//! report the settlement price in "Settle" rather than "Close".

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::FetchError;
use crate::models::{PriceRecord, SourceDescriptor, WireFormatKind};
use crate::provider::csv_table::parse_timestamp;
use crate::provider::http::{build_client, build_url, get_text};
use crate::provider::{finalize, FetchRequest, Fetcher};
use crate::registry::RateLimiter;

const FETCHER_ID: &str = "NASDAQ_DATASET";
/// Error codes in this family are speed or quota limits.
const RATE_LIMIT_CODE_PREFIX: &str = "QELx";

static NULL_CELL: Value = Value::Null;

#[derive(Debug, Deserialize)]
struct DatasetResponse {
    dataset: Option<Dataset>,
    quandl_error: Option<QuandlError>,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    column_names: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct QuandlError {
    code: String,
    message: String,
}

struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn locate(provider: &str, names: &[String]) -> Result<Self, FetchError> {
        let find = |candidates: &[&str]| {
            candidates.iter().find_map(|c| {
                names.iter().position(|n| n.eq_ignore_ascii_case(c))
            })
        };
        let require = |candidates: &[&str]| {
            find(candidates).ok_or_else(|| {
                FetchError::malformed(provider, format!("missing '{}' column", candidates[0]))
            })
        };

        Ok(Self {
            date: require(&["Date"])?,
            open: require(&["Open"])?,
            high: require(&["High"])?,
            low: require(&["Low"])?,
            close: require(&["Settle", "Close", "Last"])?,
            volume: find(&["Volume"]),
        })
    }
}

/// Fetcher for [`WireFormat::NasdaqDatasetJson`](crate::models::WireFormat::NasdaqDatasetJson).
pub struct NasdaqDatasetFetcher {
    client: Client,
    api_key: Option<String>,
}

impl NasdaqDatasetFetcher {
    /// Anonymous access works with a lower daily quota.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: build_client(),
            api_key,
        }
    }

    /// Parse a dataset payload.
    ///
    /// Rows with a null open, high, low or close are skipped (the exchange did
    /// not report them); values of any other type are malformed.
    pub(crate) fn parse_dataset(provider: &str, body: &str) -> Result<Vec<PriceRecord>, FetchError> {
        let response: DatasetResponse = serde_json::from_str(body)
            .map_err(|e| FetchError::malformed(provider, format!("Failed to parse response: {}", e)))?;

        if let Some(error) = response.quandl_error {
            if error.code.starts_with(RATE_LIMIT_CODE_PREFIX) {
                return Err(FetchError::rate_limited(provider));
            }
            return Err(FetchError::malformed(
                provider,
                format!("{}: {}", error.code, error.message),
            ));
        }

        let dataset = response
            .dataset
            .ok_or_else(|| FetchError::malformed(provider, "dataset missing"))?;
        let columns = Columns::locate(provider, &dataset.column_names)?;

        let mut records = Vec::with_capacity(dataset.data.len());
        for (index, row) in dataset.data.iter().enumerate() {
            let cell = |i: usize| row.get(i).unwrap_or(&NULL_CELL);
            let number = |i: usize, name: &str| -> Result<Option<f64>, FetchError> {
                match cell(i) {
                    Value::Null => Ok(None),
                    Value::Number(n) => Ok(n.as_f64()),
                    other => Err(FetchError::malformed(
                        provider,
                        format!("row {}: bad {} {}", index, name, other),
                    )),
                }
            };

            let date = cell(columns.date).as_str().ok_or_else(|| {
                FetchError::malformed(provider, format!("row {}: date is not a string", index))
            })?;
            let timestamp = parse_timestamp(date, "%Y-%m-%d")
                .ok_or_else(|| FetchError::malformed(provider, format!("row {}: bad date '{}'", index, date)))?;

            let (Some(open), Some(high), Some(low), Some(close)) = (
                number(columns.open, "open")?,
                number(columns.high, "high")?,
                number(columns.low, "low")?,
                number(columns.close, "close")?,
            ) else {
                continue;
            };
            let volume = match columns.volume {
                Some(v) => number(v, "volume")?,
                None => None,
            };

            records.push(PriceRecord::new(timestamp, open, high, low, close, volume));
        }

        Ok(records)
    }
}

#[async_trait]
impl Fetcher for NasdaqDatasetFetcher {
    fn id(&self) -> &'static str {
        FETCHER_ID
    }

    fn wire_format(&self) -> WireFormatKind {
        WireFormatKind::NasdaqDatasetJson
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        request: &FetchRequest,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        let provider = descriptor.id.as_str();
        let base = format!(
            "{}/{}.json",
            descriptor.endpoint.trim_end_matches('/'),
            descriptor.symbol
        );

        let start_date = request.range.start.format("%Y-%m-%d").to_string();
        let end_date = request.range.end.format("%Y-%m-%d").to_string();
        let mut params = vec![
            ("start_date", start_date.as_str()),
            ("end_date", end_date.as_str()),
            ("order", "asc"),
        ];
        if let Some(key) = self.api_key.as_deref() {
            params.push(("api_key", key));
        }
        let url = build_url(provider, &base, &params)?;

        let limiter = RateLimiter::new(provider, &descriptor.rate_limit);
        limiter.acquire().await;

        let body = get_text(&self.client, provider, url).await?;
        let records = Self::parse_dataset(provider, &body)?;
        debug!("{}: {} dataset rows", provider, records.len());

        Ok(finalize(records, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = r#"{
        "dataset": {
            "dataset_code": "CME_GC1",
            "column_names": ["Date", "Open", "High", "Low", "Last", "Change", "Settle", "Volume", "Previous Day Open Interest"],
            "data": [
                ["2024-01-02", 2072.0, 2079.1, 2056.8, 2073.4, null, 2073.4, 172000.0, 190000.0],
                ["2024-01-03", null, null, null, 2042.8, -30.6, 2042.8, 180000.0, 188000.0]
            ]
        }
    }"#;

    #[test]
    fn test_parse_dataset_uses_settle() {
        let records = NasdaqDatasetFetcher::parse_dataset("NASDAQ_DATA_LINK", DATASET).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].close(), 2073.4);
        assert_eq!(records[0].volume(), Some(172000.0));
        assert_eq!(records[0].timestamp().to_rfc3339(), "2024-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_speed_limit_error() {
        let body = r#"{"quandl_error": {"code": "QELx01", "message": "You have exceeded the API speed limit"}}"#;
        assert_eq!(
            NasdaqDatasetFetcher::parse_dataset("NASDAQ_DATA_LINK", body),
            Err(FetchError::rate_limited("NASDAQ_DATA_LINK"))
        );
    }

    #[test]
    fn test_unknown_dataset_error() {
        let body = r#"{"quandl_error": {"code": "QECx02", "message": "You have submitted an incorrect Quandl code."}}"#;
        let err = NasdaqDatasetFetcher::parse_dataset("NASDAQ_DATA_LINK", body).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn test_string_price_is_malformed() {
        let body = r#"{"dataset": {"column_names": ["Date", "Open", "High", "Low", "Close"],
            "data": [["2024-01-02", "2072.0", 2079.1, 2056.8, 2073.4]]}}"#;
        let err = NasdaqDatasetFetcher::parse_dataset("NASDAQ_DATA_LINK", body).unwrap_err();
        assert!(err.to_string().contains("bad open"));
    }

    #[test]
    fn test_missing_close_column() {
        let body = r#"{"dataset": {"column_names": ["Date", "Open", "High", "Low"], "data": []}}"#;
        assert!(NasdaqDatasetFetcher::parse_dataset("NASDAQ_DATA_LINK", body).is_err());
    }
}
