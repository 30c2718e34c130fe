//! Local delimited dataset fetcher (`file://` endpoints).
//!
//! Reads a dump such as the Kaggle XAU/USD hourly dataset
//! (`Date;Open;High;Low;Close;Volume`, dates like `2004.06.11 07:00`). The
//! delimiter and timestamp format come from the descriptor's wire format.

use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;

use crate::errors::FetchError;
use crate::models::{PriceRecord, SourceDescriptor, WireFormat, WireFormatKind};
use crate::provider::csv_table::{parse_table, CsvLayout};
use crate::provider::{finalize, FetchRequest, Fetcher, RetryPolicy};

const FETCHER_ID: &str = "CSV_FILE";
const FILE_SCHEME: &str = "file://";

/// Fetcher for [`WireFormat::CsvFile`].
#[derive(Default)]
pub struct CsvFileFetcher;

impl CsvFileFetcher {
    pub fn new() -> Self {
        Self
    }

    fn path(endpoint: &str) -> PathBuf {
        PathBuf::from(endpoint.strip_prefix(FILE_SCHEME).unwrap_or(endpoint))
    }
}

#[async_trait]
impl Fetcher for CsvFileFetcher {
    fn id(&self) -> &'static str {
        FETCHER_ID
    }

    fn wire_format(&self) -> WireFormatKind {
        WireFormatKind::CsvFile
    }

    /// A missing file stays missing.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        request: &FetchRequest,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        let provider = descriptor.id.as_str();
        let WireFormat::CsvFile {
            delimiter,
            timestamp_format,
        } = &descriptor.wire_format
        else {
            return Err(FetchError::unsupported(provider, "descriptor is not a CSV file source"));
        };

        let path = Self::path(&descriptor.endpoint);
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| FetchError::network(provider, format!("{}: {}", path.display(), e)))?;

        let layout = CsvLayout {
            delimiter: *delimiter,
            timestamp_format: timestamp_format.as_str(),
        };
        let records = parse_table(provider, &body, layout)?;
        debug!("{}: {} rows read from {}", provider, records.len(), path.display());

        Ok(finalize(records, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, Granularity, RateLimit};
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    fn descriptor(endpoint: String) -> SourceDescriptor {
        SourceDescriptor {
            id: "KAGGLE".to_string(),
            name: "Kaggle".to_string(),
            symbol: "XAUUSD".to_string(),
            granularities: vec![Granularity::OneHour],
            years_of_history: 21,
            nominal_quality: 0.97,
            rate_limit: RateLimit::per_minute(1000),
            endpoint,
            wire_format: WireFormat::CsvFile {
                delimiter: b';',
                timestamp_format: "%Y.%m.%d %H:%M".to_string(),
            },
        }
    }

    fn request() -> FetchRequest {
        FetchRequest {
            range: DateRange::new(
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 2, 23, 0, 0).unwrap(),
            ),
            granularity: Granularity::OneHour,
        }
    }

    #[test]
    fn test_path_strips_scheme() {
        assert_eq!(CsvFileFetcher::path("file:///data/x.csv"), PathBuf::from("/data/x.csv"));
        assert_eq!(CsvFileFetcher::path("data/x.csv"), PathBuf::from("data/x.csv"));
    }

    #[tokio::test]
    async fn test_reads_and_filters_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Date;Open;High;Low;Close;Volume").unwrap();
        writeln!(file, "2024.01.01 23:00;2062.0;2063.0;2061.0;2062.5;10").unwrap();
        writeln!(file, "2024.01.02 01:00;2063.0;2065.0;2062.0;2064.0;12").unwrap();
        writeln!(file, "2024.01.02 00:00;2062.5;2064.0;2062.0;2063.0;11").unwrap();

        let endpoint = format!("file://{}", file.path().display());
        let records = CsvFileFetcher::new()
            .fetch(&descriptor(endpoint), &request())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp().to_rfc3339(), "2024-01-02T00:00:00+00:00");
        assert_eq!(records[1].close(), 2064.0);
    }

    #[tokio::test]
    async fn test_missing_file_is_network_error() {
        let result = CsvFileFetcher::new()
            .fetch(&descriptor("file:///nonexistent/xau.csv".to_string()), &request())
            .await;
        assert!(matches!(result, Err(FetchError::Network { .. })));
    }
}
