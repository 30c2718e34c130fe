//! Header-driven CSV parsing shared by the Stooq and local dataset fetchers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};

use crate::errors::FetchError;
use crate::models::PriceRecord;

/// How a delimited table is laid out.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CsvLayout<'a> {
    pub delimiter: u8,
    /// chrono format for the date column, or for "date time" when a separate
    /// time column exists.
    pub timestamp_format: &'a str,
}

#[derive(Debug)]
struct Columns {
    date: usize,
    time: Option<usize>,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(provider: &str, headers: &StringRecord) -> Result<Self, FetchError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| {
                FetchError::malformed(provider, format!("missing '{}' column", names[0]))
            })
        };

        Ok(Self {
            date: require(&["date", "datetime", "timestamp", "gmt time"])?,
            time: find(&["time"]),
            open: require(&["open"])?,
            high: require(&["high"])?,
            low: require(&["low"])?,
            close: require(&["close", "price", "last"])?,
            volume: find(&["volume", "vol"]),
        })
    }
}

/// Parses a table with a header row into records.
///
/// Any unparsable row fails the whole payload.
pub(crate) fn parse_table(
    provider: &str,
    body: &str,
    layout: CsvLayout<'_>,
) -> Result<Vec<PriceRecord>, FetchError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(layout.delimiter)
        .has_headers(true)
        .trim(Trim::All)
        .flexible(false)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| FetchError::malformed(provider, format!("unreadable header: {}", e)))?
        .clone();
    let columns = Columns::from_headers(provider, &headers)?;

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let line = index + 2;
        let row = row.map_err(|e| FetchError::malformed(provider, format!("line {}: {}", line, e)))?;

        let field = |i: usize| row.get(i).unwrap_or("");
        let raw_timestamp = match columns.time {
            Some(t) => format!("{} {}", field(columns.date), field(t)),
            None => field(columns.date).to_string(),
        };
        let timestamp = parse_timestamp(&raw_timestamp, layout.timestamp_format).ok_or_else(|| {
            FetchError::malformed(provider, format!("line {}: bad timestamp '{}'", line, raw_timestamp))
        })?;

        let number = |i: usize, name: &str| {
            field(i).parse::<f64>().map_err(|_| {
                FetchError::malformed(provider, format!("line {}: bad {} '{}'", line, name, field(i)))
            })
        };
        let open = number(columns.open, "open")?;
        let high = number(columns.high, "high")?;
        let low = number(columns.low, "low")?;
        let close = number(columns.close, "close")?;
        let volume = match columns.volume {
            Some(v) if !field(v).is_empty() => Some(number(v, "volume")?),
            _ => None,
        };

        records.push(PriceRecord::new(timestamp, open, high, low, close, volume));
    }

    Ok(records)
}

/// Parses a naive UTC timestamp, accepting date-only formats as midnight.
pub(crate) fn parse_timestamp(value: &str, format: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let naive = NaiveDateTime::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Utc.from_local_datetime(&naive).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STOOQ_LAYOUT: CsvLayout<'static> = CsvLayout {
        delimiter: b',',
        timestamp_format: "%Y-%m-%d",
    };

    #[test]
    fn test_parse_comma_table_without_volume() {
        let body = "Date,Open,High,Low,Close\n2024-01-02,2063.1,2078.4,2058.0,2071.9\n";
        let records = parse_table("STOOQ", body, STOOQ_LAYOUT).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp().to_rfc3339(), "2024-01-02T00:00:00+00:00");
        assert_eq!(records[0].close(), 2071.9);
        assert_eq!(records[0].volume(), None);
    }

    #[test]
    fn test_parse_semicolon_table_with_time() {
        let body = "Date;Open;High;Low;Close;Volume\n2004.06.11 07:00;384;384.3;383.8;384.3;44\n";
        let layout = CsvLayout {
            delimiter: b';',
            timestamp_format: "%Y.%m.%d %H:%M",
        };
        let records = parse_table("KAGGLE", body, layout).unwrap();
        assert_eq!(records[0].timestamp().to_rfc3339(), "2004-06-11T07:00:00+00:00");
        assert_eq!(records[0].volume(), Some(44.0));
    }

    #[test]
    fn test_separate_time_column() {
        let body = "Date,Time,Open,High,Low,Close\n2024-01-02,13:00:00,1,2,0.5,1.5\n";
        let layout = CsvLayout {
            delimiter: b',',
            timestamp_format: "%Y-%m-%d %H:%M:%S",
        };
        let records = parse_table("STOOQ", body, layout).unwrap();
        assert_eq!(records[0].timestamp().to_rfc3339(), "2024-01-02T13:00:00+00:00");
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let body = "Date,Open,High,Close\n2024-01-02,1,2,1.5\n";
        let err = parse_table("STOOQ", body, STOOQ_LAYOUT).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn test_bad_number_is_malformed_not_zero() {
        let body = "Date,Open,High,Low,Close\n2024-01-02,n/a,2078.4,2058.0,2071.9\n";
        let err = parse_table("STOOQ", body, STOOQ_LAYOUT).unwrap_err();
        assert!(err.to_string().contains("bad open"));
    }

    #[test]
    fn test_ragged_row_is_malformed() {
        let body = "Date,Open,High,Low,Close\n2024-01-02,1,2\n";
        assert!(parse_table("STOOQ", body, STOOQ_LAYOUT).is_err());
    }
}
