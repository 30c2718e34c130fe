//! CSV export of a price series.
//!
//! Layout:
//!
//! ```text
//! timestamp,open,high,low,close,volume
//! 2024-01-02 00:00:00,2063.4,2074.1,2058.9,2071.2,184220
//! 2024-01-03 00:00:00,2071.2,2072.5,2035.6,2041.8,N/A
//! ```
//!
//! Timestamps are UTC, numbers use the shortest representation that reads
//! back to the same `f64`, and lines end with `\n`.
//!
//! The header is lowercase. Files written by older tooling used
//! `Timestamp,Open,High,Low,Close,Volume`; readers that accept both should
//! compare column names case-insensitively.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use aurum_market_data::PriceRecord;
use log::info;

use crate::errors::ExportError;
use crate::series::PriceSeries;

pub const CSV_HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const MISSING_VOLUME: &str = "N/A";

fn csv_row(record: &PriceRecord) -> [String; 6] {
    [
        record.timestamp().format(TIMESTAMP_FORMAT).to_string(),
        record.open().to_string(),
        record.high().to_string(),
        record.low().to_string(),
        record.close().to_string(),
        record
            .volume()
            .map(|v| v.to_string())
            .unwrap_or_else(|| MISSING_VOLUME.to_string()),
    ]
}

/// Writes the header and one row per record, in series order.
pub fn write_csv<W: Write>(series: &PriceSeries, writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    wtr.write_record(CSV_HEADER)?;
    for record in series {
        wtr.write_record(csv_row(record))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Renders the CSV into a string.
pub fn export_csv_string(series: &PriceSeries) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_csv(series, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

/// Writes the CSV to `path`, replacing any existing file.
pub fn export_csv(series: &PriceSeries, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_csv(series, BufWriter::new(file))?;
    info!("Wrote {} records to {}", series.len(), path.display());
    Ok(())
}
