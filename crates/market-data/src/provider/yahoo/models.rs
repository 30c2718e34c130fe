//! Yahoo Finance chart API response models.
//!
//! The v8 chart endpoint returns parallel arrays: one timestamp array and one
//! array per OHLCV field, aligned by index. Yahoo fills halted or empty
//! periods with `null`, so every value is optional.

use serde::Deserialize;

/// Main response wrapper for the chart API
#[derive(Debug, Deserialize)]
pub struct YahooChartResponse {
    pub chart: YahooChart,
}

#[derive(Debug, Deserialize)]
pub struct YahooChart {
    pub result: Option<Vec<YahooChartResult>>,
    pub error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
pub struct YahooChartError {
    pub code: String,
    pub description: Option<String>,
}

/// One instrument's series
#[derive(Debug, Deserialize)]
pub struct YahooChartResult {
    // Absent when the window holds no trading periods
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
pub struct YahooIndicators {
    #[serde(default)]
    pub quote: Vec<YahooQuoteArrays>,
}

#[derive(Debug, Default, Deserialize)]
pub struct YahooQuoteArrays {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}
