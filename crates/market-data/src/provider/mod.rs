//! Source fetcher abstractions and implementations.
//!
//! This module contains:
//! - The [`Fetcher`] trait every wire format implements
//! - Per-fetcher retry policy ([`RetryPolicy`], [`fetch_with_retry`])
//! - [`FetcherSet`], which maps a descriptor's wire format to its fetcher
//! - Concrete fetchers (Yahoo, Alpha Vantage, Dukascopy, etc.)
//!
//! # Architecture
//!
//! The fetcher system is designed to be:
//! - **Format-driven**: a descriptor's [`WireFormat`](crate::models::WireFormat) picks the fetcher
//! - **Stateless**: pacing state lives inside one `fetch` call, so one fetcher serves many jobs
//! - **Strict**: payloads that don't match their contract become
//!   [`FetchError::MalformedResponse`](crate::errors::FetchError::MalformedResponse)

mod csv_table;
mod http;
mod retry;
mod traits;

pub mod alpha_vantage;
pub mod csv_file;
pub mod dukascopy;
pub mod metal_price_api;
pub mod nasdaq_data_link;
pub mod stooq;
pub mod synthetic;
pub mod yahoo;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::models::{Granularity, PriceRecord, WireFormatKind};

pub use retry::{fetch_with_retry, RetryPolicy};
pub use traits::{FetchRequest, Fetcher};

use alpha_vantage::AlphaVantageFetcher;
use csv_file::CsvFileFetcher;
use dukascopy::DukascopyFetcher;
use metal_price_api::MetalPriceFetcher;
use nasdaq_data_link::NasdaqDatasetFetcher;
use stooq::StooqFetcher;
use synthetic::SyntheticFetcher;
use yahoo::YahooChartFetcher;

/// Free-tier key Alpha Vantage accepts for evaluation.
pub const ALPHA_VANTAGE_DEMO_KEY: &str = "demo";

/// Vendor API keys for the REST fetchers.
#[derive(Clone, Debug, Default)]
pub struct ApiKeys {
    pub alpha_vantage: Option<String>,
    pub metal_price_api: Option<String>,
    pub nasdaq_data_link: Option<String>,
}

/// Fetchers keyed by the wire format they understand.
#[derive(Clone, Default)]
pub struct FetcherSet {
    fetchers: HashMap<WireFormatKind, Arc<dyn Fetcher>>,
}

impl FetcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every network and file fetcher, plus the synthetic one.
    ///
    /// MetalPriceAPI has no anonymous tier and is only registered when a key
    /// is configured.
    pub fn live(keys: &ApiKeys) -> Self {
        let alpha_vantage_key = keys
            .alpha_vantage
            .clone()
            .unwrap_or_else(|| ALPHA_VANTAGE_DEMO_KEY.to_string());

        let mut set = Self::new()
            .with(Arc::new(YahooChartFetcher::new()))
            .with(Arc::new(AlphaVantageFetcher::new(alpha_vantage_key)))
            .with(Arc::new(NasdaqDatasetFetcher::new(keys.nasdaq_data_link.clone())))
            .with(Arc::new(StooqFetcher::new()))
            .with(Arc::new(CsvFileFetcher::new()))
            .with(Arc::new(DukascopyFetcher::new()))
            .with(Arc::new(SyntheticFetcher::new()));

        if let Some(key) = keys.metal_price_api.clone() {
            set.register(Arc::new(MetalPriceFetcher::new(key)));
        }
        set
    }

    pub fn with(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.register(fetcher);
        self
    }

    /// Adds a fetcher, replacing any previous one for the same format.
    pub fn register(&mut self, fetcher: Arc<dyn Fetcher>) {
        self.fetchers.insert(fetcher.wire_format(), fetcher);
    }

    pub fn get(&self, kind: WireFormatKind) -> Option<Arc<dyn Fetcher>> {
        self.fetchers.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

/// Snaps timestamps to the request's granularity grid, drops records
/// outside the window and sorts ascending.
///
/// Daily candles from different vendors are stamped at different times of
/// day; after snapping they all sit at 00:00 UTC and can be merged.
pub(crate) fn finalize(records: Vec<PriceRecord>, request: &FetchRequest) -> Vec<PriceRecord> {
    let mut records: Vec<PriceRecord> = records
        .into_iter()
        .filter_map(|record| {
            let aligned = align_down(record.timestamp(), request.granularity)?;
            Some(record.with_timestamp(aligned))
        })
        .filter(|record| request.range.contains(record.timestamp()))
        .collect();
    records.sort_by_key(|r| r.timestamp());
    records
}

fn align_down(timestamp: DateTime<Utc>, granularity: Granularity) -> Option<DateTime<Utc>> {
    let seconds = timestamp.timestamp();
    let aligned = seconds - seconds.rem_euclid(granularity.as_seconds());
    Utc.timestamp_opt(aligned, 0).single()
}
