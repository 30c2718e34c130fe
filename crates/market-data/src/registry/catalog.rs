//! Source descriptor registry.
//!
//! The registry is pure data: an ordered list of [`SourceDescriptor`]s shared
//! read-only (`Arc`) by every acquisition job. [`SourceRegistry::gold`] is the
//! built-in catalog for spot gold / gold futures.

use std::sync::Arc;

use crate::models::{Granularity, RateLimit, SourceDescriptor, WireFormat};

pub const YAHOO: &str = "YAHOO";
pub const ALPHA_VANTAGE: &str = "ALPHA_VANTAGE";
pub const DUKASCOPY: &str = "DUKASCOPY";
pub const KAGGLE: &str = "KAGGLE";
pub const STOOQ: &str = "STOOQ";
pub const METAL_PRICE_API: &str = "METAL_PRICE_API";
pub const NASDAQ_DATA_LINK: &str = "NASDAQ_DATA_LINK";
pub const SYNTHETIC: &str = "SYNTHETIC";

/// Instruments with a built-in catalog.
const GOLD_ALIASES: &[&str] = &["XAUUSD", "XAU", "GOLD", "GC"];

/// Ordered, immutable set of sources to acquire from.
#[derive(Clone, Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<SourceDescriptor>>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceDescriptor>) -> Self {
        Self {
            sources: sources.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in catalog for an instrument identifier, if one exists.
    pub fn for_instrument(instrument: &str) -> Option<Self> {
        let normalized = instrument.trim().to_ascii_uppercase();
        if GOLD_ALIASES.contains(&normalized.as_str()) {
            Some(Self::gold())
        } else {
            None
        }
    }

    /// Historical gold sources, most trusted first.
    pub fn gold() -> Self {
        Self::new(vec![
            SourceDescriptor {
                id: DUKASCOPY.to_string(),
                name: "Dukascopy Historical Data".to_string(),
                symbol: "XAUUSD".to_string(),
                granularities: vec![Granularity::OneMinute, Granularity::OneHour, Granularity::OneDay],
                years_of_history: 15,
                nominal_quality: 0.99,
                rate_limit: RateLimit::per_minute(100).with_burst(5),
                endpoint: "https://datafeed.dukascopy.com/datafeed".to_string(),
                wire_format: WireFormat::DukascopyCandles { price_scale: 1_000 },
            },
            SourceDescriptor {
                id: ALPHA_VANTAGE.to_string(),
                name: "Alpha Vantage".to_string(),
                symbol: "XAU".to_string(),
                granularities: vec![
                    Granularity::FifteenMinutes,
                    Granularity::OneHour,
                    Granularity::OneDay,
                ],
                years_of_history: 20,
                nominal_quality: 0.98,
                rate_limit: RateLimit::per_minute(5),
                endpoint: "https://www.alphavantage.co/query".to_string(),
                wire_format: WireFormat::AlphaVantageJson,
            },
            SourceDescriptor {
                id: KAGGLE.to_string(),
                name: "Kaggle XAU/USD Dataset".to_string(),
                symbol: "XAUUSD".to_string(),
                granularities: vec![Granularity::OneHour],
                years_of_history: 21,
                nominal_quality: 0.97,
                rate_limit: RateLimit::per_minute(1_000).with_burst(10),
                endpoint: "file://data/kaggle/XAU_1h_data.csv".to_string(),
                wire_format: WireFormat::CsvFile {
                    delimiter: b';',
                    timestamp_format: "%Y.%m.%d %H:%M".to_string(),
                },
            },
            SourceDescriptor {
                id: NASDAQ_DATA_LINK.to_string(),
                name: "Nasdaq Data Link (Quandl)".to_string(),
                symbol: "CHRIS/CME_GC1".to_string(),
                granularities: vec![Granularity::OneDay],
                years_of_history: 30,
                nominal_quality: 0.96,
                rate_limit: RateLimit::per_minute(300),
                endpoint: "https://data.nasdaq.com/api/v3/datasets".to_string(),
                wire_format: WireFormat::NasdaqDatasetJson,
            },
            SourceDescriptor {
                id: YAHOO.to_string(),
                name: "Yahoo Finance".to_string(),
                symbol: "GC=F".to_string(),
                granularities: vec![Granularity::OneHour, Granularity::OneDay],
                years_of_history: 25,
                nominal_quality: 0.95,
                rate_limit: RateLimit::per_hour(2_000).with_burst(5),
                endpoint: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
                wire_format: WireFormat::YahooChartJson,
            },
            SourceDescriptor {
                id: METAL_PRICE_API.to_string(),
                name: "MetalPriceAPI".to_string(),
                symbol: "XAU".to_string(),
                granularities: vec![Granularity::OneDay],
                years_of_history: 15,
                nominal_quality: 0.94,
                rate_limit: RateLimit::per_minute(100),
                endpoint: "https://api.metalpriceapi.com/v1".to_string(),
                wire_format: WireFormat::MetalPriceJson,
            },
            SourceDescriptor {
                id: STOOQ.to_string(),
                name: "Stooq".to_string(),
                symbol: "xauusd".to_string(),
                granularities: vec![Granularity::OneDay],
                years_of_history: 20,
                nominal_quality: 0.92,
                rate_limit: RateLimit::per_hour(500),
                endpoint: "https://stooq.com/q/d/l/".to_string(),
                wire_format: WireFormat::StooqCsv,
            },
        ])
    }

    /// A single seeded random-walk source. Demo runs and tests only.
    pub fn synthetic(seed: u64) -> Self {
        Self::new(vec![SourceDescriptor {
            id: SYNTHETIC.to_string(),
            name: "Synthetic random walk".to_string(),
            symbol: "XAUUSD".to_string(),
            granularities: Granularity::ALL.to_vec(),
            years_of_history: 30,
            nominal_quality: 0.5,
            rate_limit: RateLimit::per_minute(10_000),
            endpoint: String::new(),
            wire_format: WireFormat::Synthetic { seed },
        }])
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SourceDescriptor>> {
        self.sources.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<SourceDescriptor>> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Keeps only the listed source ids, preserving catalog order.
    pub fn retain_ids(mut self, ids: &[String]) -> Self {
        self.sources
            .retain(|s| ids.iter().any(|id| id.eq_ignore_ascii_case(&s.id)));
        self
    }

    /// Replaces one source's endpoint (local dataset paths, mirrors).
    pub fn with_endpoint(mut self, id: &str, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        for source in self.sources.iter_mut() {
            if source.id == id {
                let mut updated = SourceDescriptor::clone(source);
                updated.endpoint = endpoint.clone();
                *source = Arc::new(updated);
            }
        }
        self
    }
}
