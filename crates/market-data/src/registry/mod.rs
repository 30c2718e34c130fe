//! Source registry module.
//!
//! This module provides:
//! - The static source catalog ([`SourceRegistry`])
//! - Per-source request pacing ([`RateLimiter`])

mod catalog;
mod rate_limiter;

pub use catalog::{
    SourceRegistry, ALPHA_VANTAGE, DUKASCOPY, KAGGLE, METAL_PRICE_API, NASDAQ_DATA_LINK, STOOQ,
    SYNTHETIC, YAHOO,
};
pub use rate_limiter::RateLimiter;
