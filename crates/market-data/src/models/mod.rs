//! Market data models
//!
//! This module contains the core data types for acquisition:
//! - `record` - One OHLCV candle (PriceRecord) and its origin flag
//! - `granularity` - Candle interval (Granularity)
//! - `range` - UTC time window (DateRange)
//! - `source` - Static source catalog entries (SourceDescriptor, RateLimit, WireFormat)

mod granularity;
mod range;
mod record;
mod source;

pub use granularity::Granularity;
pub use range::DateRange;
pub use record::{PriceRecord, RecordOrigin};
pub use source::{RateLimit, SourceDescriptor, WireFormat, WireFormatKind};
