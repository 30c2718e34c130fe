//! The consolidated, ordered price series handed between stages.

use aurum_market_data::PriceRecord;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Records ordered by strictly increasing timestamp.
///
/// Built once by the consolidator and then passed by value from stage to
/// stage. No stage mutates a record in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PriceSeries(Vec<PriceRecord>);

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts `records` and keeps the first record seen for each timestamp.
    pub fn from_records(mut records: Vec<PriceRecord>) -> Self {
        records.sort_by_key(|r| r.timestamp());
        records.dedup_by_key(|r| r.timestamp());
        Self(records)
    }

    /// Caller guarantees strictly increasing timestamps.
    pub(crate) fn from_ordered(records: Vec<PriceRecord>) -> Self {
        debug_assert!(records
            .windows(2)
            .all(|pair| pair[0].timestamp() < pair[1].timestamp()));
        Self(records)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PriceRecord> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&PriceRecord> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&PriceRecord> {
        self.0.last()
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.first().map(|r| r.timestamp())
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.last().map(|r| r.timestamp())
    }

    /// Time between the first and last record.
    pub fn span(&self) -> Option<Duration> {
        Some(self.end()? - self.start()?)
    }

    pub fn interpolated_count(&self) -> usize {
        self.0.iter().filter(|r| r.is_interpolated()).count()
    }

    pub fn into_records(self) -> Vec<PriceRecord> {
        self.0
    }
}

impl IntoIterator for PriceSeries {
    type Item = PriceRecord;
    type IntoIter = std::vec::IntoIter<PriceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PriceSeries {
    type Item = &'a PriceRecord;
    type IntoIter = std::slice::Iter<'a, PriceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, price: f64) -> PriceRecord {
        PriceRecord::flat(Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(), price)
    }

    #[test]
    fn test_from_records_sorts_and_dedups() {
        let series = PriceSeries::from_records(vec![at(3, 3.0), at(1, 1.0), at(3, 9.0), at(2, 2.0)]);
        let closes: Vec<f64> = series.iter().map(|r| r.close()).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_span() {
        let series = PriceSeries::from_records(vec![at(1, 1.0), at(5, 1.0)]);
        assert_eq!(series.span(), Some(Duration::hours(4)));
        assert_eq!(PriceSeries::new().span(), None);
    }
}
