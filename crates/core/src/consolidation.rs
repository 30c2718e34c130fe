//! Merges per-source batches into one series.
//!
//! Each timestamp keeps the best record any source reported for it. "Best"
//! is a total order, so the result does not depend on which job finished
//! first or on the order of batches:
//!
//! 1. a record queried at a finer granularity beats a coarser one
//! 2. a record carrying volume beats one without
//! 3. higher source `nominal_quality` wins
//! 4. lexicographically smaller source id wins
//! 5. smaller OHLCV values win, compared with `f64::total_cmp`
//!
//! Sources that only serve a coarser granularity than the finest one present
//! fill history the finer sources do not reach. Inside the span the finest
//! batches cover, their records are dropped: a daily candle snapped to
//! midnight would otherwise sit in an hourly series as a day-wide candle.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use aurum_market_data::{Granularity, PriceRecord, SourceBatch};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::series::PriceSeries;

/// A record together with what is needed to rank it.
#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    record: PriceRecord,
    granularity: Granularity,
    quality: f64,
    source_id: &'a str,
}

impl Candidate<'_> {
    /// `Ordering::Greater` when `self` should replace `other`.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .granularity
            .cmp(&self.granularity)
            .then_with(|| self.record.has_volume().cmp(&other.record.has_volume()))
            .then_with(|| self.quality.total_cmp(&other.quality))
            .then_with(|| other.source_id.cmp(self.source_id))
            .then_with(|| compare_values(&other.record, &self.record))
    }
}

fn compare_values(a: &PriceRecord, b: &PriceRecord) -> Ordering {
    a.prices()
        .iter()
        .zip(b.prices().iter())
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
        .then_with(|| match (a.volume(), b.volume()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (x, y) => x.is_some().cmp(&y.is_some()),
        })
}

/// Output of [`consolidate`].
#[derive(Debug, Clone, Default)]
pub struct Consolidation {
    pub series: PriceSeries,
    /// Records received across all batches.
    pub input_records: usize,
    /// Coarse-granularity records dropped inside the finest batches' span.
    pub coarse_records_dropped: usize,
    /// Winning records per source id.
    pub contributions: BTreeMap<String, usize>,
}

impl Consolidation {
    /// Records dropped because another record won their timestamp.
    pub fn conflicts_resolved(&self) -> usize {
        self.input_records - self.series.len()
    }

    pub fn contribution_list(&self) -> Vec<SourceContribution> {
        self.contributions
            .iter()
            .map(|(id, records)| SourceContribution {
                source_id: id.clone(),
                records: *records,
            })
            .collect()
    }
}

/// Per-source share of the consolidated series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContribution {
    pub source_id: String,
    pub records: usize,
}

/// Merges every batch into one ordered series, one record per timestamp.
///
/// An empty input yields an empty series.
pub fn consolidate(batches: &[SourceBatch]) -> Consolidation {
    let mut best: BTreeMap<DateTime<Utc>, Candidate<'_>> = BTreeMap::new();
    let mut input_records = 0;
    let mut coarse_records_dropped = 0;
    let finest = finest_coverage(batches);

    for batch in batches {
        let descriptor = &batch.descriptor;
        for record in &batch.records {
            input_records += 1;
            if let Some((granularity, start, end)) = finest {
                let ts = record.timestamp();
                if batch.granularity > granularity && ts >= start && ts <= end {
                    coarse_records_dropped += 1;
                    continue;
                }
            }
            let candidate = Candidate {
                record: *record,
                granularity: batch.granularity,
                quality: descriptor.nominal_quality,
                source_id: &descriptor.id,
            };
            best.entry(record.timestamp())
                .and_modify(|current| {
                    if candidate.rank(current) == Ordering::Greater {
                        *current = candidate;
                    }
                })
                .or_insert(candidate);
        }
    }

    let mut contributions: HashMap<&str, usize> = HashMap::new();
    let records: Vec<PriceRecord> = best
        .into_values()
        .map(|candidate| {
            *contributions.entry(candidate.source_id).or_default() += 1;
            candidate.record
        })
        .collect();

    debug!(
        "Consolidated {} records from {} batches into {} timestamps ({} coarse records dropped)",
        input_records,
        batches.len(),
        records.len(),
        coarse_records_dropped
    );

    Consolidation {
        series: PriceSeries::from_ordered(records),
        input_records,
        coarse_records_dropped,
        contributions: contributions
            .into_iter()
            .map(|(id, n)| (id.to_string(), n))
            .collect(),
    }
}

/// Finest granularity with any records, and the first and last timestamp
/// reported at it.
fn finest_coverage(batches: &[SourceBatch]) -> Option<(Granularity, DateTime<Utc>, DateTime<Utc>)> {
    let finest = batches
        .iter()
        .filter(|b| !b.records.is_empty())
        .map(|b| b.granularity)
        .min()?;
    let timestamps = batches
        .iter()
        .filter(|b| b.granularity == finest)
        .flat_map(|b| b.records.iter().map(|r| r.timestamp()));

    let (mut start, mut end) = (None::<DateTime<Utc>>, None::<DateTime<Utc>>);
    for ts in timestamps {
        start = Some(start.map_or(ts, |s| s.min(ts)));
        end = Some(end.map_or(ts, |e| e.max(ts)));
    }
    Some((finest, start?, end?))
}
