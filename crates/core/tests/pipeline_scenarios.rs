//! End-to-end pipeline scenarios with scripted sources.
//!
//! Each source's response is fixed up front and keyed by source id, so the
//! tests exercise the real coordinator, consolidator, gap filler, validator
//! and scorer without touching the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use aurum_core::{
    export_csv, ConfigError, GapFillConfig, Pipeline, PipelineConfig, PipelineError,
    PipelineRequest, RejectionReason,
};
use aurum_market_data::{
    DateRange, FetchError, FetchRequest, Fetcher, FetcherSet, Granularity, JobFailure, PriceRecord,
    RateLimit, RetryPolicy, SourceDescriptor, SourceRegistry, WireFormat, WireFormatKind,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Fixtures
// =============================================================================

struct ScriptedFetcher {
    responses: HashMap<String, Result<Vec<PriceRecord>, FetchError>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn respond(mut self, source_id: &str, response: Result<Vec<PriceRecord>, FetchError>) -> Self {
        self.responses.insert(source_id.to_string(), response);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    fn id(&self) -> &'static str {
        "SCRIPTED"
    }

    fn wire_format(&self) -> WireFormatKind {
        WireFormatKind::Synthetic
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    async fn fetch(
        &self,
        descriptor: &SourceDescriptor,
        _request: &FetchRequest,
    ) -> Result<Vec<PriceRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(&descriptor.id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn source(id: &str, quality: f64) -> SourceDescriptor {
    SourceDescriptor {
        id: id.to_string(),
        name: format!("{} feed", id),
        symbol: "XAUUSD".to_string(),
        granularities: vec![Granularity::OneHour, Granularity::OneDay],
        years_of_history: 20,
        nominal_quality: quality,
        rate_limit: RateLimit::per_minute(600),
        endpoint: String::new(),
        wire_format: WireFormat::Synthetic { seed: 0 },
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
}

fn hour(h: i64) -> DateTime<Utc> {
    t0() + Duration::hours(h)
}

fn request(hours: i64) -> PipelineRequest {
    PipelineRequest {
        instrument: "XAUUSD".to_string(),
        range: DateRange::new(t0(), hour(hours)),
        granularity: Granularity::OneHour,
    }
}

/// Hourly candles over `0..=hours` with closes drifting around 2000.
fn hourly(hours: i64, volume: Option<f64>) -> Vec<PriceRecord> {
    (0..=hours)
        .map(|h| {
            let close = 2000.0 + (h % 7) as f64;
            PriceRecord::new(hour(h), close - 0.5, close + 1.0, close - 1.5, close, volume)
        })
        .collect()
}

fn pipeline(sources: Vec<SourceDescriptor>, fetcher: Arc<ScriptedFetcher>, config: PipelineConfig) -> Pipeline {
    Pipeline::new(SourceRegistry::new(sources), FetcherSet::new().with(fetcher), config)
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_volume_record_wins_conflict() {
    let ts = hour(1);
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .respond("PREMIUM", Ok(vec![PriceRecord::new(ts, 2000.0, 2003.0, 1998.0, 2001.0, None)]))
            .respond(
                "VOLUME",
                Ok(vec![PriceRecord::new(ts, 2000.5, 2004.0, 1999.0, 2002.0, Some(1000.0))]),
            ),
    );
    let pipeline = pipeline(
        vec![source("PREMIUM", 0.99), source("VOLUME", 0.50)],
        Arc::clone(&fetcher),
        PipelineConfig::default(),
    );

    let output = pipeline.run(&request(2), &CancellationToken::new()).await.unwrap();

    assert_eq!(output.series.len(), 1);
    let record = output.series.records()[0];
    assert_eq!(record.volume(), Some(1000.0));
    assert_eq!(record.close(), 2002.0);
    assert_eq!(output.contributions.len(), 1);
    assert_eq!(output.contributions[0].source_id, "VOLUME");
}

fn daily_only(id: &str, quality: f64) -> SourceDescriptor {
    SourceDescriptor {
        granularities: vec![Granularity::OneDay],
        ..source(id, quality)
    }
}

#[tokio::test]
async fn test_daily_source_does_not_override_hourly_candles() {
    let daily = vec![
        PriceRecord::new(hour(0), 2000.0, 2040.0, 1960.0, 2001.0, Some(150_000.0)),
        PriceRecord::new(hour(24), 2001.0, 2045.0, 1970.0, 2010.0, Some(140_000.0)),
    ];
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .respond("YAHOO_LIKE", Ok(hourly(47, Some(800.0))))
            .respond("NASDAQ_LIKE", Ok(daily)),
    );
    let pipeline = pipeline(
        vec![source("YAHOO_LIKE", 0.95), daily_only("NASDAQ_LIKE", 0.96)],
        fetcher,
        PipelineConfig::default(),
    );

    let output = pipeline.run(&request(47), &CancellationToken::new()).await.unwrap();

    assert_eq!(output.series.len(), 48);
    let midnight = output.series.iter().find(|r| r.timestamp() == hour(0)).unwrap();
    assert_eq!(midnight.high(), 2001.0);
    assert_eq!(midnight.volume(), Some(800.0));
    assert_eq!(output.contributions.len(), 1);
    assert_eq!(output.contributions[0].source_id, "YAHOO_LIKE");
    assert_eq!(output.stages.coarse_dropped, 2);
}

#[tokio::test]
async fn test_daily_outlier_does_not_cost_the_hourly_candle() {
    let daily = vec![PriceRecord::new(hour(24), 2600.0, 2610.0, 2590.0, 2600.0, Some(150_000.0))];
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .respond("YAHOO_LIKE", Ok(hourly(47, Some(800.0))))
            .respond("NASDAQ_LIKE", Ok(daily)),
    );
    let pipeline = pipeline(
        vec![source("YAHOO_LIKE", 0.95), daily_only("NASDAQ_LIKE", 0.96)],
        fetcher,
        PipelineConfig::default(),
    );

    let output = pipeline.run(&request(47), &CancellationToken::new()).await.unwrap();

    let midnight = output.series.iter().find(|r| r.timestamp() == hour(24)).unwrap();
    assert_eq!(midnight.close(), 2003.0);
    assert!(!midnight.is_interpolated());
    assert_eq!(output.stages.rejections.get(&RejectionReason::StatisticalOutlier), None);
    assert_eq!(output.series.len(), 48);
}

#[tokio::test]
async fn test_gap_is_interpolated_and_capped() {
    let fetcher = Arc::new(ScriptedFetcher::new().respond(
        "ONLY",
        Ok(vec![
            PriceRecord::new(hour(0), 2000.0, 2002.0, 1999.0, 2001.0, Some(5.0)),
            PriceRecord::new(hour(10), 2010.0, 2012.0, 2008.0, 2011.0, Some(5.0)),
        ]),
    ));
    let config = PipelineConfig {
        gap_fill: GapFillConfig {
            threshold_secs: 8 * 3_600,
            interval_secs: None,
            max_points_per_gap: 5,
        },
        ..Default::default()
    };
    let pipeline = pipeline(vec![source("ONLY", 0.9)], fetcher, config);

    let output = pipeline.run(&request(10), &CancellationToken::new()).await.unwrap();

    assert_eq!(output.stages.gaps_detected, 1);
    assert_eq!(output.stages.points_synthesized, 5);
    assert_eq!(output.series.len(), 7);
    assert!(output.stages.gap_filled >= output.stages.consolidated);

    let interpolated: Vec<_> = output.series.iter().filter(|r| r.is_interpolated()).collect();
    assert_eq!(interpolated.len(), 5);
    for record in interpolated {
        assert!(record.close() >= 2001.0 && record.close() <= 2011.0);
        assert_eq!(record.volume(), None);
        assert!(record.is_ohlc_consistent());
    }
    assert_eq!(output.quality.gap_count, 1);
    assert_eq!(output.quality.interpolated_records, 5);
}

#[tokio::test]
async fn test_outlier_is_rejected_and_counted() {
    let mut records = hourly(99, Some(10.0));
    records.push(PriceRecord::new(hour(100), 2600.0, 2601.0, 2599.0, 2600.0, Some(10.0)));
    let fetcher = Arc::new(ScriptedFetcher::new().respond("ONLY", Ok(records)));
    let pipeline = pipeline(vec![source("ONLY", 0.9)], fetcher, PipelineConfig::default());

    let output = pipeline.run(&request(100), &CancellationToken::new()).await.unwrap();

    assert_eq!(output.stages.rejections.get(&RejectionReason::StatisticalOutlier), Some(&1));
    assert_eq!(output.quality.anomaly_count, 1);
    assert!(output.quality.components.cleanliness < 1.0);
    assert!(output.series.iter().all(|r| r.close() < 2600.0));
    assert!(output.stages.validated <= output.stages.gap_filled);
}

#[tokio::test]
async fn test_empty_registry_fails_before_fetching() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let pipeline = pipeline(Vec::new(), Arc::clone(&fetcher), PipelineConfig::default());

    let result = pipeline.run(&request(24), &CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(PipelineError::InvalidConfig(ConfigError::EmptyRegistry))
    ));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_negative_range_fails_before_fetching() {
    let fetcher = Arc::new(ScriptedFetcher::new().respond("ONLY", Ok(hourly(24, None))));
    let pipeline = pipeline(vec![source("ONLY", 0.9)], Arc::clone(&fetcher), PipelineConfig::default());
    let backwards = PipelineRequest {
        range: DateRange::new(hour(24), hour(0)),
        ..request(24)
    };

    let result = pipeline.run(&backwards, &CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(PipelineError::InvalidConfig(ConfigError::NegativeRange { .. }))
    ));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_source_failure_reduces_completeness() {
    let ids = ["S1", "S2", "S3", "S4", "S5"];
    let sources: Vec<_> = ids.iter().map(|id| source(id, 0.9)).collect();

    let healthy = ids
        .iter()
        .fold(ScriptedFetcher::new(), |f, id| f.respond(id, Ok(hourly(48, Some(1.0)))));
    let full = pipeline(sources.clone(), Arc::new(healthy), PipelineConfig::default())
        .run(&request(48), &CancellationToken::new())
        .await
        .unwrap();

    let degraded = ScriptedFetcher::new()
        .respond("S1", Ok(hourly(48, Some(1.0))))
        .respond("S2", Err(FetchError::network("S2", "connection reset")))
        .respond("S3", Err(FetchError::malformed("S3", "unexpected payload")))
        .respond("S4", Err(FetchError::rate_limited("S4")))
        .respond("S5", Ok(hourly(48, None)));
    let partial = pipeline(sources, Arc::new(degraded), PipelineConfig::default())
        .run(&request(48), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!partial.series.is_empty());
    assert_eq!(partial.sources.iter().filter(|r| !r.succeeded()).count(), 3);
    assert_eq!(full.quality.components.completeness, 1.0);
    assert!(partial.quality.components.completeness < full.quality.components.completeness);
    assert!(partial.quality.score < full.quality.score);
    assert!(partial.quality.score > 0.0);
}

#[tokio::test]
async fn test_cancelled_run_yields_empty_series() {
    let fetcher = Arc::new(ScriptedFetcher::new().respond("ONLY", Ok(hourly(24, None))));
    let pipeline = pipeline(vec![source("ONLY", 0.9)], Arc::clone(&fetcher), PipelineConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let output = pipeline.run(&request(24), &cancel).await.unwrap();

    assert_eq!(fetcher.calls(), 0);
    assert!(output.series.is_empty());
    assert_eq!(output.quality.score, 0.0);
    assert_eq!(output.sources[0].failure, Some(JobFailure::Cancelled));
}

#[tokio::test]
async fn test_output_exports_and_summarises() {
    let fetcher = Arc::new(ScriptedFetcher::new().respond("ONLY", Ok(hourly(24, Some(3.0)))));
    let pipeline = pipeline(vec![source("ONLY", 0.9)], fetcher, PipelineConfig::default());
    let output = pipeline.run(&request(24), &CancellationToken::new()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xauusd.csv");
    export_csv(&output.series, &path).unwrap();
    let csv = std::fs::read_to_string(&path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("timestamp,open,high,low,close,volume"));
    assert_eq!(lines.next(), Some("2024-03-04 00:00:00,1999.5,2001,1998.5,2000,3"));
    assert_eq!(csv.lines().count(), 26);

    let summary = serde_json::to_value(output.summary()).unwrap();
    assert_eq!(summary["quality"]["grade"], "A+");
    assert_eq!(summary["stages"]["validated"], 25);
    assert_eq!(summary["sources"][0]["status"], "completed");
}
