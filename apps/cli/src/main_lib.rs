use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use aurum_core::{export_csv, Pipeline, PipelineOutput, PipelineRequest};
use aurum_market_data::registry::KAGGLE;
use aurum_market_data::{AcquisitionProgress, FetcherSet, SourceRegistry};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub fn init_tracing() {
    let log_format = std::env::var("AURUM_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Catalog for the configured instrument, narrowed by the source filter.
pub fn build_registry(config: &Config) -> anyhow::Result<SourceRegistry> {
    let mut registry = if config.demo {
        SourceRegistry::synthetic(config.synthetic_seed)
    } else {
        match SourceRegistry::for_instrument(&config.instrument) {
            Some(registry) => registry,
            None => bail!("No source catalog for instrument '{}'", config.instrument),
        }
    };

    if let Some(path) = &config.kaggle_csv {
        registry = registry.with_endpoint(KAGGLE, path.clone());
    }
    if let Some(ids) = &config.sources {
        registry = registry.retain_ids(ids);
    }
    Ok(registry)
}

pub fn build_fetchers(config: &Config) -> FetcherSet {
    FetcherSet::live(&config.api_keys)
}

/// Logs acquisition progress until `cancel` fires.
fn spawn_progress_reporter(
    progress: Arc<AcquisitionProgress>,
    every: std::time::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        // First tick is immediate and would report an empty run.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = progress.snapshot();
                    info!(
                        jobs_done = snapshot.jobs_completed + snapshot.jobs_failed,
                        jobs_total = snapshot.jobs_total,
                        points = snapshot.downloaded_points,
                        expected = snapshot.total_expected_points,
                        points_per_second = snapshot.points_per_second.round(),
                        current = snapshot.current_source.as_deref().unwrap_or("-"),
                        "Acquiring: {:.0}% of jobs",
                        snapshot.job_fraction() * 100.0
                    );
                }
            }
        }
    })
}

/// Cancels `cancel` on Ctrl-C. Jobs already running are abandoned and the
/// partial result is still consolidated and reported.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling acquisition");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

fn write_report(output: &PipelineOutput, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&output.summary())?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    info!("Wrote quality report to {}", path.display());
    Ok(())
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn log_sources(output: &PipelineOutput) {
    for report in &output.sources {
        match &report.failure {
            None => info!(
                source = %report.source_id,
                records = report.records_fetched,
                elapsed_ms = report.elapsed_ms,
                "Source completed"
            ),
            Some(failure) => warn!(
                source = %report.source_id,
                elapsed_ms = report.elapsed_ms,
                "Source failed: {}",
                failure
            ),
        }
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let registry = build_registry(&config)?;
    let fetchers = build_fetchers(&config);
    let pipeline = Pipeline::new(registry, fetchers, config.pipeline.clone());

    let request = PipelineRequest {
        instrument: config.instrument.clone(),
        range: config.range,
        granularity: config.granularity,
    };

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let reporter_stop = CancellationToken::new();
    let reporter = spawn_progress_reporter(
        pipeline.progress(),
        config.progress_interval,
        reporter_stop.clone(),
    );

    let result = pipeline.run(&request, &cancel).await;
    reporter_stop.cancel();
    if let Err(e) = reporter.await {
        warn!("Progress reporter ended abnormally: {}", e);
    }
    let output = result?;

    log_sources(&output);

    ensure_parent(&config.output_path)?;
    export_csv(&output.series, &config.output_path)
        .with_context(|| format!("Failed to export {}", config.output_path.display()))?;
    ensure_parent(&config.report_path)?;
    write_report(&output, &config.report_path)?;

    let quality = &output.quality;
    info!(
        records = quality.total_records,
        interpolated = quality.interpolated_records,
        gaps = quality.gap_count,
        anomalies = quality.anomaly_count,
        "Quality score {:.3} ({})",
        quality.score,
        quality.grade
    );

    if cancel.is_cancelled() {
        warn!("Run was interrupted; the exported series is partial");
    }
    if let Some(min_score) = config.min_score {
        if !quality.passes(min_score) {
            bail!(
                "Quality score {:.3} is below the required {:.3}",
                quality.score,
                min_score
            );
        }
    }
    Ok(())
}
