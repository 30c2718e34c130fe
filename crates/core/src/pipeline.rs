//! End-to-end run: acquisition, consolidation, gap filling, validation, scoring.
//!
//! ```text
//! SourceRegistry ─► AcquisitionCoordinator ─► consolidate ─► GapFiller
//!                                                              │
//!                      QualityScorer ◄─ SeriesValidator ◄──────┘
//! ```
//!
//! Only acquisition is concurrent. The later stages run one after the other
//! on the complete output of the previous one.

use std::collections::BTreeMap;
use std::sync::Arc;

use aurum_market_data::{
    AcquisitionCoordinator, AcquisitionOutcome, AcquisitionProgress, AcquisitionRequest,
    DateRange, FetcherSet, Granularity, JobReport, SourceRegistry,
};
use log::info;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::consolidation::{consolidate, SourceContribution};
use crate::errors::{ConfigError, Result};
use crate::gap_filler::GapFiller;
use crate::quality::{QualityInputs, QualityReport, QualityScorer};
use crate::series::PriceSeries;
use crate::validation::{RejectionReason, SeriesValidator};

/// What to build a series for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    pub instrument: String,
    pub range: DateRange,
    pub granularity: Granularity,
}

/// Record counts after each stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCounts {
    pub acquired: usize,
    /// Coarser-granularity records dropped in favour of finer ones.
    pub coarse_dropped: usize,
    pub consolidated: usize,
    pub gap_filled: usize,
    pub validated: usize,
    pub gaps_detected: usize,
    pub points_synthesized: usize,
    pub rejections: BTreeMap<RejectionReason, usize>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub request: PipelineRequest,
    pub series: PriceSeries,
    pub quality: QualityReport,
    pub sources: Vec<JobReport>,
    pub contributions: Vec<SourceContribution>,
    pub stages: StageCounts,
}

impl PipelineOutput {
    /// The serializable part of the output, without the series itself.
    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            request: &self.request,
            quality: &self.quality,
            stages: &self.stages,
            sources: &self.sources,
            contributions: &self.contributions,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary<'a> {
    pub request: &'a PipelineRequest,
    pub quality: &'a QualityReport,
    pub stages: &'a StageCounts,
    pub sources: &'a [JobReport],
    pub contributions: &'a [SourceContribution],
}

/// Runs the whole pipeline against one registry.
pub struct Pipeline {
    registry: SourceRegistry,
    config: PipelineConfig,
    coordinator: AcquisitionCoordinator,
}

impl Pipeline {
    pub fn new(registry: SourceRegistry, fetchers: FetcherSet, config: PipelineConfig) -> Self {
        let coordinator = AcquisitionCoordinator::new(fetchers, config.acquisition.max_concurrency);
        Self {
            registry,
            config,
            coordinator,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Live acquisition counters, for progress reporting while [`run`](Self::run) awaits.
    pub fn progress(&self) -> Arc<AcquisitionProgress> {
        self.coordinator.progress()
    }

    /// Fail-fast checks. Nothing is fetched when this fails.
    pub fn validate(&self, request: &PipelineRequest) -> std::result::Result<(), ConfigError> {
        if request.instrument.trim().is_empty() {
            return Err(ConfigError::EmptyInstrument);
        }
        if self.registry.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }
        if !request.range.is_valid() {
            return Err(ConfigError::NegativeRange {
                start: request.range.start,
                end: request.range.end,
            });
        }
        self.config.validate()
    }

    /// Acquires from every source and runs the sequential stages.
    ///
    /// Only configuration errors are returned. Failed or cancelled sources
    /// show up in [`PipelineOutput::sources`] and in a lower quality score.
    pub async fn run(
        &self,
        request: &PipelineRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput> {
        self.validate(request)?;
        info!(
            "Building {} series at {} from {} sources",
            request.instrument,
            request.granularity,
            self.registry.len()
        );

        let acquisition = AcquisitionRequest {
            range: request.range,
            granularity: request.granularity,
        };
        let outcome = self.coordinator.run(&self.registry, &acquisition, cancel).await;
        Ok(self.process(request, outcome))
    }

    /// The sequential stages over an acquisition outcome.
    pub fn process(&self, request: &PipelineRequest, outcome: AcquisitionOutcome) -> PipelineOutput {
        let acquired = outcome.total_records();

        let consolidation = consolidate(&outcome.batches);
        let consolidated = consolidation.series.len();
        let contributions = consolidation.contribution_list();
        let consolidation_dropped = consolidation.coarse_records_dropped;

        let filler = GapFiller::for_granularity(self.config.gap_fill.clone(), request.granularity);
        let filled = filler.fill(consolidation.series);
        let gap_filled = filled.series.len();

        let validated = SeriesValidator::new(self.config.validator.clone()).validate(filled.series);

        let inputs = QualityInputs {
            gaps_detected: filled.gaps_detected,
            anomalies: validated.anomalies(),
            rejected: validated.rejected(),
            raw_count: validated.input_count,
            acquired_points: acquired as u64,
            expected_points: outcome.expected_points,
            consistency_ratio: validated.consistency_ratio,
        };
        let quality = QualityScorer::new(self.config.quality_weights).report(&validated.series, &inputs);

        info!(
            "{}: {} acquired, {} consolidated, {} after gap fill, {} after validation; score {:.3} ({})",
            request.instrument,
            acquired,
            consolidated,
            gap_filled,
            validated.series.len(),
            quality.score,
            quality.grade
        );

        let stages = StageCounts {
            acquired,
            coarse_dropped: consolidation_dropped,
            consolidated,
            gap_filled,
            validated: validated.series.len(),
            gaps_detected: filled.gaps_detected,
            points_synthesized: filled.points_synthesized,
            rejections: validated.rejections,
        };

        PipelineOutput {
            request: request.clone(),
            series: validated.series,
            quality,
            sources: outcome.reports,
            contributions,
            stages,
        }
    }
}
