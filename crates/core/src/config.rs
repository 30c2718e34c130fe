//! Pipeline configuration.
//!
//! Every stage after acquisition is a pure transform parameterised by one of
//! these groups. All groups deserialize with defaults, so a JSON override only
//! needs the keys it changes.

use aurum_market_data::DEFAULT_MAX_CONCURRENCY;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// =============================================================================
// Acquisition
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AcquisitionConfig {
    /// Upper bound on concurrently running fetch jobs.
    pub max_concurrency: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

// =============================================================================
// Gap filling
// =============================================================================

/// Gap detection and interpolation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GapFillConfig {
    /// Adjacent records further apart than this are a gap (default: 2h)
    pub threshold_secs: i64,

    /// Spacing of synthesized records. When unset the pipeline uses the
    /// requested granularity and a standalone filler infers it from the series.
    pub interval_secs: Option<i64>,

    /// Most records synthesized inside one gap (default: 24)
    pub max_points_per_gap: usize,
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self {
            threshold_secs: 2 * 3_600,
            interval_secs: None,
            max_points_per_gap: 24,
        }
    }
}

/// Largest number of seconds a `chrono::Duration` can hold.
pub const MAX_GAP_SECS: i64 = i64::MAX / 1_000;

fn seconds(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(-MAX_GAP_SECS, MAX_GAP_SECS))
}

impl GapFillConfig {
    pub fn threshold(&self) -> Duration {
        seconds(self.threshold_secs)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold_secs <= 0 {
            return Err(ConfigError::NonPositiveGapThreshold(self.threshold_secs));
        }
        if self.threshold_secs > MAX_GAP_SECS {
            return Err(ConfigError::GapThresholdTooLarge(self.threshold_secs));
        }
        if let Some(interval) = self.interval_secs {
            if interval <= 0 {
                return Err(ConfigError::NonPositiveGapInterval(interval));
            }
            if interval > MAX_GAP_SECS {
                return Err(ConfigError::GapIntervalTooLarge(interval));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Absolute sanity band for an instrument's price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBand {
    pub min: f64,
    pub max: f64,
}

impl PriceBand {
    /// Spot gold in USD per troy ounce.
    pub const GOLD_USD: PriceBand = PriceBand {
        min: 500.0,
        max: 10_000.0,
    };

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }
}

impl Default for PriceBand {
    fn default() -> Self {
        Self::GOLD_USD
    }
}

/// Structural and statistical rejection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidatorConfig {
    pub price_band: PriceBand,

    /// Closes further than this many standard deviations from the mean are
    /// rejected (default: 4.0)
    pub sigma_multiple: f64,

    /// Statistical rejection is skipped below this many samples (default: 10)
    pub min_samples: usize,

    /// Largest accepted `|close - open| / open` for one candle (default: 0.10)
    pub max_candle_move: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            price_band: PriceBand::default(),
            sigma_multiple: 4.0,
            min_samples: 10,
            max_candle_move: 0.10,
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sigma_multiple.is_finite() && self.sigma_multiple > 0.0) {
            return Err(ConfigError::NonPositiveSigma(self.sigma_multiple));
        }
        if !(self.max_candle_move.is_finite() && self.max_candle_move > 0.0) {
            return Err(ConfigError::NonPositiveCandleMove(self.max_candle_move));
        }
        if !self.price_band.is_valid() {
            return Err(ConfigError::EmptyPriceBand {
                min: self.price_band.min,
                max: self.price_band.max,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Quality weights
// =============================================================================

/// Relative weight of each quality component. Normalised by their sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QualityWeights {
    pub coverage: f64,
    pub cleanliness: f64,
    pub completeness: f64,
    pub consistency: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            coverage: 0.30,
            cleanliness: 0.20,
            completeness: 0.20,
            consistency: 0.30,
        }
    }
}

impl QualityWeights {
    pub fn total(&self) -> f64 {
        self.coverage + self.cleanliness + self.completeness + self.consistency
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("coverage", self.coverage),
            ("cleanliness", self.cleanliness),
            ("completeness", self.completeness),
            ("consistency", self.consistency),
        ];
        for (name, weight) in named {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeights(format!(
                    "{} weight must be a finite number >= 0, got {}",
                    name, weight
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(ConfigError::InvalidWeights(
                "at least one weight must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Settings for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub acquisition: AcquisitionConfig,
    pub gap_fill: GapFillConfig,
    pub validator: ValidatorConfig,
    pub quality_weights: QualityWeights,
}

impl PipelineConfig {
    /// Checks every group. The first problem found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acquisition.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        self.gap_fill.validate()?;
        self.validator.validate()?;
        self.quality_weights.validate()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gap_fill.threshold(), Duration::hours(2));
        assert_eq!(config.gap_fill.max_points_per_gap, 24);
        assert_eq!(config.validator.sigma_multiple, 4.0);
        assert!((config.quality_weights.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = PipelineConfig {
            acquisition: AcquisitionConfig { max_concurrency: 0 },
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));
    }

    #[test]
    fn test_gap_settings_rejected() {
        let mut config = PipelineConfig::default();
        config.gap_fill.threshold_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveGapThreshold(0))
        );

        let mut config = PipelineConfig::default();
        config.gap_fill.interval_secs = Some(-60);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveGapInterval(-60))
        );
    }

    #[test]
    fn test_oversized_gap_settings_rejected() {
        let mut config = PipelineConfig::default();
        config.gap_fill.threshold_secs = i64::MAX;
        assert_eq!(
            config.validate(),
            Err(ConfigError::GapThresholdTooLarge(i64::MAX))
        );
        assert_eq!(config.gap_fill.threshold(), Duration::seconds(MAX_GAP_SECS));

        let mut config = PipelineConfig::default();
        config.gap_fill.interval_secs = Some(MAX_GAP_SECS + 1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::GapIntervalTooLarge(MAX_GAP_SECS + 1))
        );

        let mut config = PipelineConfig::default();
        config.gap_fill.threshold_secs = MAX_GAP_SECS;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validator_settings_rejected() {
        let mut config = PipelineConfig::default();
        config.validator.sigma_multiple = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveSigma(_))
        ));

        let mut config = PipelineConfig::default();
        config.validator.price_band = PriceBand {
            min: 3000.0,
            max: 1000.0,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyPriceBand { .. })
        ));
    }

    #[test]
    fn test_weights_rejected() {
        let mut config = PipelineConfig::default();
        config.quality_weights.coverage = -0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeights(_))
        ));

        config.quality_weights = QualityWeights {
            coverage: 0.0,
            cleanliness: 0.0,
            completeness: 0.0,
            consistency: 0.0,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeights(_))
        ));
    }

    #[test]
    fn test_partial_json_override() {
        let json = r#"{ "gapFill": { "thresholdSecs": 28800 }, "validator": { "sigmaMultiple": 3.5 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.gap_fill.threshold(), Duration::hours(8));
        assert_eq!(config.gap_fill.max_points_per_gap, 24);
        assert_eq!(config.validator.sigma_multiple, 3.5);
        assert_eq!(config.validator.price_band, PriceBand::GOLD_USD);
        assert_eq!(config.acquisition.max_concurrency, DEFAULT_MAX_CONCURRENCY);
    }
}
