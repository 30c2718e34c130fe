use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use aurum_core::PipelineConfig;
use aurum_market_data::{ApiKeys, DateRange, Granularity};
use chrono::{DateTime, NaiveDate, Utc};

const DEFAULT_INSTRUMENT: &str = "XAUUSD";
const DEFAULT_YEARS: u32 = 20;
const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 2_000;

pub struct Config {
    pub instrument: String,
    pub range: DateRange,
    pub granularity: Granularity,
    pub output_path: PathBuf,
    pub report_path: PathBuf,
    pub api_keys: ApiKeys,
    /// Use the seeded synthetic source instead of the live catalog.
    pub demo: bool,
    pub synthetic_seed: u64,
    /// Restricts the catalog to these source ids when set.
    pub sources: Option<Vec<String>>,
    pub kaggle_csv: Option<String>,
    pub pipeline: PipelineConfig,
    pub min_score: Option<f64>,
    pub progress_interval: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let instrument = var("AURUM_INSTRUMENT").unwrap_or_else(|| DEFAULT_INSTRUMENT.into());
        let granularity: Granularity = var("AURUM_GRANULARITY")
            .unwrap_or_else(|| "1h".into())
            .parse()
            .map_err(|e: String| anyhow!("Invalid AURUM_GRANULARITY: {}", e))?;

        let end = match var("AURUM_END") {
            Some(raw) => parse_date(&raw).context("Invalid AURUM_END")?,
            None => Utc::now(),
        };
        let range = match var("AURUM_START") {
            Some(raw) => DateRange::new(parse_date(&raw).context("Invalid AURUM_START")?, end),
            None => {
                let years = match var("AURUM_YEARS") {
                    Some(raw) => raw.parse().context("Invalid AURUM_YEARS")?,
                    None => DEFAULT_YEARS,
                };
                DateRange::years_back(end, years)
            }
        };

        let output_path = var("AURUM_OUTPUT").map(PathBuf::from).unwrap_or_else(|| {
            PathBuf::from("data").join(format!(
                "{}_{}.csv",
                instrument.to_ascii_lowercase(),
                granularity
            ))
        });
        let report_path = var("AURUM_REPORT")
            .map(PathBuf::from)
            .unwrap_or_else(|| output_path.with_extension("report.json"));

        let mut pipeline = match var("AURUM_PIPELINE_CONFIG") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read pipeline config {}", path))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid pipeline config {}", path))?
            }
            None => PipelineConfig::default(),
        };
        if let Some(raw) = var("AURUM_MAX_CONCURRENCY") {
            pipeline.acquisition.max_concurrency =
                raw.parse().context("Invalid AURUM_MAX_CONCURRENCY")?;
        }

        let sources = var("AURUM_SOURCES").map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let min_score = match var("AURUM_MIN_SCORE") {
            Some(raw) => Some(raw.parse().context("Invalid AURUM_MIN_SCORE")?),
            None => None,
        };
        let synthetic_seed = match var("AURUM_SYNTHETIC_SEED") {
            Some(raw) => raw.parse().context("Invalid AURUM_SYNTHETIC_SEED")?,
            None => 42,
        };
        let progress_ms: u64 = var("AURUM_PROGRESS_INTERVAL_MS")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_PROGRESS_INTERVAL_MS);

        Ok(Self {
            instrument,
            range,
            granularity,
            output_path,
            report_path,
            api_keys: ApiKeys {
                alpha_vantage: var("AURUM_ALPHA_VANTAGE_KEY"),
                metal_price_api: var("AURUM_METAL_PRICE_API_KEY"),
                nasdaq_data_link: var("AURUM_NASDAQ_DATA_LINK_KEY"),
            },
            demo: var("AURUM_DEMO").map(|v| is_truthy(&v)).unwrap_or(false),
            synthetic_seed,
            sources,
            kaggle_csv: var("AURUM_KAGGLE_CSV"),
            pipeline,
            min_score,
            progress_interval: Duration::from_millis(progress_ms.max(100)),
        })
    }
}

/// `YYYY-MM-DD` at midnight UTC.
fn parse_date(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD, got '{}'", raw))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
