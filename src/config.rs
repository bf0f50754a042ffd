//! Engine configuration
//!
//! [`RawConfig`] mirrors the recognised option mapping one-to-one and
//! rejects unknown keys. [`EngineConfig`] is the validated, immutable form
//! the engine runs on; every cross-field rule is checked when it is built.
//!
//! # Example
//!
//! ```
//! use onepass::config::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{
//!     "statistics": ["mean", "percentile"],
//!     "percentile_list": [10.0, 50.0, 90.0],
//!     "statistic_frequency": "daily",
//!     "output_frequency": "monthly",
//!     "time_step_minutes": 60,
//!     "variables": ["tas"],
//!     "bias_correction": false
//! }"#).unwrap();
//!
//! assert_eq!(config.frequency().time_step_minutes(), 60);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::accumulator::{Accumulator, AccumulatorSettings, StatKind};
use crate::buckets::{Calendar, Frequency, FrequencyConfig};
use crate::error::{Error, Result};
use crate::statistics::VarianceMode;

fn default_compression() -> u32 {
    100
}

fn default_bins() -> usize {
    10
}

/// `percentile_list`: explicit percentiles in [0, 100], or `["all"]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PercentileList {
    Values(Vec<f64>),
    Whole([WholeDistribution; 1]),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WholeDistribution {
    All,
}

impl PercentileList {
    /// The percentiles to report; the whole distribution is 0 through 99
    pub fn resolve(&self) -> Vec<f64> {
        match self {
            PercentileList::Values(values) => values.clone(),
            PercentileList::Whole(_) => (0..100).map(f64::from).collect(),
        }
    }
}

/// Recognised options, as handed over by an external parser
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub statistics: Vec<StatKind>,
    #[serde(default)]
    pub percentile_list: Option<PercentileList>,
    #[serde(default)]
    pub threshold_value: Option<f64>,
    pub statistic_frequency: Frequency,
    pub output_frequency: Frequency,
    pub time_step_minutes: u32,
    pub variables: Vec<String>,
    pub bias_correction: bool,
    #[serde(default)]
    pub checkpoint_filepath: Option<PathBuf>,
    #[serde(default)]
    pub save_filepath: Option<PathBuf>,
    #[serde(default = "default_compression")]
    pub compression_parameter: u32,
    #[serde(default)]
    pub rolling_output: bool,
    #[serde(default)]
    pub calendar: Calendar,
    #[serde(default)]
    pub variance: VarianceMode,
    /// Write a checkpoint after this many ingested increments
    #[serde(default)]
    pub checkpoint_every: Option<u64>,
    /// Missing time steps tolerated between consecutive increments
    #[serde(default)]
    pub max_gap_steps: Option<u32>,
    #[serde(default = "default_bins")]
    pub histogram_bins: usize,
    /// `[low, high]` shared by every element's histogram
    #[serde(default)]
    pub histogram_range: Option<[f64; 2]>,
}

/// Validated engine configuration
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    statistics: Vec<StatKind>,
    variables: Vec<String>,
    frequency: FrequencyConfig,
    settings: AccumulatorSettings,
    bias_correction: bool,
    checkpoint_path: Option<PathBuf>,
    save_path: Option<PathBuf>,
    checkpoint_every: Option<u64>,
    max_gap_steps: Option<u32>,
}

impl EngineConfig {
    /// Parse and validate a JSON option mapping
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Validate an already-parsed JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawConfig = serde_json::from_value(value).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Statistic kinds, deduplicated, in declaration order
    pub fn statistics(&self) -> &[StatKind] {
        &self.statistics
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn frequency(&self) -> &FrequencyConfig {
        &self.frequency
    }

    pub fn settings(&self) -> &AccumulatorSettings {
        &self.settings
    }

    pub fn bias_correction(&self) -> bool {
        self.bias_correction
    }

    pub fn checkpoint_path(&self) -> Option<&Path> {
        self.checkpoint_path.as_deref()
    }

    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    pub fn checkpoint_every(&self) -> Option<u64> {
        self.checkpoint_every
    }

    pub fn max_gap_steps(&self) -> Option<u32> {
        self.max_gap_steps
    }
}

fn dedup<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

impl TryFrom<RawConfig> for EngineConfig {
    type Error = Error;

    fn try_from(raw: RawConfig) -> Result<Self> {
        if raw.statistics.is_empty() {
            return Err(Error::InvalidConfig("at least one statistic is required".into()));
        }
        if raw.variables.is_empty() || raw.variables.iter().any(|v| v.trim().is_empty()) {
            return Err(Error::InvalidConfig("variables must be a non-empty list of names".into()));
        }
        if raw.statistics.contains(&StatKind::BiasCorrectedMean) && !raw.bias_correction {
            return Err(Error::InvalidConfig(
                "bias_corrected_mean requires bias_correction to be enabled".into(),
            ));
        }
        if raw.compression_parameter == 0 {
            return Err(Error::InvalidConfig("compression_parameter must be positive".into()));
        }
        match (raw.checkpoint_every, &raw.checkpoint_filepath) {
            (Some(0), _) => {
                return Err(Error::InvalidConfig("checkpoint_every must be positive".into()));
            }
            (Some(_), None) => {
                return Err(Error::InvalidConfig("checkpoint_every requires checkpoint_filepath".into()));
            }
            _ => {}
        }

        let frequency = FrequencyConfig::new(
            raw.statistic_frequency,
            raw.output_frequency,
            raw.time_step_minutes,
            raw.calendar,
            raw.rolling_output,
        )?;

        let settings = AccumulatorSettings {
            threshold: raw.threshold_value,
            percentiles: raw.percentile_list.as_ref().map(PercentileList::resolve).unwrap_or_default(),
            compression: raw.compression_parameter as f64,
            variance: raw.variance,
            histogram_bins: raw.histogram_bins,
            histogram_range: raw.histogram_range.map(|[low, high]| (low, high)),
        };

        let statistics = dedup(&raw.statistics);
        for &kind in &statistics {
            Accumulator::new(kind, &settings)?;
        }

        Ok(Self {
            statistics,
            variables: dedup(&raw.variables),
            frequency,
            settings,
            bias_correction: raw.bias_correction,
            checkpoint_path: raw.checkpoint_filepath,
            save_path: raw.save_filepath,
            checkpoint_every: raw.checkpoint_every,
            max_gap_steps: raw.max_gap_steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({
            "statistics": ["mean"],
            "statistic_frequency": "daily",
            "output_frequency": "daily",
            "time_step_minutes": 60,
            "variables": ["tas"],
            "bias_correction": false
        })
    }

    fn with(key: &str, value: serde_json::Value) -> serde_json::Value {
        let mut config = base();
        config[key] = value;
        config
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_value(base()).unwrap();
        assert_eq!(config.statistics(), &[StatKind::Mean]);
        assert_eq!(config.settings().compression, 100.0);
        assert_eq!(config.settings().variance, VarianceMode::Sample);
        assert_eq!(config.frequency().calendar(), Calendar::Gregorian);
        assert!(!config.frequency().rolling_output());
        assert!(config.checkpoint_path().is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = EngineConfig::from_value(with("statistics_frequency", json!("daily"))).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(err.to_string().contains("statistics_frequency"), "{}", err);
    }

    #[test]
    fn test_missing_mandatory_key() {
        let mut config = base();
        config.as_object_mut().unwrap().remove("time_step_minutes");
        let err = EngineConfig::from_value(config).unwrap_err();
        assert!(err.to_string().contains("time_step_minutes"), "{}", err);
    }

    #[test]
    fn test_cross_field_rules() {
        assert!(EngineConfig::from_value(with("statistics", json!(["threshold"]))).is_err());
        assert!(EngineConfig::from_value(with("statistics", json!(["percentile"]))).is_err());
        assert!(EngineConfig::from_value(with("statistics", json!(["bias_corrected_mean"]))).is_err());
        assert!(EngineConfig::from_value(with("statistics", json!([]))).is_err());
        assert!(EngineConfig::from_value(with("output_frequency", json!("hourly"))).is_err());
        assert!(EngineConfig::from_value(with("checkpoint_every", json!(10))).is_err());
        assert!(EngineConfig::from_value(with("compression_parameter", json!(0))).is_err());
        assert!(EngineConfig::from_value(with("percentile_list", json!([50.0]))).is_ok());
    }

    #[test]
    fn test_whole_distribution_percentiles() {
        let mut config = with("statistics", json!(["percentile"]));
        config["percentile_list"] = json!(["all"]);
        let config = EngineConfig::from_value(config).unwrap();
        let percentiles = &config.settings().percentiles;
        assert_eq!(percentiles.len(), 100);
        assert_eq!(percentiles.first(), Some(&0.0));
        assert_eq!(percentiles.last(), Some(&99.0));

        let mut bad = with("statistics", json!(["percentile"]));
        bad["percentile_list"] = json!(["most"]);
        assert!(EngineConfig::from_value(bad).is_err());
    }

    #[test]
    fn test_histogram_options() {
        let config = EngineConfig::from_value(with("statistics", json!(["histogram"]))).unwrap();
        assert_eq!(config.settings().histogram_bins, 10);
        assert_eq!(config.settings().histogram_range, None);

        let mut ranged = with("statistics", json!(["histogram"]));
        ranged["histogram_bins"] = json!(5);
        ranged["histogram_range"] = json!([0.0, 50.0]);
        let config = EngineConfig::from_value(ranged).unwrap();
        assert_eq!(config.settings().histogram_bins, 5);
        assert_eq!(config.settings().histogram_range, Some((0.0, 50.0)));

        let mut empty = with("statistics", json!(["histogram"]));
        empty["histogram_bins"] = json!(0);
        assert!(EngineConfig::from_value(empty).is_err());
    }

    #[test]
    fn test_duplicates_collapse() {
        let mut config = with("statistics", json!(["mean", "var", "mean", "max"]));
        config["variables"] = json!(["tas", "pr", "tas"]);
        let config = EngineConfig::from_value(config).unwrap();
        assert_eq!(config.statistics(), &[StatKind::Mean, StatKind::Variance, StatKind::Max]);
        assert_eq!(config.variables(), &["tas".to_string(), "pr".to_string()]);
    }
}
