//! Per-statistic online accumulators
//!
//! An [`Accumulator`] holds the minimal state needed to summarise every
//! increment absorbed since its last reset, for one [`StatKind`]. State is
//! kept per grid element in flat vectors (logical array order), so any
//! array rank works.
//!
//! Non-finite input elements are ignored element by element: they do not
//! advance that element's count, and an element that never saw a finite
//! value finalizes to NaN.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use ndarray::{ArrayD, IxDyn};
//! use onepass::accumulator::{Accumulator, AccumulatorSettings, StatKind};
//!
//! let mut acc = Accumulator::new(StatKind::Mean, &AccumulatorSettings::default()).unwrap();
//! let ts = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//!
//! for v in [1.0, 2.0, 3.0] {
//!     let values = ArrayD::from_elem(IxDyn(&[2]), v);
//!     acc.update(&values, None, ts).unwrap();
//! }
//!
//! let result = acc.finalize().unwrap();
//! assert_eq!(result.values().unwrap().as_slice().unwrap(), &[2.0, 2.0]);
//! ```

mod extreme;
mod histogram;
mod mean;
mod percentile;
mod raw;
mod threshold;
mod variance;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::result::StatValue;
use crate::statistics::VarianceMode;

use extreme::{ExtremeState, Polarity};
use histogram::HistogramState;
use mean::{MeanState, WeightedMeanState};
use percentile::PercentileState;
use raw::RawState;
use threshold::ThresholdState;
use variance::MomentsState;

pub use raw::RawEntry;

/// The statistics the engine can compute
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Mean,
    #[serde(alias = "var")]
    Variance,
    #[serde(alias = "standard_deviation")]
    Std,
    Min,
    Max,
    Raw,
    #[serde(alias = "thresh_exceed")]
    Threshold,
    #[serde(alias = "percentiles")]
    Percentile,
    Histogram,
    BiasCorrectedMean,
}

impl StatKind {
    pub const ALL: [StatKind; 10] = [
        StatKind::Mean,
        StatKind::Variance,
        StatKind::Std,
        StatKind::Min,
        StatKind::Max,
        StatKind::Raw,
        StatKind::Threshold,
        StatKind::Percentile,
        StatKind::Histogram,
        StatKind::BiasCorrectedMean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Mean => "mean",
            StatKind::Variance => "variance",
            StatKind::Std => "std",
            StatKind::Min => "min",
            StatKind::Max => "max",
            StatKind::Raw => "raw",
            StatKind::Threshold => "threshold",
            StatKind::Percentile => "percentile",
            StatKind::Histogram => "histogram",
            StatKind::BiasCorrectedMean => "bias_corrected_mean",
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| Error::InvalidConfig(format!("unknown statistic `{}`", s)))
    }
}

/// Parameters shared by the accumulators of one engine
#[derive(Clone, Debug, PartialEq)]
pub struct AccumulatorSettings {
    pub threshold: Option<f64>,
    pub percentiles: Vec<f64>,
    pub compression: f64,
    pub variance: VarianceMode,
    pub histogram_bins: usize,
    /// Fixed histogram span; each element's observed range when `None`
    pub histogram_range: Option<(f64, f64)>,
}

impl Default for AccumulatorSettings {
    fn default() -> Self {
        Self {
            threshold: None,
            percentiles: Vec::new(),
            compression: 100.0,
            variance: VarianceMode::Sample,
            histogram_bins: 10,
            histogram_range: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum State {
    Mean(MeanState),
    Moments(MomentsState),
    Extreme(ExtremeState),
    Raw(RawState),
    Threshold(ThresholdState),
    Percentile(PercentileState),
    Histogram(HistogramState),
    BiasCorrectedMean(WeightedMeanState),
}

impl State {
    fn init(&mut self, len: usize) {
        match self {
            State::Mean(s) => s.init(len),
            State::Moments(s) => s.init(len),
            State::Extreme(s) => s.init(len),
            State::Raw(s) => s.init(),
            State::Threshold(s) => s.init(len),
            State::Percentile(s) => s.init(len),
            State::Histogram(s) => s.init(len),
            State::BiasCorrectedMean(s) => s.init(len),
        }
    }
}

/// Running state for one statistic of one variable
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    kind: StatKind,
    /// Established by the first update and kept across resets
    shape: Option<Vec<usize>>,
    /// Updates since the last reset
    updates: u64,
    state: State,
}

impl Accumulator {
    /// Create an empty accumulator for `kind`.
    ///
    /// Threshold accumulators need `settings.threshold`; percentile
    /// accumulators need a non-empty percentile list within [0, 100] and a
    /// positive compression. Histograms need at least one bin and, if set,
    /// a finite range with `low < high`.
    pub fn new(kind: StatKind, settings: &AccumulatorSettings) -> Result<Self> {
        let state = match kind {
            StatKind::Mean => State::Mean(MeanState::default()),
            StatKind::Variance => State::Moments(MomentsState::new(settings.variance, false)),
            StatKind::Std => State::Moments(MomentsState::new(settings.variance, true)),
            StatKind::Min => State::Extreme(ExtremeState::new(Polarity::Min)),
            StatKind::Max => State::Extreme(ExtremeState::new(Polarity::Max)),
            StatKind::Raw => State::Raw(RawState::default()),
            StatKind::Threshold => {
                let threshold = settings
                    .threshold
                    .filter(|t| t.is_finite())
                    .ok_or_else(|| Error::InvalidConfig("threshold statistic requires a finite threshold_value".into()))?;
                State::Threshold(ThresholdState::new(threshold))
            }
            StatKind::Percentile => {
                if settings.percentiles.is_empty() {
                    return Err(Error::InvalidConfig("percentile statistic requires a percentile_list".into()));
                }
                if let Some(p) = settings.percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
                    return Err(Error::InvalidConfig(format!("percentile {} is outside [0, 100]", p)));
                }
                check_compression(settings.compression)?;
                State::Percentile(PercentileState::new(settings.compression, settings.percentiles.clone()))
            }
            StatKind::Histogram => {
                check_compression(settings.compression)?;
                if settings.histogram_bins == 0 {
                    return Err(Error::InvalidConfig("histogram_bins must be positive".into()));
                }
                if let Some((low, high)) = settings.histogram_range {
                    if !(low.is_finite() && high.is_finite() && low < high) {
                        return Err(Error::InvalidConfig(format!(
                            "histogram_range [{}, {}] must be finite and increasing",
                            low, high
                        )));
                    }
                }
                State::Histogram(HistogramState::new(
                    settings.compression,
                    settings.histogram_bins,
                    settings.histogram_range,
                ))
            }
            StatKind::BiasCorrectedMean => State::BiasCorrectedMean(WeightedMeanState::default()),
        };

        Ok(Self {
            kind,
            shape: None,
            updates: 0,
            state,
        })
    }

    pub fn kind(&self) -> StatKind {
        self.kind
    }

    pub fn shape(&self) -> Option<&[usize]> {
        self.shape.as_deref()
    }

    /// Updates absorbed since the last reset
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn is_empty(&self) -> bool {
        self.updates == 0
    }

    /// Fails with `ShapeMismatch` if `shape` disagrees with the established shape.
    pub fn check_shape(&self, shape: &[usize]) -> Result<()> {
        match &self.shape {
            Some(expected) if expected.as_slice() != shape => Err(Error::ShapeMismatch {
                expected: expected.clone(),
                found: shape.to_vec(),
            }),
            _ => Ok(()),
        }
    }

    /// Pre-size storage for the number of increments a bucket expects
    pub fn reserve(&mut self, increments: usize) {
        if let State::Raw(raw) = &mut self.state {
            raw.reserve(increments);
        }
    }

    /// Absorb one time step.
    ///
    /// Shapes are checked before any state changes, so a failed update
    /// leaves the accumulator untouched.
    pub fn update(
        &mut self,
        values: &ArrayD<f64>,
        weights: Option<&ArrayD<f64>>,
        timestamp: NaiveDateTime,
    ) -> Result<()> {
        self.check_shape(values.shape())?;
        if let Some(weights) = weights {
            if weights.shape() != values.shape() {
                return Err(Error::ShapeMismatch {
                    expected: values.shape().to_vec(),
                    found: weights.shape().to_vec(),
                });
            }
        }

        if self.shape.is_none() {
            self.shape = Some(values.shape().to_vec());
            self.state.init(values.len());
        }

        match &mut self.state {
            State::Mean(s) => s.update(values),
            State::Moments(s) => s.update(values),
            State::Extreme(s) => s.update(values, timestamp),
            State::Raw(s) => s.update(values, timestamp),
            State::Threshold(s) => s.update(values),
            State::Percentile(s) => s.update(values, weights),
            State::Histogram(s) => s.update(values, weights),
            State::BiasCorrectedMean(s) => s.update(values, weights),
        }
        self.updates += 1;
        Ok(())
    }

    /// Result over everything absorbed since the last reset.
    ///
    /// Never mutates state, so repeated calls return identical results.
    pub fn finalize(&self) -> Result<StatValue> {
        let shape = match &self.shape {
            Some(shape) if self.updates > 0 => shape.as_slice(),
            _ => return Err(Error::EmptyAccumulator),
        };

        let value = match &self.state {
            State::Mean(s) => StatValue::Field {
                values: to_array(shape, s.finalize())?,
            },
            State::Moments(s) => StatValue::Field {
                values: to_array(shape, s.finalize())?,
            },
            State::BiasCorrectedMean(s) => StatValue::Field {
                values: to_array(shape, s.finalize())?,
            },
            State::Extreme(s) => {
                let (values, timings) = s.finalize();
                StatValue::Extreme {
                    values: to_array(shape, values)?,
                    timings: to_array(shape, timings)?,
                }
            }
            State::Threshold(s) => {
                let (counts, frequency) = s.finalize();
                StatValue::Exceedance {
                    threshold: s.threshold(),
                    counts: to_array(shape, counts)?,
                    frequency: to_array(shape, frequency)?,
                }
            }
            State::Percentile(s) => StatValue::Percentiles {
                percentiles: s.percentiles().to_vec(),
                values: to_array(&leading(s.percentiles().len(), shape), s.finalize())?,
            },
            State::Histogram(s) => {
                let (counts, edges) = s.finalize();
                StatValue::Histogram {
                    counts: to_array(&leading(s.bins(), shape), counts)?,
                    edges: to_array(&leading(s.bins() + 1, shape), edges)?,
                }
            }
            State::Raw(s) => StatValue::Raw {
                entries: s.finalize(),
            },
        };
        Ok(value)
    }

    /// Dimension names of the finalized array, given the input dimension names
    pub fn output_dims(&self, dims: &[String]) -> Vec<String> {
        match self.kind {
            StatKind::Percentile => std::iter::once("percentile".to_string())
                .chain(dims.iter().cloned())
                .collect(),
            StatKind::Histogram => std::iter::once("bin".to_string())
                .chain(dims.iter().cloned())
                .collect(),
            _ => dims.to_vec(),
        }
    }

    /// Same kind and parameters, with no data or shape
    pub(crate) fn parameters_match(&self, other: &Accumulator) -> bool {
        let blank = |acc: &Accumulator| {
            let mut acc = acc.clone();
            acc.shape = None;
            acc.reset();
            acc
        };
        blank(self) == blank(other)
    }

    /// Clear accumulated state, keeping kind, parameters and shape
    pub fn reset(&mut self) {
        self.updates = 0;
        let len = self.shape.as_ref().map_or(0, |s| s.iter().product());
        self.state.init(len);
    }
}

fn check_compression(compression: f64) -> Result<()> {
    if compression.is_finite() && compression > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig("compression_parameter must be positive".into()))
    }
}

/// `shape` with a new leading axis of length `len`
fn leading(len: usize, shape: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(shape.len() + 1);
    out.push(len);
    out.extend_from_slice(shape);
    out
}

fn to_array<T>(shape: &[usize], data: Vec<T>) -> Result<ArrayD<T>> {
    let found = data.len();
    ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| Error::ShapeMismatch {
        expected: shape.to_vec(),
        found: vec![found],
    })
}
