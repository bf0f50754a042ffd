//! Calibration transform applied before accumulation
//!
//! A [`BiasCorrector`] holds per-element calibration factors for one
//! variable and adjusts each incoming array before it reaches any
//! accumulator. It is stateless beyond its calibration.
//!
//! Per-element weights in [0, 1] blend the raw and fully corrected value:
//! `corrected = v + w * (adjusted(v) - v)`. Absent weights mean full
//! correction; a zero weight leaves the value untouched.
//!
//! The same weights then reach the accumulators. `bias_corrected_mean`
//! averages with them, so an element with zero weight is uncorrected for
//! every other statistic and absent from `bias_corrected_mean`.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::bits;
use crate::error::{Error, Result};

/// How calibration factors are applied
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasMethod {
    /// `v + factor`
    Additive,
    /// `v * factor`
    Multiplicative,
}

/// Per-element bias correction for one variable
///
/// # Example
///
/// ```
/// use ndarray::{ArrayD, IxDyn};
/// use onepass::bias::{BiasCorrector, BiasMethod};
///
/// let factors = ArrayD::from_shape_vec(IxDyn(&[2]), vec![1.0, -1.0]).unwrap();
/// let corrector = BiasCorrector::new("tas", BiasMethod::Additive, factors);
///
/// let values = ArrayD::from_shape_vec(IxDyn(&[2]), vec![10.0, 10.0]).unwrap();
/// let corrected = corrector.correct(&values, None).unwrap();
/// assert_eq!(corrected.as_slice().unwrap(), &[11.0, 9.0]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiasCorrector {
    variable: String,
    method: BiasMethod,
    #[serde(with = "bits::array")]
    factors: ArrayD<f64>,
    lower_threshold: Option<f64>,
    non_negative: bool,
}

impl BiasCorrector {
    pub fn new(variable: impl Into<String>, method: BiasMethod, factors: ArrayD<f64>) -> Self {
        Self {
            variable: variable.into(),
            method,
            factors,
            lower_threshold: None,
            non_negative: false,
        }
    }

    /// Values below `threshold` pass through uncorrected
    pub fn with_lower_threshold(mut self, threshold: f64) -> Self {
        self.lower_threshold = Some(threshold);
        self
    }

    /// Clamp corrected values at zero, e.g. for precipitation
    pub fn non_negative(mut self, clamp: bool) -> Self {
        self.non_negative = clamp;
        self
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn method(&self) -> BiasMethod {
        self.method
    }

    pub fn factors(&self) -> &ArrayD<f64> {
        &self.factors
    }

    fn unavailable(&self, reason: String) -> Error {
        Error::BiasCorrectionUnavailable {
            variable: self.variable.clone(),
            reason,
        }
    }

    /// Corrected copy of `values`.
    ///
    /// Non-finite values pass through for the accumulators to ignore. A
    /// grid shape the calibration does not cover, or a NaN factor for an
    /// element that needs correcting, fails with `BiasCorrectionUnavailable`.
    pub fn correct(&self, values: &ArrayD<f64>, weights: Option<&ArrayD<f64>>) -> Result<ArrayD<f64>> {
        if values.shape() != self.factors.shape() {
            return Err(self.unavailable(format!(
                "calibration covers shape {:?}, data has shape {:?}",
                self.factors.shape(),
                values.shape()
            )));
        }
        if let Some(weights) = weights {
            if weights.shape() != values.shape() {
                return Err(Error::ShapeMismatch {
                    expected: values.shape().to_vec(),
                    found: weights.shape().to_vec(),
                });
            }
        }

        let full;
        let weights = match weights {
            Some(weights) => weights,
            None => {
                full = ArrayD::ones(values.raw_dim());
                &full
            }
        };

        let mut corrected = Vec::with_capacity(values.len());
        let cells = values.iter().zip(self.factors.iter()).zip(weights.iter());
        for (index, ((&v, &factor), &weight)) in cells.enumerate() {
            corrected.push(self.correct_one(v, factor, weight, index)?);
        }

        ArrayD::from_shape_vec(values.raw_dim(), corrected).map_err(|e| self.unavailable(e.to_string()))
    }

    fn correct_one(&self, v: f64, factor: f64, weight: f64, index: usize) -> Result<f64> {
        let weight = if weight.is_finite() { weight.clamp(0.0, 1.0) } else { 0.0 };
        if !v.is_finite() || weight == 0.0 {
            return Ok(v);
        }
        if matches!(self.lower_threshold, Some(t) if v < t) {
            return Ok(v);
        }
        if !factor.is_finite() {
            return Err(self.unavailable(format!("no calibration factor for element {}", index)));
        }

        let adjusted = match self.method {
            BiasMethod::Additive => v + factor,
            BiasMethod::Multiplicative => v * factor,
        };
        let mut out = v + weight * (adjusted - v);
        if self.non_negative {
            out = out.max(0.0);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn row(values: &[f64]) -> ArrayD<f64> {
        ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap()
    }

    #[test]
    fn test_multiplicative_with_weights() {
        let corrector = BiasCorrector::new("pr", BiasMethod::Multiplicative, row(&[2.0, 2.0, 2.0]));
        let out = corrector
            .correct(&row(&[1.0, 1.0, 1.0]), Some(&row(&[1.0, 0.5, 0.0])))
            .unwrap();
        assert_eq!(out.as_slice().unwrap(), &[2.0, 1.5, 1.0]);
    }

    #[test]
    fn test_lower_threshold_and_clamp() {
        let corrector = BiasCorrector::new("pr", BiasMethod::Additive, row(&[-5.0, -5.0]))
            .with_lower_threshold(1.0)
            .non_negative(true);
        let out = corrector.correct(&row(&[0.5, 3.0]), None).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[0.5, 0.0]);
    }

    #[test]
    fn test_missing_factor_is_fatal() {
        let corrector = BiasCorrector::new("tas", BiasMethod::Additive, row(&[1.0, f64::NAN]));
        let err = corrector.correct(&row(&[1.0, 1.0]), None).unwrap_err();
        assert!(matches!(err, Error::BiasCorrectionUnavailable { .. }));
        assert!(err.to_string().contains("element 1"));

        // uncovered elements that need no correction are fine
        let out = corrector.correct(&row(&[1.0, f64::NAN]), None).unwrap();
        assert_eq!(out[[0]], 2.0);
        assert!(out[[1]].is_nan());
    }

    #[test]
    fn test_shape_not_covered() {
        let corrector = BiasCorrector::new("tas", BiasMethod::Additive, row(&[1.0, 1.0]));
        assert!(matches!(
            corrector.correct(&row(&[1.0, 1.0, 1.0]), None),
            Err(Error::BiasCorrectionUnavailable { .. })
        ));
    }
}
