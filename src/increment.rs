//! Time-stepped input arrays
//!
//! A [`DataIncrement`] is one time step of one variable: a dimension-labeled
//! `f64` array, its timestamp, and optional per-element weights.

use chrono::NaiveDateTime;
use ndarray::ArrayD;

use crate::error::{Error, Result};

/// One time step of a gridded variable
///
/// Increments are immutable once built; the engine borrows them for the
/// duration of a single update and keeps no reference afterwards.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use ndarray::{ArrayD, IxDyn};
/// use onepass::DataIncrement;
///
/// let timestamp = NaiveDate::from_ymd_opt(2020, 1, 1)
///     .unwrap()
///     .and_hms_opt(0, 0, 0)
///     .unwrap();
/// let values = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0.0; 6]).unwrap();
///
/// let increment = DataIncrement::with_dims("tas", values, timestamp, ["lat", "lon"]).unwrap();
/// assert_eq!(increment.dims(), &["lat", "lon"]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DataIncrement {
    variable: String,
    dims: Vec<String>,
    values: ArrayD<f64>,
    timestamp: NaiveDateTime,
    weights: Option<ArrayD<f64>>,
}

impl DataIncrement {
    /// Build an increment with positional dimension names (`dim_0`, `dim_1`, ...)
    pub fn new(variable: impl Into<String>, values: ArrayD<f64>, timestamp: NaiveDateTime) -> Self {
        let dims = (0..values.ndim()).map(|axis| format!("dim_{}", axis)).collect();
        Self {
            variable: variable.into(),
            dims,
            values,
            timestamp,
            weights: None,
        }
    }

    /// Build an increment with one name per axis
    pub fn with_dims<I, S>(
        variable: impl Into<String>,
        values: ArrayD<f64>,
        timestamp: NaiveDateTime,
        dims: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        if dims.len() != values.ndim() {
            return Err(Error::InvalidConfig(format!(
                "{} dimension names given for a {}-dimensional array",
                dims.len(),
                values.ndim()
            )));
        }
        Ok(Self {
            variable: variable.into(),
            dims,
            values,
            timestamp,
            weights: None,
        })
    }

    /// Attach per-element weights; the weight array must match the value shape
    pub fn with_weights(mut self, weights: ArrayD<f64>) -> Result<Self> {
        if weights.shape() != self.values.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.values.shape().to_vec(),
                found: weights.shape().to_vec(),
            });
        }
        self.weights = Some(weights);
        Ok(self)
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn weights(&self) -> Option<&ArrayD<f64>> {
        self.weights.as_ref()
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::IxDyn;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_positional_dims() {
        let values = ArrayD::zeros(IxDyn(&[2, 2, 3]));
        let increment = DataIncrement::new("pr", values, noon());
        assert_eq!(increment.dims(), &["dim_0", "dim_1", "dim_2"]);
        assert_eq!(increment.shape(), &[2, 2, 3]);
        assert!(increment.weights().is_none());
    }

    #[test]
    fn test_dim_count_must_match() {
        let values = ArrayD::zeros(IxDyn(&[2, 3]));
        let result = DataIncrement::with_dims("pr", values, noon(), ["lat"]);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_weight_shape_must_match() {
        let values = ArrayD::zeros(IxDyn(&[2, 3]));
        let weights = ArrayD::ones(IxDyn(&[3, 2]));
        let result = DataIncrement::new("pr", values, noon()).with_weights(weights);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }
}
