use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::bits;

/// Per-element count of values strictly above a threshold, plus valid totals
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ThresholdState {
    #[serde(with = "bits::float")]
    threshold: f64,
    exceed: Vec<u64>,
    totals: Vec<u64>,
}

impl ThresholdState {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            exceed: Vec::new(),
            totals: Vec::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn init(&mut self, len: usize) {
        self.exceed = vec![0; len];
        self.totals = vec![0; len];
    }

    pub fn update(&mut self, values: &ArrayD<f64>) {
        for ((exceed, total), &v) in self.exceed.iter_mut().zip(self.totals.iter_mut()).zip(values.iter()) {
            if v.is_finite() {
                *total += 1;
                if v > self.threshold {
                    *exceed += 1;
                }
            }
        }
    }

    /// Exceedance counts and frequencies (count / valid total, NaN when no valid values)
    pub fn finalize(&self) -> (Vec<u64>, Vec<f64>) {
        let frequency = self
            .exceed
            .iter()
            .zip(&self.totals)
            .map(|(&n, &total)| if total == 0 { f64::NAN } else { n as f64 / total as f64 })
            .collect();
        (self.exceed.clone(), frequency)
    }
}
