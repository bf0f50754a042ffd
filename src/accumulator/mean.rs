use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::bits;

/// Per-element running sum and valid count
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct MeanState {
    #[serde(with = "bits::f64_vec")]
    sums: Vec<f64>,
    counts: Vec<u64>,
}

impl MeanState {
    pub fn init(&mut self, len: usize) {
        self.sums = vec![0.0; len];
        self.counts = vec![0; len];
    }

    pub fn update(&mut self, values: &ArrayD<f64>) {
        for ((sum, count), &v) in self.sums.iter_mut().zip(self.counts.iter_mut()).zip(values.iter()) {
            if v.is_finite() {
                *sum += v;
                *count += 1;
            }
        }
    }

    pub fn finalize(&self) -> Vec<f64> {
        self.sums
            .iter()
            .zip(&self.counts)
            .map(|(&sum, &count)| if count == 0 { f64::NAN } else { sum / count as f64 })
            .collect()
    }
}

/// Per-element weighted sum and weight total, fed with bias-corrected values
///
/// The weights are the ones that blended the correction, so a value the
/// corrector left alone (weight zero) carries no weight here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct WeightedMeanState {
    #[serde(with = "bits::f64_vec")]
    sums: Vec<f64>,
    #[serde(with = "bits::f64_vec")]
    weights: Vec<f64>,
}

impl WeightedMeanState {
    pub fn init(&mut self, len: usize) {
        self.sums = vec![0.0; len];
        self.weights = vec![0.0; len];
    }

    /// Absent weights count as 1; non-finite or negative weights drop the element.
    pub fn update(&mut self, values: &ArrayD<f64>, weights: Option<&ArrayD<f64>>) {
        let cells = self.sums.iter_mut().zip(self.weights.iter_mut()).zip(values.iter());
        match weights {
            Some(weights) => {
                for (((sum, total), &v), &w) in cells.zip(weights.iter()) {
                    if v.is_finite() && w.is_finite() && w >= 0.0 {
                        *sum += w * v;
                        *total += w;
                    }
                }
            }
            None => {
                for ((sum, total), &v) in cells {
                    if v.is_finite() {
                        *sum += v;
                        *total += 1.0;
                    }
                }
            }
        }
    }

    pub fn finalize(&self) -> Vec<f64> {
        self.sums
            .iter()
            .zip(&self.weights)
            .map(|(&sum, &total)| if total > 0.0 { sum / total } else { f64::NAN })
            .collect()
    }
}
