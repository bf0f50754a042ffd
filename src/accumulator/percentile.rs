use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::bits;
use crate::quantiles::TDigest;
use crate::traits::QuantileSketch;

/// One t-digest per element
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct PercentileState {
    #[serde(with = "bits::float")]
    compression: f64,
    /// Requested percentiles, in [0, 100]
    #[serde(with = "bits::f64_vec")]
    percentiles: Vec<f64>,
    digests: Vec<TDigest>,
}

impl PercentileState {
    pub fn new(compression: f64, percentiles: Vec<f64>) -> Self {
        Self {
            compression,
            percentiles,
            digests: Vec::new(),
        }
    }

    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    pub fn init(&mut self, len: usize) {
        self.digests = vec![TDigest::new(self.compression); len];
    }

    pub fn update(&mut self, values: &ArrayD<f64>, weights: Option<&ArrayD<f64>>) {
        absorb(&mut self.digests, values, weights);
    }

    /// Quantiles laid out percentile-major: `[p0 cells..., p1 cells..., ...]`
    pub fn finalize(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.percentiles.len() * self.digests.len());
        for &p in &self.percentiles {
            let rank = p / 100.0;
            out.extend(
                self.digests
                    .iter()
                    .map(|digest| digest.quantile(rank).unwrap_or(f64::NAN)),
            );
        }
        out
    }
}

/// Insert each element into its own digest; absent weights count as 1
pub(super) fn absorb(digests: &mut [TDigest], values: &ArrayD<f64>, weights: Option<&ArrayD<f64>>) {
    match weights {
        Some(weights) => {
            for ((digest, &v), &w) in digests.iter_mut().zip(values.iter()).zip(weights.iter()) {
                digest.add_weighted(v, w);
            }
        }
        None => {
            for (digest, &v) in digests.iter_mut().zip(values.iter()) {
                digest.add_weighted(v, 1.0);
            }
        }
    }
}
