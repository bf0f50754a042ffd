use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use super::percentile::absorb;
use crate::bits;
use crate::quantiles::TDigest;

/// One t-digest per element, read back as a binned distribution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct HistogramState {
    #[serde(with = "bits::float")]
    compression: f64,
    bins: usize,
    /// Empty for each element's observed range, else `[low, high]`
    #[serde(with = "bits::f64_vec")]
    range: Vec<f64>,
    digests: Vec<TDigest>,
}

impl HistogramState {
    pub fn new(compression: f64, bins: usize, range: Option<(f64, f64)>) -> Self {
        Self {
            compression,
            bins,
            range: range.map(|(low, high)| vec![low, high]).unwrap_or_default(),
            digests: Vec::new(),
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn init(&mut self, len: usize) {
        self.digests = vec![TDigest::new(self.compression); len];
    }

    pub fn update(&mut self, values: &ArrayD<f64>, weights: Option<&ArrayD<f64>>) {
        absorb(&mut self.digests, values, weights);
    }

    /// Counts and edges, bin-major like percentiles. Elements without data
    /// get NaN for both.
    pub fn finalize(&self) -> (Vec<f64>, Vec<f64>) {
        let range = match self.range.as_slice() {
            [low, high] => Some((*low, *high)),
            _ => None,
        };
        let cells = self.digests.len();
        let mut counts = vec![f64::NAN; self.bins * cells];
        let mut edges = vec![f64::NAN; (self.bins + 1) * cells];

        for (cell, digest) in self.digests.iter().enumerate() {
            let Some((cell_counts, cell_edges)) = digest.histogram(self.bins, range) else {
                continue;
            };
            for (bin, count) in cell_counts.into_iter().enumerate() {
                counts[bin * cells + cell] = count;
            }
            for (bin, edge) in cell_edges.into_iter().enumerate() {
                edges[bin * cells + cell] = edge;
            }
        }
        (counts, edges)
    }
}
