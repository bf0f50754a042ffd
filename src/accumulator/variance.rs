use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::statistics::{RunningMoments, VarianceMode};

/// Per-element Welford moments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct MomentsState {
    cells: Vec<RunningMoments>,
    mode: VarianceMode,
    /// Emit the square root of the variance
    std: bool,
}

impl MomentsState {
    pub fn new(mode: VarianceMode, std: bool) -> Self {
        Self {
            cells: Vec::new(),
            mode,
            std,
        }
    }

    pub fn init(&mut self, len: usize) {
        self.cells = vec![RunningMoments::new(); len];
    }

    pub fn update(&mut self, values: &ArrayD<f64>) {
        for (cell, &v) in self.cells.iter_mut().zip(values.iter()) {
            cell.add(v);
        }
    }

    pub fn finalize(&self) -> Vec<f64> {
        self.cells
            .iter()
            .map(|cell| {
                if self.std {
                    cell.stddev(self.mode)
                } else {
                    cell.variance(self.mode)
                }
            })
            .collect()
    }
}
