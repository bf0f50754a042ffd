use chrono::NaiveDateTime;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::bits;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Polarity {
    Min,
    Max,
}

/// Per-element running extreme and the time step it was seen at
///
/// NaN marks a cell that has not yet seen a finite value. Ties keep the
/// earliest timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ExtremeState {
    polarity: Polarity,
    #[serde(with = "bits::f64_vec")]
    values: Vec<f64>,
    timings: Vec<Option<NaiveDateTime>>,
}

impl ExtremeState {
    pub fn new(polarity: Polarity) -> Self {
        Self {
            polarity,
            values: Vec::new(),
            timings: Vec::new(),
        }
    }

    pub fn init(&mut self, len: usize) {
        self.values = vec![f64::NAN; len];
        self.timings = vec![None; len];
    }

    pub fn update(&mut self, values: &ArrayD<f64>, timestamp: NaiveDateTime) {
        let polarity = self.polarity;
        for ((current, timing), &v) in self.values.iter_mut().zip(self.timings.iter_mut()).zip(values.iter()) {
            if !v.is_finite() {
                continue;
            }
            let replace = current.is_nan()
                || match polarity {
                    Polarity::Min => v < *current,
                    Polarity::Max => v > *current,
                };
            if replace {
                *current = v;
                *timing = Some(timestamp);
            }
        }
    }

    pub fn finalize(&self) -> (Vec<f64>, Vec<Option<NaiveDateTime>>) {
        (self.values.clone(), self.timings.clone())
    }
}
