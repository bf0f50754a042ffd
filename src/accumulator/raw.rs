use chrono::NaiveDateTime;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::bits;

/// One received time step, kept verbatim
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    pub timestamp: NaiveDateTime,
    #[serde(with = "bits::array")]
    pub values: ArrayD<f64>,
}

/// Ordered copies of every increment in the bucket
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct RawState {
    entries: Vec<RawEntry>,
}

impl RawState {
    pub fn init(&mut self) {
        self.entries.clear();
    }

    pub fn reserve(&mut self, increments: usize) {
        self.entries.reserve(increments.saturating_sub(self.entries.len()));
    }

    pub fn update(&mut self, values: &ArrayD<f64>, timestamp: NaiveDateTime) {
        self.entries.push(RawEntry {
            timestamp,
            values: values.clone(),
        });
    }

    pub fn finalize(&self) -> Vec<RawEntry> {
        self.entries.clone()
    }
}
