//! Finalized statistics handed to persistence

use chrono::NaiveDateTime;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::accumulator::{RawEntry, StatKind};
use crate::bits;
use crate::buckets::{Bucket, Frequency};

/// The numeric payload of a finalized statistic
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatValue {
    /// Mean, variance, standard deviation and bias-corrected mean
    Field {
        #[serde(with = "bits::array")]
        values: ArrayD<f64>,
    },
    /// Minimum or maximum with the time step each extreme was seen at
    Extreme {
        #[serde(with = "bits::array")]
        values: ArrayD<f64>,
        timings: ArrayD<Option<NaiveDateTime>>,
    },
    /// Exceedance counts above `threshold` and their frequency among valid values
    Exceedance {
        #[serde(with = "bits::float")]
        threshold: f64,
        counts: ArrayD<u64>,
        #[serde(with = "bits::array")]
        frequency: ArrayD<f64>,
    },
    /// Leading axis indexes `percentiles`
    Percentiles {
        #[serde(with = "bits::f64_vec")]
        percentiles: Vec<f64>,
        #[serde(with = "bits::array")]
        values: ArrayD<f64>,
    },
    /// Binned distribution; `counts` leads with a bin axis, `edges` with
    /// one more entry per element
    Histogram {
        #[serde(with = "bits::array")]
        counts: ArrayD<f64>,
        #[serde(with = "bits::array")]
        edges: ArrayD<f64>,
    },
    /// Every increment of the bucket, in arrival order
    Raw { entries: Vec<RawEntry> },
    /// No data reached the accumulator this period
    Empty,
}

impl StatValue {
    /// The primary value array, if the variant has one
    pub fn values(&self) -> Option<&ArrayD<f64>> {
        match self {
            StatValue::Field { values }
            | StatValue::Extreme { values, .. }
            | StatValue::Percentiles { values, .. }
            | StatValue::Histogram { counts: values, .. } => Some(values),
            StatValue::Exceedance { .. } | StatValue::Raw { .. } | StatValue::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, StatValue::Empty)
    }
}

/// One finalized (or provisional) statistic for one bucket of one variable
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatResult {
    pub variable: String,
    pub kind: StatKind,
    /// Dimension names of the value array
    pub dims: Vec<String>,
    /// Bucket metadata at the time of emission
    pub bucket: Bucket,
    /// Finalized without reset at a rolling output boundary
    pub provisional: bool,
    /// Output period the result was emitted for
    pub output_start: NaiveDateTime,
    pub output_end: NaiveDateTime,
    pub value: StatValue,
}

impl StatResult {
    pub fn start(&self) -> NaiveDateTime {
        self.bucket.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.bucket.end
    }

    pub fn frequency(&self) -> Frequency {
        self.bucket.frequency
    }

    /// The bucket's first increment arrived after the bucket began
    pub fn is_partial(&self) -> bool {
        self.bucket.partial
    }

    /// Every time step the bucket expects was absorbed
    pub fn is_complete(&self) -> bool {
        self.bucket.complete
    }

    pub fn absorbed(&self) -> u64 {
        self.bucket.absorbed
    }

    pub fn expected(&self) -> u64 {
        self.bucket.expected
    }

    pub fn gaps(&self) -> u64 {
        self.bucket.gaps
    }
}
