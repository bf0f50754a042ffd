//! Core traits for streaming summaries
//!
//! The per-cell summaries held by accumulators implement the base [`Sketch`]
//! trait; quantile estimators additionally implement [`QuantileSketch`].

use core::fmt::Debug;

use crate::error::Result;

/// Core trait for all streaming summaries
pub trait Sketch: Clone + Debug {
    /// The type of item this summary processes
    type Item: ?Sized;

    /// Add an item to the summary
    fn update(&mut self, item: &Self::Item);

    /// Merge another summary into this one
    ///
    /// Returns [`Error::IncompatibleSketch`](crate::Error::IncompatibleSketch)
    /// if the two summaries were configured differently.
    fn merge(&mut self, other: &Self) -> Result<()>;

    /// Reset to the empty state
    fn clear(&mut self);

    /// Memory usage in bytes
    fn size_bytes(&self) -> usize;

    /// Number of items processed
    fn count(&self) -> u64;

    /// Check if the summary is empty
    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Quantile estimation sketches
pub trait QuantileSketch: Sketch {
    /// The value type being tracked
    type Value: PartialOrd + Clone;

    /// Add a value to the sketch
    fn add(&mut self, value: Self::Value);

    /// Get quantile value at given rank (0.0 to 1.0)
    ///
    /// rank=0.5 returns the median
    fn quantile(&self, rank: f64) -> Option<Self::Value>;

    /// Get rank of a value (0.0 to 1.0)
    fn rank(&self, value: &Self::Value) -> f64;

    /// Get minimum value seen
    fn min(&self) -> Option<Self::Value>;

    /// Get maximum value seen
    fn max(&self) -> Option<Self::Value>;

    /// Get median (50th percentile)
    fn median(&self) -> Option<Self::Value> {
        self.quantile(0.5)
    }

    /// Get multiple quantiles at once
    fn quantiles(&self, ranks: &[f64]) -> Vec<Option<Self::Value>> {
        ranks.iter().map(|&r| self.quantile(r)).collect()
    }
}
