//! Running moments (count, mean, sum of squared deviations)
//!
//! Computes streaming moments using Welford's numerically stable online
//! algorithm. Supports merging with Chan et al.'s parallel update.

use serde::{Deserialize, Serialize};

use crate::bits;
use crate::error::Result;
use crate::traits::Sketch;

/// How the sum of squared deviations is normalised
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceMode {
    /// Divide by `n - 1` (Bessel's correction)
    #[default]
    Sample,
    /// Divide by `n`
    Population,
}

/// Running moments using Welford's algorithm
///
/// Tracks count, mean and M2 in O(1) memory. Avoids the catastrophic
/// cancellation of the naive sum-of-squares formula, which matters for
/// fields like surface pressure where the mean dwarfs the spread.
///
/// # Example
///
/// ```
/// use onepass::statistics::{RunningMoments, VarianceMode};
///
/// let mut moments = RunningMoments::new();
///
/// for value in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
///     moments.add(value);
/// }
///
/// assert!((moments.mean() - 5.0).abs() < 1e-12);
/// assert!((moments.variance(VarianceMode::Population) - 4.0).abs() < 1e-12);
/// assert!((moments.variance(VarianceMode::Sample) - 32.0 / 7.0).abs() < 1e-12);
/// ```
///
/// # Merging
///
/// ```
/// use onepass::statistics::RunningMoments;
/// use onepass::traits::Sketch;
///
/// let mut first = RunningMoments::new();
/// let mut second = RunningMoments::new();
///
/// for v in [1.0, 2.0, 3.0] {
///     first.add(v);
/// }
/// for v in [4.0, 5.0, 6.0] {
///     second.add(v);
/// }
///
/// first.merge(&second).unwrap();
/// assert!((first.mean() - 3.5).abs() < 1e-12);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMoments {
    /// Number of values seen
    count: u64,
    /// Running mean
    #[serde(with = "bits::float")]
    mean: f64,
    /// Sum of squared differences from mean (M2 in Welford's algorithm)
    #[serde(with = "bits::float")]
    m2: f64,
}

impl RunningMoments {
    /// Create a new empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value
    ///
    /// Non-finite values are ignored to prevent poisoning the moments.
    pub fn add(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }

        self.count += 1;

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Number of values absorbed
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean of the values, NaN when empty
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Variance under the given normalisation
    ///
    /// NaN when empty. A single sample has zero sample variance rather than
    /// a division by zero.
    pub fn variance(&self, mode: VarianceMode) -> f64 {
        match (self.count, mode) {
            (0, _) => f64::NAN,
            (1, VarianceMode::Sample) => 0.0,
            (n, VarianceMode::Sample) => self.m2 / (n - 1) as f64,
            (n, VarianceMode::Population) => self.m2 / n as f64,
        }
    }

    /// Standard deviation under the given normalisation
    pub fn stddev(&self, mode: VarianceMode) -> f64 {
        self.variance(mode).sqrt()
    }

    /// Merge with another accumulator using Chan et al.'s parallel algorithm
    pub fn merge_moments(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }

        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let combined_count = self.count + other.count;
        let delta = other.mean - self.mean;

        let combined_mean = self.mean + delta * (other.count as f64 / combined_count as f64);
        let combined_m2 = self.m2
            + other.m2
            + delta * delta * (self.count as f64 * other.count as f64 / combined_count as f64);

        self.count = combined_count;
        self.mean = combined_mean;
        self.m2 = combined_m2;
    }
}

impl Sketch for RunningMoments {
    type Item = f64;

    fn update(&mut self, item: &Self::Item) {
        self.add(*item);
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        self.merge_moments(other);
        Ok(())
    }

    fn clear(&mut self) {
        *self = Self::new();
    }

    fn size_bytes(&self) -> usize {
        core::mem::size_of::<Self>()
    }

    fn count(&self) -> u64 {
        self.count
    }
}
