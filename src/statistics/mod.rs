//! Running moments for streaming data
//!
//! Welford-style accumulation of count, mean and squared deviations in a
//! single pass with constant memory.
//!
//! # Example
//!
//! ```
//! use onepass::statistics::{RunningMoments, VarianceMode};
//!
//! let mut moments = RunningMoments::new();
//!
//! for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
//!     moments.add(value);
//! }
//!
//! assert_eq!(moments.mean(), 3.0);
//! assert_eq!(moments.variance(VarianceMode::Sample), 2.5);
//! ```

mod moments;

pub use moments::{RunningMoments, VarianceMode};
