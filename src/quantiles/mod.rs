//! Quantile estimation
//!
//! - [`TDigest`]: mergeable quantile sketch with high accuracy at the tails,
//!   supporting weighted inserts
//!
//! # Example
//!
//! ```
//! use onepass::quantiles::TDigest;
//! use onepass::traits::QuantileSketch;
//!
//! let mut digest = TDigest::new(100.0);
//!
//! for value in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0] {
//!     digest.add(value);
//! }
//!
//! let median = digest.median().unwrap();
//! assert!((median - 5.5).abs() < 1e-9);
//! ```

mod tdigest;

pub use tdigest::{Centroid, TDigest};
