//! # onepass
//!
//! One-pass streaming statistics over periodically arriving gridded data.
//!
//! onepass summarises time-stepped, multi-dimensional fields into coarser
//! statistics without keeping the history in memory. Every statistic is
//! updated online and finalized when its bucket (a day, a month, a
//! quarter...) is complete.
//!
//! ## Features
//!
//! - **Statistics**: mean, variance, standard deviation, min/max with
//!   timings, threshold exceedance, percentiles and histograms (t-digest),
//!   raw passthrough and bias-corrected mean
//! - **Calendars**: Gregorian with leap years, or fixed 365-day years
//! - **Output cadence**: batched into coarser output periods, or rolling
//!   provisional results at finer output boundaries
//! - **Checkpoints**: bit-exact, atomically written, validated on resume
//! - **Numerical stability**: Welford updates for the second moment
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use ndarray::{ArrayD, IxDyn};
//! use onepass::prelude::*;
//!
//! let config = EngineConfig::from_json(r#"{
//!     "statistics": ["mean", "max"],
//!     "statistic_frequency": "daily",
//!     "output_frequency": "daily",
//!     "time_step_minutes": 60,
//!     "variables": ["tas"],
//!     "bias_correction": false
//! }"#).unwrap();
//! let mut engine = Engine::new(config).unwrap();
//!
//! let day = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
//! let mut sink = MemorySink::new();
//! for hour in 0..24 {
//!     let values = ArrayD::from_shape_vec(IxDyn(&[2]), vec![hour as f64, 1.0]).unwrap();
//!     let increment = DataIncrement::with_dims("tas", values, day.and_hms_opt(hour, 0, 0).unwrap(), ["site"]).unwrap();
//!     engine.ingest_to(&increment, &mut sink).unwrap();
//! }
//!
//! let results = sink.into_results();
//! assert_eq!(results.len(), 2);
//! assert!(results.iter().all(|r| r.is_complete()));
//! ```
//!
//! ## Checkpointing
//!
//! ```rust
//! use onepass::prelude::*;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = EngineConfig::from_value(serde_json::json!({
//!     "statistics": ["variance"],
//!     "statistic_frequency": "monthly",
//!     "output_frequency": "monthly",
//!     "time_step_minutes": 360,
//!     "variables": ["psl"],
//!     "bias_correction": false,
//!     "checkpoint_filepath": dir.path(),
//! })).unwrap();
//!
//! let mut engine = Engine::new(config.clone()).unwrap();
//! // ... ingest ...
//! engine.shutdown().unwrap();
//!
//! let mut resumed = Engine::new(config).unwrap();
//! assert!(resumed.resume().unwrap());
//! ```

pub mod accumulator;
pub mod bias;
pub(crate) mod bits;
pub mod buckets;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod increment;
pub mod pipeline;
pub mod quantiles;
pub mod result;
pub mod sink;
pub mod statistics;
pub mod traits;

pub mod prelude {
    pub use crate::accumulator::{Accumulator, AccumulatorSettings, StatKind};
    pub use crate::bias::{BiasCorrector, BiasMethod};
    pub use crate::buckets::{Bucket, Calendar, Frequency, FrequencyConfig, FrequencyManager};
    pub use crate::checkpoint::{CheckpointRecord, CheckpointStore};
    pub use crate::config::{EngineConfig, PercentileList, RawConfig};
    pub use crate::error::{Error, Result};
    pub use crate::increment::DataIncrement;
    pub use crate::pipeline::{Engine, Pipeline, PipelineState};
    pub use crate::quantiles::TDigest;
    pub use crate::result::{StatResult, StatValue};
    pub use crate::sink::{JsonLinesSink, MemorySink, ResultSink};
    pub use crate::statistics::{RunningMoments, VarianceMode};
    pub use crate::traits::*;
}

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use increment::DataIncrement;
pub use pipeline::Engine;
pub use result::{StatResult, StatValue};
