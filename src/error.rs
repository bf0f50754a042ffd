//! Error taxonomy for the accumulation engine
//!
//! Fatal errors carry enough context to identify the stream that failed;
//! the orchestrator wraps them in [`Error::Pipeline`] with the variable,
//! statistic kind and bucket in play. [`Error::EmptyAccumulator`] is the
//! one recoverable variant and never escapes the orchestrator: it is
//! surfaced as an empty result instead.

use chrono::NaiveDateTime;

use crate::accumulator::StatKind;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors produced by accumulators, the frequency manager, the checkpoint
/// store and the orchestrator
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Incoming array shape disagrees with the shape established by the stream
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Finalize was requested before any update since the last reset
    #[error("accumulator has absorbed no data since its last reset")]
    EmptyAccumulator,

    /// Checkpoint was written under a different frequency configuration
    #[error("checkpoint was written for [{found}], engine is configured for [{expected}]")]
    CheckpointConfigMismatch { expected: String, found: String },

    /// Checkpoint document uses a format this build does not read
    #[error("unsupported checkpoint version {found} (this build reads version {expected})")]
    UnsupportedCheckpointVersion { expected: u32, found: u32 },

    /// Calibration data does not cover the incoming values
    #[error("bias correction unavailable for `{variable}`: {reason}")]
    BiasCorrectionUnavailable { variable: String, reason: String },

    /// More time steps are missing than the configured tolerance allows
    #[error("gap of {missing} time steps between {previous} and {next} exceeds the limit of {limit}")]
    GapDetected {
        previous: NaiveDateTime,
        next: NaiveDateTime,
        missing: u64,
        limit: u32,
    },

    /// Increment predates the bucket currently being accumulated
    #[error("increment at {timestamp} arrived after the stream moved on to the bucket starting {bucket_start}")]
    OutOfOrder {
        timestamp: NaiveDateTime,
        bucket_start: NaiveDateTime,
    },

    /// Timestamp cannot be placed on the stream's calendar or time-step grid
    #[error("invalid timestamp {timestamp}: {reason}")]
    InvalidTimestamp {
        timestamp: NaiveDateTime,
        reason: String,
    },

    /// Increment names a variable the engine was not configured for
    #[error("variable `{0}` is not configured")]
    UnknownVariable(String),

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two sketches with different parameters cannot be merged
    #[error("incompatible sketch: expected {expected}, found {found}")]
    IncompatibleSketch { expected: String, found: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A fatal failure inside one (variable, statistic kind) stream
    #[error("{kind} stream for `{variable}` failed in bucket {bucket}: {source}")]
    Pipeline {
        variable: String,
        kind: StatKind,
        bucket: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the identity of the stream it occurred in.
    ///
    /// Already-wrapped errors are returned unchanged.
    pub fn in_pipeline(self, variable: &str, kind: StatKind, bucket: impl Into<String>) -> Self {
        match self {
            Error::Pipeline { .. } => self,
            other => Error::Pipeline {
                variable: variable.to_string(),
                kind,
                bucket: bucket.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through pipeline context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the stream can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.root(), Error::EmptyAccumulator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_context_wraps_once() {
        let err = Error::ShapeMismatch {
            expected: vec![2],
            found: vec![3],
        }
        .in_pipeline("tas", StatKind::Mean, "daily[2020-01-01T00:00:00, 2020-01-02T00:00:00)")
        .in_pipeline("pr", StatKind::Max, "ignored");

        let message = err.to_string();
        assert!(message.contains("mean stream for `tas`"), "{}", message);
        assert!(message.contains("expected [2], found [3]"), "{}", message);
        assert!(matches!(err.root(), Error::ShapeMismatch { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_empty_is_recoverable() {
        assert!(Error::EmptyAccumulator.is_recoverable());
        assert!(Error::EmptyAccumulator
            .in_pipeline("tas", StatKind::Std, "b")
            .is_recoverable());
    }
}
