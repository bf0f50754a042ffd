use chrono::NaiveDateTime;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::accumulator::{Accumulator, AccumulatorSettings, StatKind};
use crate::buckets::{Bucket, FrequencyManager};
use crate::error::{Error, Result};
use crate::increment::DataIncrement;
use crate::result::{StatResult, StatValue};

/// Where a pipeline is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No bucket open
    Idle,
    /// State was restored from a checkpoint, no live increment yet
    Resuming,
    /// A bucket is open and absorbing increments
    Accumulating,
    /// A bucket is being finalized and emitted
    Flushing,
}

/// One (variable, statistic kind) stream: its accumulator, active bucket,
/// cursor and results waiting for their output period to close.
///
/// Pipelines share no state with each other; the frequency manager is
/// passed in on every call.
#[derive(Clone, Debug, PartialEq)]
pub struct Pipeline {
    pub(crate) variable: String,
    pub(crate) kind: StatKind,
    pub(crate) dims: Vec<String>,
    pub(crate) accumulator: Accumulator,
    pub(crate) bucket: Option<Bucket>,
    /// Timestamp of the last absorbed increment
    pub(crate) cursor: Option<NaiveDateTime>,
    /// Batched results for `pending_period`, not yet emitted
    pub(crate) pending: Vec<StatResult>,
    pub(crate) pending_period: Option<(NaiveDateTime, NaiveDateTime)>,
    pub(crate) state: PipelineState,
    pub(crate) max_gap_steps: Option<u32>,
}

impl Pipeline {
    pub fn new(
        variable: impl Into<String>,
        kind: StatKind,
        settings: &AccumulatorSettings,
        max_gap_steps: Option<u32>,
    ) -> Result<Self> {
        Ok(Self {
            variable: variable.into(),
            kind,
            dims: Vec::new(),
            accumulator: Accumulator::new(kind, settings)?,
            bucket: None,
            cursor: None,
            pending: Vec::new(),
            pending_period: None,
            state: PipelineState::Idle,
            max_gap_steps,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn kind(&self) -> StatKind {
        self.kind
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn bucket(&self) -> Option<&Bucket> {
        self.bucket.as_ref()
    }

    pub fn cursor(&self) -> Option<NaiveDateTime> {
        self.cursor
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Results held until their output period closes
    pub fn pending(&self) -> &[StatResult] {
        &self.pending
    }

    /// Feed one increment.
    ///
    /// `values` replaces the increment's own values when a bias correction
    /// was applied upstream. Returns every result that became ready.
    /// Fatal errors carry the variable, kind and bucket.
    pub fn ingest(
        &mut self,
        manager: &FrequencyManager,
        increment: &DataIncrement,
        values: Option<&ArrayD<f64>>,
    ) -> Result<Vec<StatResult>> {
        let mut out = Vec::new();
        let values = values.unwrap_or_else(|| increment.values());
        match self.advance(manager, increment, values, &mut out) {
            Ok(()) => Ok(out),
            Err(e) => {
                let label = match &self.bucket {
                    Some(bucket) => bucket.label(),
                    None => increment.timestamp().to_string(),
                };
                Err(e.in_pipeline(&self.variable, self.kind, label))
            }
        }
    }

    fn advance(
        &mut self,
        manager: &FrequencyManager,
        increment: &DataIncrement,
        values: &ArrayD<f64>,
        out: &mut Vec<StatResult>,
    ) -> Result<()> {
        let timestamp = increment.timestamp();
        self.accumulator.check_shape(values.shape())?;
        let placement = manager.place(timestamp)?;

        let starting = self.cursor.is_none();
        if let Some(cursor) = self.cursor {
            if timestamp <= cursor {
                let current = manager.place(cursor)?;
                if timestamp < current.start {
                    return Err(Error::OutOfOrder {
                        timestamp,
                        bucket_start: current.start,
                    });
                }
                debug!(
                    variable = %self.variable,
                    kind = %self.kind,
                    %timestamp,
                    "increment already absorbed, skipping"
                );
                return Ok(());
            }
            let missing = manager.missing_steps(cursor, timestamp, self.max_gap_steps)?;
            if missing > 0 {
                warn!(
                    variable = %self.variable,
                    kind = %self.kind,
                    previous = %cursor,
                    next = %timestamp,
                    missing,
                    "gap in input stream"
                );
            }
        }

        if let (Some(cursor), Some(bucket)) = (self.cursor, &self.bucket) {
            for period in manager.skipped_boundaries(cursor, timestamp, bucket.end)? {
                out.push(self.provisional(period)?);
            }
        }

        if self.bucket.as_ref().is_some_and(|b| timestamp >= b.end) {
            self.flush_incomplete(manager, out)?;
        }

        let mut bucket = self
            .bucket
            .take()
            .unwrap_or_else(|| manager.open_bucket(&placement));
        if bucket.absorbed == 0 {
            self.accumulator.reserve(bucket.expected as usize);
        }
        let skipped = match bucket.last {
            Some(last) => manager.missing_steps(last, timestamp, None),
            None => Ok(manager.leading_steps(bucket.start, timestamp)),
        };
        let updated = skipped.and_then(|skipped| {
            self.accumulator
                .update(values, increment.weights(), timestamp)
                .map(|()| skipped)
        });
        let skipped = match updated {
            Ok(skipped) => skipped,
            Err(e) => {
                if bucket.absorbed > 0 {
                    self.bucket = Some(bucket);
                }
                return Err(e);
            }
        };
        if self.dims.is_empty() {
            self.dims = self.accumulator.output_dims(increment.dims());
        }

        bucket.absorb(timestamp, skipped, starting, placement.is_final);
        let bucket_end = bucket.end;
        self.bucket = Some(bucket);
        self.cursor = Some(timestamp);
        self.state = PipelineState::Accumulating;

        if placement.is_final {
            self.flush(manager, out)?;
        } else if let Some(period) = manager.rolling_boundary(timestamp, bucket_end)? {
            out.push(self.provisional(period)?);
        }
        Ok(())
    }

    /// Close the active bucket early because a later bucket has begun.
    fn flush_incomplete(&mut self, manager: &FrequencyManager, out: &mut Vec<StatResult>) -> Result<()> {
        if let Some(bucket) = self.bucket.as_mut() {
            if let Some(last) = bucket.last {
                bucket.gaps += manager.leading_steps(last, bucket.end).saturating_sub(1);
            }
            warn!(
                variable = %self.variable,
                kind = %self.kind,
                bucket = %bucket,
                absorbed = bucket.absorbed,
                expected = bucket.expected,
                "flushing incomplete bucket"
            );
        }
        self.flush(manager, out)
    }

    /// Finalize, reset and route the active bucket.
    fn flush(&mut self, manager: &FrequencyManager, out: &mut Vec<StatResult>) -> Result<()> {
        let Some(bucket) = self.bucket.take() else {
            return Ok(());
        };
        self.state = PipelineState::Flushing;

        let value = self.finalized()?;
        self.accumulator.reset();
        debug!(
            variable = %self.variable,
            kind = %self.kind,
            bucket = %bucket,
            complete = bucket.complete,
            "bucket flushed"
        );

        let (output_start, output_end) = if manager.config().rolling_output() {
            (bucket.start, bucket.end)
        } else {
            manager.output_period(bucket.start)?
        };
        let result = StatResult {
            variable: self.variable.clone(),
            kind: self.kind,
            dims: self.dims.clone(),
            bucket,
            provisional: false,
            output_start,
            output_end,
            value,
        };

        if manager.config().rolling_output() {
            out.push(result);
        } else {
            self.batch(result, out);
        }
        self.state = PipelineState::Accumulating;
        Ok(())
    }

    /// Hold `result` until the output period containing its bucket start closes.
    fn batch(&mut self, result: StatResult, out: &mut Vec<StatResult>) {
        let period = (result.output_start, result.output_end);
        if self.pending_period.is_some_and(|p| p != period) {
            out.append(&mut self.pending);
        }
        let closes = result.bucket.end >= period.1;
        self.pending.push(result);
        self.pending_period = Some(period);
        if closes {
            out.append(&mut self.pending);
            self.pending_period = None;
        }
    }

    fn provisional(&self, (output_start, output_end): (NaiveDateTime, NaiveDateTime)) -> Result<StatResult> {
        let bucket = self.bucket.clone().ok_or(Error::EmptyAccumulator)?;
        Ok(StatResult {
            variable: self.variable.clone(),
            kind: self.kind,
            dims: self.dims.clone(),
            bucket,
            provisional: true,
            output_start,
            output_end,
            value: self.finalized()?,
        })
    }

    fn finalized(&self) -> Result<StatValue> {
        match self.accumulator.finalize() {
            Err(Error::EmptyAccumulator) => Ok(StatValue::Empty),
            other => other,
        }
    }

    /// Snapshot of the current bucket without resetting
    pub fn peek(&self) -> Result<Option<StatValue>> {
        if self.bucket.is_none() {
            return Ok(None);
        }
        self.finalized().map(Some)
    }

    /// End of stream: flush the active bucket as-is and release held results.
    pub fn finish(&mut self, manager: &FrequencyManager) -> Result<Vec<StatResult>> {
        let mut out = Vec::new();
        let label = self.bucket.as_ref().map(Bucket::label).unwrap_or_default();
        self.flush(manager, &mut out)
            .map_err(|e| e.in_pipeline(&self.variable, self.kind, label))?;
        out.append(&mut self.pending);
        self.pending_period = None;
        self.state = PipelineState::Idle;
        Ok(out)
    }

    /// Drop the in-progress bucket and everything held back, as if the
    /// stream had never started.
    pub fn abandon(&mut self) {
        if let Some(bucket) = self.bucket.take() {
            warn!(
                variable = %self.variable,
                kind = %self.kind,
                bucket = %bucket,
                "abandoning in-progress bucket"
            );
        }
        self.accumulator.reset();
        self.cursor = None;
        self.pending.clear();
        self.pending_period = None;
        self.state = PipelineState::Idle;
    }
}
