//! Pipeline orchestration
//!
//! A [`Pipeline`] runs one (variable, statistic kind) stream through its
//! lifecycle:
//!
//! ```text
//! Idle ──first increment──▶ Accumulating ──final step──▶ Flushing ──▶ Accumulating
//!                              ▲
//! Resuming ──next increment────┘
//! ```
//!
//! - an increment at or before the cursor within the current bucket is
//!   skipped as already seen; one before the current bucket is `OutOfOrder`
//! - an increment past the active bucket's end flushes that bucket as
//!   incomplete before opening the next one
//! - batched output holds results until the output period containing the
//!   bucket start closes; rolling output emits provisional results at each
//!   output boundary inside a bucket
//!
//! The [`Engine`] owns one pipeline per configured pair, applies bias
//! correction and drives checkpointing.

mod engine;
mod stream;

pub use engine::Engine;
pub use stream::{Pipeline, PipelineState};
