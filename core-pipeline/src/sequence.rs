//! # Serial Task Queue
//!
//! Runs an ordered list of asynchronous steps, stopping at the first failure.
//!
//! ## Overview
//!
//! Seek, suspend, and resume are each implemented as one logical, cancellable
//! sequence of asynchronous steps (pause text track, flush renderer, flush
//! text track, seek demuxer, ...). [`SerialTaskQueue`] holds the remaining
//! steps as plain values, which makes cancellation trivially safe: dropping
//! the queue (or the future returned by [`SerialTaskQueue::run`]) before
//! completion means the remaining steps never execute and no completion is
//! ever observed. `stop()` relies on exactly that.

use futures::future::BoxFuture;
use pipeline_traits::PipelineResult;
use std::collections::VecDeque;
use tracing::debug;

/// A single asynchronous step: invoked once, resolves with a step status.
pub type SequenceStep = Box<dyn FnOnce() -> BoxFuture<'static, PipelineResult<()>> + Send>;

/// An ordered list of asynchronous steps with first-error-wins semantics.
pub struct SerialTaskQueue {
    steps: VecDeque<SequenceStep>,
}

impl SerialTaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
        }
    }

    /// Append a step to the end of the queue.
    pub fn push<F, Fut>(&mut self, step: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = PipelineResult<()>> + Send + 'static,
    {
        self.steps.push_back(Box::new(move || Box::pin(step())));
    }

    /// Number of steps not yet started.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if no steps remain.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the steps in order.
    ///
    /// Resolves with the first non-success status seen, without starting any
    /// later step, or with `Ok(())` once every step has succeeded. Dropping
    /// the returned future cancels the in-flight step and discards the rest.
    pub async fn run(mut self) -> PipelineResult<()> {
        let total = self.steps.len();
        let mut index = 0usize;
        while let Some(step) = self.steps.pop_front() {
            index += 1;
            debug!(step = index, total, "running sequence step");
            step().await?;
        }
        Ok(())
    }
}

impl Default for SerialTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
