//! # Shared Playback State
//!
//! Lock-guarded snapshot of playback position, buffered ranges, and decode
//! statistics.
//!
//! ## Overview
//!
//! The state machine is the only writer; the controller reads from arbitrary
//! calling contexts. Every read copies data out under the lock, so no
//! reference into pipeline internals ever escapes. This is the single
//! structure shared across the caller/pipeline context boundary.

use crate::state_machine::PipelineState;
use parking_lot::Mutex;
use pipeline_traits::renderer::Renderer;
use pipeline_traits::{BufferedTimeRanges, PipelineStatistics};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct SharedState {
    pipeline_state: PipelineState,
    buffered_ranges: BufferedTimeRanges,
    loading_progress: bool,
    statistics: PipelineStatistics,
    /// Media time frozen at the moment a suspend began. Present only while
    /// suspending or suspended.
    suspend_time: Option<Duration>,
    /// The live renderer, when one exists. Held here so `media_time()` can
    /// delegate without marshaling onto the pipeline context.
    renderer: Option<Arc<dyn Renderer>>,
    /// Fallback media time while no renderer is live: the position playback
    /// (re)starts from.
    start_time: Duration,
}

/// Cross-context readable record of playback state.
///
/// Mutators are `pub(crate)`: only the state machine writes.
pub struct SharedPlaybackState {
    inner: Mutex<SharedState>,
}

impl SharedPlaybackState {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(SharedState::default()),
        }
    }

    // ========================================================================
    // Reads (any context)
    // ========================================================================

    /// Current state of the playback session.
    pub fn pipeline_state(&self) -> PipelineState {
        self.inner.lock().pipeline_state
    }

    /// Snapshot of the buffered time ranges.
    pub fn buffered_time_ranges(&self) -> BufferedTimeRanges {
        self.inner.lock().buffered_ranges.clone()
    }

    /// One-shot loading flag: `true` if buffered data has grown since the
    /// previous call. Reading clears it.
    pub fn did_loading_progress(&self) -> bool {
        let mut state = self.inner.lock();
        std::mem::take(&mut state.loading_progress)
    }

    /// Snapshot of the accumulated decode statistics.
    pub fn statistics(&self) -> PipelineStatistics {
        self.inner.lock().statistics
    }

    /// Current media time.
    ///
    /// Returns the frozen suspend timestamp while suspending/suspended,
    /// otherwise delegates to the live renderer, otherwise the position the
    /// next playback starts from.
    pub fn media_time(&self) -> Duration {
        let state = self.inner.lock();
        if let Some(time) = state.suspend_time {
            return time;
        }
        match &state.renderer {
            Some(renderer) => renderer.media_time(),
            None => state.start_time,
        }
    }

    // ========================================================================
    // Writes (pipeline context only)
    // ========================================================================

    pub(crate) fn set_pipeline_state(&self, state: PipelineState) {
        self.inner.lock().pipeline_state = state;
    }

    pub(crate) fn set_buffered_ranges(&self, ranges: BufferedTimeRanges) {
        let mut state = self.inner.lock();
        state.buffered_ranges = ranges;
        state.loading_progress = true;
    }

    /// Fold a statistics delta into the totals. Byte and frame counters are
    /// additive; memory-usage fields are absolute and overwritten.
    pub(crate) fn accumulate_statistics(&self, delta: PipelineStatistics) {
        let mut state = self.inner.lock();
        let stats = &mut state.statistics;
        stats.audio_bytes_decoded += delta.audio_bytes_decoded;
        stats.video_bytes_decoded += delta.video_bytes_decoded;
        stats.video_frames_decoded += delta.video_frames_decoded;
        stats.video_frames_dropped += delta.video_frames_dropped;
        stats.audio_memory_usage = delta.audio_memory_usage;
        stats.video_memory_usage = delta.video_memory_usage;
    }

    /// Freeze the reported media time at `time` and zero the memory-usage
    /// statistics; the renderer is about to be destroyed.
    pub(crate) fn enter_suspend(&self, time: Duration) {
        let mut state = self.inner.lock();
        state.suspend_time = Some(time);
        state.start_time = time;
        state.statistics.audio_memory_usage = 0;
        state.statistics.video_memory_usage = 0;
    }

    /// Unfreeze the media time; a new renderer is live again.
    pub(crate) fn exit_suspend(&self) {
        self.inner.lock().suspend_time = None;
    }

    pub(crate) fn set_renderer(&self, renderer: Option<Arc<dyn Renderer>>) {
        self.inner.lock().renderer = renderer;
    }

    pub(crate) fn set_start_time(&self, time: Duration) {
        self.inner.lock().start_time = time;
    }
}
