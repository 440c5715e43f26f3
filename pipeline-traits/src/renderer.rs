//! Renderer contract consumed by the pipeline core.
//!
//! A renderer decodes and schedules output for one or more demuxed streams.
//! The pipeline owns its renderer outright and destroys and replaces it
//! wholesale across a suspend/resume cycle (the replacement may be a
//! different implementation, e.g. a different hardware backend).

use crate::demuxer::Demuxer;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{BufferingState, PipelineStatistics, VideoSize};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Opaque decryption context handed through to renderers that support
/// protected content. The pipeline never inspects it.
pub trait CdmContext: Send + Sync {}

/// Client surface the pipeline exposes to a renderer.
///
/// By contract renderers deliver these notifications on the pipeline context,
/// i.e. never concurrently with a pipeline-driven call into the renderer.
pub trait RendererClient: Send + Sync {
    /// The renderer hit an unrecoverable error.
    fn on_error(&self, error: PipelineError);

    /// All streams this renderer is responsible for have reached their end.
    fn on_ended(&self);

    /// Incremental decode statistics. Byte/frame counters are deltas to be
    /// accumulated; memory-usage fields are absolute.
    fn on_statistics_update(&self, stats: PipelineStatistics);

    /// Buffering state crossed a boundary.
    fn on_buffering_state_change(&self, state: BufferingState);

    /// Decode stalled waiting for a decryption key.
    fn on_waiting_for_decryption_key(&self);

    /// The video natural size changed.
    fn on_video_natural_size_change(&self, size: VideoSize);

    /// The video became opaque or transparent.
    fn on_video_opacity_change(&self, opaque: bool);
}

/// Contract for audio/video renderers.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Initialize against the demuxer's streams.
    ///
    /// The renderer keeps `client` for the rest of its life and reports
    /// playback-critical events through it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RendererInitFailed`] when no usable decoder
    /// configuration exists for the exposed streams.
    async fn initialize(
        &self,
        demuxer: Arc<dyn Demuxer>,
        client: Arc<dyn RendererClient>,
    ) -> PipelineResult<()>;

    /// Discard all buffered and in-flight frames. After a flush the renderer
    /// is idle until the next [`Renderer::start_playing_from`].
    async fn flush(&self) -> PipelineResult<()>;

    /// Begin rendering from `time`. Resets any end-of-stream condition.
    fn start_playing_from(&self, time: Duration);

    /// Apply a playback rate. `0.0` freezes rendering without flushing.
    fn set_playback_rate(&self, rate: f64);

    /// Apply a volume in `[0.0, 1.0]`.
    fn set_volume(&self, volume: f32);

    /// Current media time. Must be callable from any context.
    fn media_time(&self) -> Duration;

    /// Attach a decryption context. Completes with an error if the renderer
    /// cannot use it.
    async fn set_cdm(&self, cdm: Arc<dyn CdmContext>) -> PipelineResult<()>;
}
