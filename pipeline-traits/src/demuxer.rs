//! Demuxer contract consumed by the pipeline core.
//!
//! A demuxer parses a media container and exposes per-track elementary
//! streams plus timing metadata. The pipeline borrows the demuxer for the
//! whole playback session and is the only component that drives it; the
//! demuxer talks back exclusively through the [`DemuxerHost`] it was handed at
//! initialization time.

use crate::error::PipelineError;
use crate::error::PipelineResult;
use crate::types::{BufferedTimeRanges, DemuxerStream, StreamType, TextTrackConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Host surface the pipeline exposes to a demuxer.
///
/// Implementations are handed to [`Demuxer::initialize`] and may be called
/// from any execution context the demuxer runs on; the pipeline re-marshals
/// each call onto its own context before mutating state.
pub trait DemuxerHost: Send + Sync {
    /// The set of buffered time ranges changed (data arrived or was evicted).
    fn on_buffered_ranges_changed(&self, ranges: BufferedTimeRanges);

    /// The container reported a (new) total duration.
    fn set_duration(&self, duration: Duration);

    /// The demuxer hit an unrecoverable error outside of a pipeline-driven
    /// call.
    fn on_demuxer_error(&self, error: PipelineError);

    /// A text stream appeared mid-session.
    fn add_text_stream(&self, stream: DemuxerStream, config: TextTrackConfig);

    /// A previously added text stream went away.
    fn remove_text_stream(&self, stream: DemuxerStream);
}

/// Contract for stream demultiplexers.
///
/// All driving calls come from the pipeline context; implementations may use
/// interior mutability and their own worker contexts internally.
#[async_trait]
pub trait Demuxer: Send + Sync {
    /// Open the container and discover its streams.
    ///
    /// The demuxer keeps `host` for the rest of the session and reports
    /// buffered-range/duration updates through it. Resolves once stream
    /// discovery has finished.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DemuxerOpenFailed`] when the container cannot
    /// be opened or parsed.
    async fn initialize(&self, host: Arc<dyn DemuxerHost>) -> PipelineResult<()>;

    /// Reposition all streams to `time`.
    async fn seek(&self, time: Duration) -> PipelineResult<()>;

    /// Stop the demuxer. After this returns no further host callbacks may be
    /// issued.
    fn stop(&self);

    /// Fetch the stream of the given type, when present.
    fn get_stream(&self, stream_type: StreamType) -> Option<DemuxerStream>;

    /// Earliest presentation timestamp in the media. Seeks are clamped to
    /// this value.
    fn start_time(&self) -> Duration;

    /// Offset of the media timeline, zero for non-live content.
    fn timeline_offset(&self) -> Duration;
}
