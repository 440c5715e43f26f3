//! Text renderer contract consumed by the pipeline core.
//!
//! A text renderer sequences subtitle/caption cues for text streams that the
//! demuxer adds and removes dynamically during playback. Unlike the
//! audio/video renderer it is constructed once at start and lives until the
//! pipeline stops.

use crate::error::PipelineResult;
use crate::types::{DemuxerStream, TextTrackConfig};
use async_trait::async_trait;

/// Callback invoked when every tracked text stream has reached its end.
pub type TextEndedCallback = Box<dyn Fn() + Send + Sync>;

/// Contract for text (subtitle/caption) renderers.
#[async_trait]
pub trait TextRenderer: Send + Sync {
    /// Install the end-of-stream callback. Called once, before any other
    /// method.
    fn initialize(&self, ended_cb: TextEndedCallback);

    /// Start tracking a text stream.
    fn add_text_stream(&self, stream: DemuxerStream, config: TextTrackConfig);

    /// Stop tracking a text stream.
    fn remove_text_stream(&self, stream: DemuxerStream);

    /// Stop cue delivery. Completes once delivery has actually stopped.
    async fn pause(&self) -> PipelineResult<()>;

    /// Discard buffered cues ahead of a seek.
    async fn flush(&self) -> PipelineResult<()>;

    /// Resume cue delivery from the current demuxer position. Resets any
    /// end-of-stream condition.
    fn start_playing(&self);
}
