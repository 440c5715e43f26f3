//! Client notification surface exposed by the pipeline controller.

use crate::error::{PipelineError, PipelineResult};
use crate::types::{BufferingState, PipelineMetadata, TextTrackConfig, VideoSize};
use std::time::Duration;

/// Notifications delivered by the pipeline to its embedding client.
///
/// The per-operation completions (`on_start`, `on_seek`, `on_suspend`,
/// `on_resume`) fire exactly once per outstanding operation, except that an
/// operation abandoned by `stop()` is answered by the stop acknowledgement
/// instead. Everything else is a repeating notification that may fire any
/// number of times while the pipeline is running and never after it has
/// stopped.
///
/// Calls arrive on the pipeline's own context; implementations must be cheap
/// and non-blocking, re-dispatching to their own context when needed.
pub trait PipelineClient: Send + Sync {
    /// `start()` finished, successfully or not.
    fn on_start(&self, status: PipelineResult<()>);

    /// A `seek()` finished, successfully or not.
    fn on_seek(&self, status: PipelineResult<()>);

    /// A `suspend()` finished, successfully or not.
    fn on_suspend(&self, status: PipelineResult<()>);

    /// A `resume()` finished, successfully or not.
    fn on_resume(&self, status: PipelineResult<()>);

    /// A fatal error surfaced outside of any pending operation. The pipeline
    /// has already begun tearing itself down.
    fn on_error(&self, error: PipelineError);

    /// Every present renderer (audio/video and, when present, text) reported
    /// end of stream.
    fn on_ended(&self);

    /// Stream metadata became available during startup.
    fn on_metadata(&self, metadata: PipelineMetadata);

    /// A renderer crossed a buffering boundary.
    fn on_buffering_state_change(&self, state: BufferingState);

    /// The container duration changed (including the initial report).
    fn on_duration_change(&self, duration: Duration);

    /// The demuxer exposed a new text track.
    fn on_add_text_track(&self, config: TextTrackConfig);

    /// Decode stalled waiting for a decryption key.
    fn on_waiting_for_decryption_key(&self);

    /// The video natural size changed.
    fn on_video_natural_size_change(&self, size: VideoSize);

    /// The video became opaque or transparent.
    fn on_video_opacity_change(&self, opaque: bool);
}
