//! # Pipeline State Machine
//!
//! Owns the demuxer, the current renderer, and the optional text renderer,
//! and drives every state transition of a playback session.
//!
//! ## Execution model
//!
//! The machine runs as a single spawned task (the "pipeline context") draining
//! a command channel. Commands come from three producers:
//!
//! - the [`PipelineController`](crate::controller::PipelineController), from
//!   arbitrary caller contexts,
//! - the demuxer-host wrapper, re-marshaling demuxer callbacks that may
//!   arrive on any context,
//! - the renderer-client wrapper and internal sequence tasks.
//!
//! Commands are handled strictly in order, so no two state mutations for the
//! same pipeline ever race. Multi-step operations (seek/suspend/resume) run
//! as a [`SerialTaskQueue`] on a helper task; the machine keeps a generation
//! counter so that aborting the helper on `stop()` also invalidates any
//! completion it managed to queue. A [`CancellationToken`] tripped at
//! teardown gates the host/client wrappers, which is what guarantees that no
//! callback fires after stop.

use crate::sequence::SerialTaskQueue;
use crate::shared_state::SharedPlaybackState;
use pipeline_traits::renderer::CdmContext;
use pipeline_traits::{
    BufferedTimeRanges, BufferingState, Demuxer, DemuxerHost, DemuxerStream, PipelineClient,
    PipelineError, PipelineMetadata, PipelineResult, PipelineStatistics, Renderer, RendererClient,
    StreamType, TextRenderer, TextTrackConfig, VideoSize,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// States & Commands
// ============================================================================

/// Discrete states of a playback session. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    Created,
    InitDemuxer,
    InitRenderer,
    Seeking,
    Playing,
    Suspending,
    Suspended,
    Resuming,
    Stopping,
    Stopped,
}

/// Everything that can happen to the pipeline, marshaled onto its context.
pub(crate) enum PipelineCommand {
    // Controller-initiated operations.
    Seek {
        time: Duration,
    },
    Suspend,
    Resume {
        renderer: Arc<dyn Renderer>,
        time: Duration,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
    SetPlaybackRate(f64),
    SetVolume(f32),
    SetCdm {
        cdm: Arc<dyn CdmContext>,
        done: oneshot::Sender<PipelineResult<()>>,
    },

    // Demuxer-host callbacks, re-marshaled from the demuxer's context.
    BufferedRangesChanged(BufferedTimeRanges),
    DurationChanged(Duration),
    DemuxerError(PipelineError),
    AddTextStream {
        stream: DemuxerStream,
        config: TextTrackConfig,
    },
    RemoveTextStream {
        stream: DemuxerStream,
    },

    // Renderer-client callbacks (pipeline context by contract).
    RendererError(PipelineError),
    RendererEnded,
    StatisticsUpdate(PipelineStatistics),
    BufferingStateChange(BufferingState),
    WaitingForDecryptionKey,
    VideoNaturalSizeChange(VideoSize),
    VideoOpacityChange(bool),
    TextEnded,

    // Internal bookkeeping.
    SequenceComplete {
        generation: u64,
        status: PipelineResult<()>,
    },
    StopAck {
        ack: oneshot::Sender<()>,
    },
}

impl PipelineCommand {
    fn name(&self) -> &'static str {
        match self {
            PipelineCommand::Seek { .. } => "seek",
            PipelineCommand::Suspend => "suspend",
            PipelineCommand::Resume { .. } => "resume",
            PipelineCommand::Stop { .. } => "stop",
            PipelineCommand::SetPlaybackRate(_) => "set_playback_rate",
            PipelineCommand::SetVolume(_) => "set_volume",
            PipelineCommand::SetCdm { .. } => "set_cdm",
            PipelineCommand::BufferedRangesChanged(_) => "buffered_ranges_changed",
            PipelineCommand::DurationChanged(_) => "duration_changed",
            PipelineCommand::DemuxerError(_) => "demuxer_error",
            PipelineCommand::AddTextStream { .. } => "add_text_stream",
            PipelineCommand::RemoveTextStream { .. } => "remove_text_stream",
            PipelineCommand::RendererError(_) => "renderer_error",
            PipelineCommand::RendererEnded => "renderer_ended",
            PipelineCommand::StatisticsUpdate(_) => "statistics_update",
            PipelineCommand::BufferingStateChange(_) => "buffering_state_change",
            PipelineCommand::WaitingForDecryptionKey => "waiting_for_decryption_key",
            PipelineCommand::VideoNaturalSizeChange(_) => "video_natural_size_change",
            PipelineCommand::VideoOpacityChange(_) => "video_opacity_change",
            PipelineCommand::TextEnded => "text_ended",
            PipelineCommand::SequenceComplete { .. } => "sequence_complete",
            PipelineCommand::StopAck { .. } => "stop_ack",
        }
    }
}

/// Which operation owns the single outstanding completion slot.
enum PendingOperation {
    Start,
    Seek { target: Duration },
    Suspend,
    Resume { target: Duration },
}

/// A seek/suspend/resume/startup sequence in flight on a helper task.
struct PendingSequence {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(PartialEq)]
enum Flow {
    Continue,
    Shutdown,
}

// ============================================================================
// Host & Client Wrappers
// ============================================================================

/// Demuxer-host surface handed to the demuxer. Forwards each callback into
/// the pipeline context; once the pipeline cancels, late calls are dropped on
/// the floor instead of mutating state mid-teardown.
struct MarshalingDemuxerHost {
    tx: mpsc::UnboundedSender<PipelineCommand>,
    cancel: CancellationToken,
}

impl MarshalingDemuxerHost {
    fn post(&self, cmd: PipelineCommand) {
        if self.cancel.is_cancelled() {
            debug!(command = cmd.name(), "dropping demuxer callback after teardown");
            return;
        }
        let _ = self.tx.send(cmd);
    }
}

impl DemuxerHost for MarshalingDemuxerHost {
    fn on_buffered_ranges_changed(&self, ranges: BufferedTimeRanges) {
        self.post(PipelineCommand::BufferedRangesChanged(ranges));
    }

    fn set_duration(&self, duration: Duration) {
        self.post(PipelineCommand::DurationChanged(duration));
    }

    fn on_demuxer_error(&self, error: PipelineError) {
        self.post(PipelineCommand::DemuxerError(error));
    }

    fn add_text_stream(&self, stream: DemuxerStream, config: TextTrackConfig) {
        self.post(PipelineCommand::AddTextStream { stream, config });
    }

    fn remove_text_stream(&self, stream: DemuxerStream) {
        self.post(PipelineCommand::RemoveTextStream { stream });
    }
}

/// Renderer-client surface handed to each renderer. Carries a per-renderer
/// token: when a renderer is destroyed (suspend, stop), its token is
/// cancelled so stragglers from the old renderer cannot leak into the next
/// epoch.
struct MarshalingRendererClient {
    tx: mpsc::UnboundedSender<PipelineCommand>,
    cancel: CancellationToken,
}

impl MarshalingRendererClient {
    fn post(&self, cmd: PipelineCommand) {
        if self.cancel.is_cancelled() {
            debug!(command = cmd.name(), "dropping renderer callback after teardown");
            return;
        }
        let _ = self.tx.send(cmd);
    }
}

impl RendererClient for MarshalingRendererClient {
    fn on_error(&self, error: PipelineError) {
        self.post(PipelineCommand::RendererError(error));
    }

    fn on_ended(&self) {
        self.post(PipelineCommand::RendererEnded);
    }

    fn on_statistics_update(&self, stats: PipelineStatistics) {
        self.post(PipelineCommand::StatisticsUpdate(stats));
    }

    fn on_buffering_state_change(&self, state: BufferingState) {
        self.post(PipelineCommand::BufferingStateChange(state));
    }

    fn on_waiting_for_decryption_key(&self) {
        self.post(PipelineCommand::WaitingForDecryptionKey);
    }

    fn on_video_natural_size_change(&self, size: VideoSize) {
        self.post(PipelineCommand::VideoNaturalSizeChange(size));
    }

    fn on_video_opacity_change(&self, opaque: bool) {
        self.post(PipelineCommand::VideoOpacityChange(opaque));
    }
}

// ============================================================================
// State Machine
// ============================================================================

pub(crate) struct PipelineStateMachine {
    state: PipelineState,
    demuxer: Arc<dyn Demuxer>,
    renderer: Option<Arc<dyn Renderer>>,
    text_renderer: Option<Arc<dyn TextRenderer>>,
    client: Arc<dyn PipelineClient>,
    shared: Arc<SharedPlaybackState>,

    tx: mpsc::UnboundedSender<PipelineCommand>,
    rx: mpsc::UnboundedReceiver<PipelineCommand>,
    /// Session-wide token, tripped at teardown. Gates the demuxer-host
    /// wrapper and the text-ended callback.
    cancel: CancellationToken,
    /// Per-renderer token, replaced on every renderer swap.
    renderer_cancel: CancellationToken,

    playback_rate: f64,
    volume: f32,
    duration: Option<Duration>,
    /// First fatal error, latched forever. Once set, no further work is
    /// queued; this is what stops an error storm during teardown.
    error: Option<PipelineError>,

    pending_op: Option<PendingOperation>,
    pending_sequence: Option<PendingSequence>,
    generation: u64,

    renderer_ended: bool,
    text_ended: bool,
    text_track_count: usize,
    ended_fired: bool,
}

impl PipelineStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        demuxer: Arc<dyn Demuxer>,
        renderer: Arc<dyn Renderer>,
        text_renderer: Option<Arc<dyn TextRenderer>>,
        client: Arc<dyn PipelineClient>,
        shared: Arc<SharedPlaybackState>,
        tx: mpsc::UnboundedSender<PipelineCommand>,
        rx: mpsc::UnboundedReceiver<PipelineCommand>,
        playback_rate: f64,
        volume: f32,
    ) -> Self {
        let cancel = CancellationToken::new();
        let renderer_cancel = cancel.child_token();
        Self {
            state: PipelineState::Created,
            demuxer,
            renderer: Some(renderer),
            text_renderer,
            client,
            shared,
            tx,
            rx,
            cancel,
            renderer_cancel,
            playback_rate,
            volume,
            duration: None,
            error: None,
            pending_op: None,
            pending_sequence: None,
            generation: 0,
            renderer_ended: false,
            text_ended: false,
            text_track_count: 0,
            ended_fired: false,
        }
    }

    /// Drive the session to completion. This future is the pipeline context.
    pub(crate) async fn run(mut self) {
        info!("pipeline session starting");
        self.begin_start();
        while let Some(cmd) = self.rx.recv().await {
            if self.handle_command(cmd).await == Flow::Shutdown {
                break;
            }
        }
        info!("pipeline session finished");
    }

    // ------------------------------------------------------------------
    // Command dispatch
    // ------------------------------------------------------------------

    async fn handle_command(&mut self, cmd: PipelineCommand) -> Flow {
        match cmd {
            PipelineCommand::Seek { time } => self.on_seek_requested(time),
            PipelineCommand::Suspend => self.on_suspend_requested(),
            PipelineCommand::Resume { renderer, time } => {
                self.on_resume_requested(renderer, time);
            }
            PipelineCommand::Stop { ack } => self.on_stop_requested(ack).await,
            PipelineCommand::SetPlaybackRate(rate) => self.on_set_playback_rate(rate),
            PipelineCommand::SetVolume(volume) => self.on_set_volume(volume),
            PipelineCommand::SetCdm { cdm, done } => self.on_set_cdm(cdm, done),

            PipelineCommand::BufferedRangesChanged(ranges) => {
                if !self.is_torn_down() {
                    self.shared.set_buffered_ranges(ranges);
                }
            }
            PipelineCommand::DurationChanged(duration) => self.on_duration_changed(duration),
            PipelineCommand::DemuxerError(e) => self.on_fatal_error(e).await,
            PipelineCommand::AddTextStream { stream, config } => {
                self.on_add_text_stream(stream, config);
            }
            PipelineCommand::RemoveTextStream { stream } => self.on_remove_text_stream(stream),

            PipelineCommand::RendererError(e) => self.on_fatal_error(e).await,
            PipelineCommand::RendererEnded => self.on_renderer_ended(),
            PipelineCommand::StatisticsUpdate(delta) => {
                if !self.is_torn_down() {
                    self.shared.accumulate_statistics(delta);
                }
            }
            PipelineCommand::BufferingStateChange(state) => {
                // Buffering transitions drive playback start/pause in the
                // client; while a suspend is in flight the renderer is about
                // to go away, so they are suppressed rather than forwarded.
                if self.state == PipelineState::Playing && !self.is_torn_down() {
                    self.client.on_buffering_state_change(state);
                }
            }
            PipelineCommand::WaitingForDecryptionKey => {
                if !self.is_torn_down() {
                    self.client.on_waiting_for_decryption_key();
                }
            }
            PipelineCommand::VideoNaturalSizeChange(size) => {
                if !self.is_torn_down() {
                    self.client.on_video_natural_size_change(size);
                }
            }
            PipelineCommand::VideoOpacityChange(opaque) => {
                if !self.is_torn_down() {
                    self.client.on_video_opacity_change(opaque);
                }
            }
            PipelineCommand::TextEnded => self.on_text_ended(),

            PipelineCommand::SequenceComplete { generation, status } => {
                self.on_sequence_complete(generation, status).await;
            }
            PipelineCommand::StopAck { ack } => {
                // Scheduled behind anything the demuxer/renderer queued
                // during teardown, so the caller observes deterministic
                // ordering.
                let _ = ack.send(());
                return Flow::Shutdown;
            }
        }
        Flow::Continue
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    fn begin_start(&mut self) {
        self.set_state(PipelineState::InitDemuxer);
        self.pending_op = Some(PendingOperation::Start);

        if let Some(text) = &self.text_renderer {
            let tx = self.tx.clone();
            let cancel = self.cancel.clone();
            text.initialize(Box::new(move || {
                if !cancel.is_cancelled() {
                    let _ = tx.send(PipelineCommand::TextEnded);
                }
            }));
        }

        let host: Arc<dyn DemuxerHost> = Arc::new(MarshalingDemuxerHost {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        });
        let demuxer = Arc::clone(&self.demuxer);
        let mut queue = SerialTaskQueue::new();
        queue.push(move || async move { demuxer.initialize(host).await });
        self.spawn_sequence(queue);
    }

    async fn begin_renderer_init(&mut self) {
        self.set_state(PipelineState::InitRenderer);

        let Some(renderer) = self.renderer.clone() else {
            self.on_fatal_error(PipelineError::RendererInitFailed(
                "renderer missing at initialization".into(),
            ))
            .await;
            return;
        };
        let client: Arc<dyn RendererClient> = Arc::new(MarshalingRendererClient {
            tx: self.tx.clone(),
            cancel: self.renderer_cancel.clone(),
        });
        let demuxer = Arc::clone(&self.demuxer);
        let mut queue = SerialTaskQueue::new();
        queue.push(move || async move { renderer.initialize(demuxer, client).await });
        self.spawn_sequence(queue);
    }

    fn finish_start(&mut self) {
        let has_audio = self.demuxer.get_stream(StreamType::Audio).is_some();
        let has_video = self.demuxer.get_stream(StreamType::Video).is_some();
        let metadata = PipelineMetadata {
            duration: self.duration,
            timeline_offset: self.demuxer.timeline_offset(),
            has_audio,
            has_video,
        };
        self.client.on_metadata(metadata);

        let start_time = self.demuxer.start_time();
        self.enter_playing(start_time);
        self.complete_pending(Ok(()));
    }

    // ------------------------------------------------------------------
    // Seek / Suspend / Resume
    // ------------------------------------------------------------------

    fn on_seek_requested(&mut self, time: Duration) {
        if self.state != PipelineState::Playing || self.error.is_some() {
            warn!(state = ?self.state, "seek rejected");
            self.client.on_seek(Err(PipelineError::InvalidState(format!(
                "cannot seek while {:?}",
                self.state
            ))));
            return;
        }
        let Some(renderer) = self.renderer.clone() else {
            self.client
                .on_seek(Err(PipelineError::InvalidState("no live renderer".into())));
            return;
        };

        let target = time.max(self.demuxer.start_time());
        debug!(?time, ?target, "seek accepted");
        self.set_state(PipelineState::Seeking);
        self.pending_op = Some(PendingOperation::Seek { target });

        // Pause text -> flush renderer -> flush text -> seek demuxer.
        let mut queue = SerialTaskQueue::new();
        if let Some(text) = self.text_renderer.clone() {
            queue.push(move || async move { text.pause().await });
        }
        queue.push(move || async move { renderer.flush().await });
        if let Some(text) = self.text_renderer.clone() {
            queue.push(move || async move { text.flush().await });
        }
        let demuxer = Arc::clone(&self.demuxer);
        queue.push(move || async move { demuxer.seek(target).await });
        self.spawn_sequence(queue);
    }

    fn on_suspend_requested(&mut self) {
        if self.state != PipelineState::Playing || self.error.is_some() {
            warn!(state = ?self.state, "suspend rejected");
            self.client.on_suspend(Err(PipelineError::InvalidState(format!(
                "cannot suspend while {:?}",
                self.state
            ))));
            return;
        }
        let Some(renderer) = self.renderer.clone() else {
            self.client
                .on_suspend(Err(PipelineError::InvalidState("no live renderer".into())));
            return;
        };

        self.set_state(PipelineState::Suspending);
        self.pending_op = Some(PendingOperation::Suspend);

        // Freeze playback before flushing so the reported media time cannot
        // advance past the snapshot.
        renderer.set_playback_rate(0.0);
        self.shared.enter_suspend(renderer.media_time());

        let mut queue = SerialTaskQueue::new();
        if let Some(text) = self.text_renderer.clone() {
            queue.push(move || async move { text.pause().await });
        }
        queue.push(move || async move { renderer.flush().await });
        self.spawn_sequence(queue);
    }

    fn on_resume_requested(&mut self, renderer: Arc<dyn Renderer>, time: Duration) {
        if self.state != PipelineState::Suspended || self.error.is_some() {
            warn!(state = ?self.state, "resume rejected");
            self.client.on_resume(Err(PipelineError::InvalidState(format!(
                "cannot resume while {:?}",
                self.state
            ))));
            return;
        }

        let target = time.max(self.demuxer.start_time());
        debug!(?time, ?target, "resume accepted");
        self.set_state(PipelineState::Resuming);
        self.pending_op = Some(PendingOperation::Resume { target });

        // The replacement renderer gets a fresh callback epoch.
        self.renderer_cancel = self.cancel.child_token();
        self.renderer = Some(Arc::clone(&renderer));

        // Always re-seek so the new renderer and the demuxer agree on
        // position, regardless of where the old renderer left off.
        let client: Arc<dyn RendererClient> = Arc::new(MarshalingRendererClient {
            tx: self.tx.clone(),
            cancel: self.renderer_cancel.clone(),
        });
        let demuxer = Arc::clone(&self.demuxer);
        let init_demuxer = Arc::clone(&self.demuxer);
        let mut queue = SerialTaskQueue::new();
        queue.push(move || async move { demuxer.seek(target).await });
        queue.push(move || async move { renderer.initialize(init_demuxer, client).await });
        self.spawn_sequence(queue);
    }

    // ------------------------------------------------------------------
    // Sequence completion
    // ------------------------------------------------------------------

    fn spawn_sequence(&mut self, queue: SerialTaskQueue) {
        debug_assert!(self.pending_sequence.is_none(), "overlapping sequences");
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let status = queue.run().await;
            let _ = tx.send(PipelineCommand::SequenceComplete { generation, status });
        });
        self.pending_sequence = Some(PendingSequence { generation, handle });
    }

    /// Abort the in-flight sequence, if any, and wait for the helper task to
    /// actually unwind so no step is still polling the demuxer or renderer.
    /// Remaining steps never run and any completion already queued is
    /// invalidated by generation mismatch.
    async fn cancel_pending_sequence(&mut self) {
        if let Some(seq) = self.pending_sequence.take() {
            debug!(generation = seq.generation, "cancelling pending sequence");
            seq.handle.abort();
            let _ = seq.handle.await;
        }
        self.generation += 1;
    }

    async fn on_sequence_complete(&mut self, generation: u64, status: PipelineResult<()>) {
        let current = matches!(
            &self.pending_sequence,
            Some(seq) if seq.generation == generation
        );
        if !current {
            debug!(generation, "ignoring stale sequence completion");
            return;
        }
        self.pending_sequence = None;

        if let Err(e) = status {
            self.on_fatal_error(e).await;
            return;
        }

        match self.state {
            PipelineState::InitDemuxer => {
                let has_audio = self.demuxer.get_stream(StreamType::Audio).is_some();
                let has_video = self.demuxer.get_stream(StreamType::Video).is_some();
                if !has_audio && !has_video {
                    self.on_fatal_error(PipelineError::CouldNotRender).await;
                    return;
                }
                self.begin_renderer_init().await;
            }
            PipelineState::InitRenderer => self.finish_start(),
            PipelineState::Seeking => {
                let target = match &self.pending_op {
                    Some(PendingOperation::Seek { target }) => *target,
                    _ => {
                        warn!("seek sequence finished without a pending seek");
                        return;
                    }
                };
                self.enter_playing(target);
                self.complete_pending(Ok(()));
            }
            PipelineState::Suspending => {
                self.destroy_renderer();
                self.set_state(PipelineState::Suspended);
                self.complete_pending(Ok(()));
            }
            PipelineState::Resuming => {
                let target = match &self.pending_op {
                    Some(PendingOperation::Resume { target }) => *target,
                    _ => {
                        warn!("resume sequence finished without a pending resume");
                        return;
                    }
                };
                self.enter_playing(target);
                self.complete_pending(Ok(()));
            }
            state => warn!(?state, "sequence completed in unexpected state"),
        }
    }

    /// Transition into Playing from `from`: reset end-of-stream tracking,
    /// push the remembered rate/volume into the renderer, and start it.
    fn enter_playing(&mut self, from: Duration) {
        self.renderer_ended = false;
        self.text_ended = false;
        self.ended_fired = false;

        if let Some(renderer) = &self.renderer {
            renderer.set_playback_rate(self.playback_rate);
            renderer.set_volume(self.volume);
            renderer.start_playing_from(from);
        }
        if let Some(text) = &self.text_renderer {
            text.start_playing();
        }

        self.shared.set_start_time(from);
        self.shared.set_renderer(self.renderer.clone());
        self.shared.exit_suspend();
        self.set_state(PipelineState::Playing);
    }

    fn destroy_renderer(&mut self) {
        self.renderer_cancel.cancel();
        self.renderer = None;
        self.shared.set_renderer(None);
    }

    // ------------------------------------------------------------------
    // Stop & errors
    // ------------------------------------------------------------------

    async fn on_stop_requested(&mut self, ack: oneshot::Sender<()>) {
        info!(state = ?self.state, "stop requested");
        if self.state != PipelineState::Stopped {
            self.cancel_pending_sequence().await;
            // An outstanding Start/Seek/Suspend/Resume is abandoned without a
            // completion: once stop is requested the stop acknowledgement is
            // the terminal signal, and no client notification may follow it.
            self.pending_op = None;
            self.teardown();
        }
        // Route the ack through the command channel so it runs after any
        // callbacks the demuxer/renderer queued while being torn down.
        let _ = self.tx.send(PipelineCommand::StopAck { ack });
    }

    async fn on_fatal_error(&mut self, error: PipelineError) {
        if self.error.is_some() || matches!(self.state, PipelineState::Stopping | PipelineState::Stopped)
        {
            debug!(%error, "ignoring error after teardown began");
            return;
        }
        if !error.is_fatal() {
            warn!(%error, "non-fatal error reported through fatal path");
        }
        error!(%error, state = ?self.state, "pipeline error, tearing down");
        self.error = Some(error.clone());
        self.cancel_pending_sequence().await;

        // The first error is delivered to whichever completion is
        // outstanding; only unsolicited errors reach the general channel.
        if self.pending_op.is_some() {
            self.complete_pending(Err(error));
        } else {
            self.client.on_error(error);
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        self.set_state(PipelineState::Stopping);
        self.cancel.cancel();
        self.renderer_cancel.cancel();
        self.demuxer.stop();
        self.renderer = None;
        self.text_renderer = None;
        self.shared.set_renderer(None);
        self.set_state(PipelineState::Stopped);
    }

    fn complete_pending(&mut self, status: PipelineResult<()>) {
        match self.pending_op.take() {
            Some(PendingOperation::Start) => self.client.on_start(status),
            Some(PendingOperation::Seek { .. }) => self.client.on_seek(status),
            Some(PendingOperation::Suspend) => self.client.on_suspend(status),
            Some(PendingOperation::Resume { .. }) => self.client.on_resume(status),
            None => warn!("operation completion with no pending operation"),
        }
    }

    fn is_torn_down(&self) -> bool {
        self.error.is_some()
            || matches!(self.state, PipelineState::Stopping | PipelineState::Stopped)
    }

    // ------------------------------------------------------------------
    // Rate, volume, CDM
    // ------------------------------------------------------------------

    fn on_set_playback_rate(&mut self, rate: f64) {
        self.playback_rate = rate;
        if self.error.is_some() {
            return;
        }
        if self.state == PipelineState::Playing {
            if let Some(renderer) = &self.renderer {
                renderer.set_playback_rate(rate);
            }
        }
    }

    fn on_set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if self.error.is_some() {
            return;
        }
        if self.state == PipelineState::Playing {
            if let Some(renderer) = &self.renderer {
                renderer.set_volume(volume);
            }
        }
    }

    fn on_set_cdm(&mut self, cdm: Arc<dyn CdmContext>, done: oneshot::Sender<PipelineResult<()>>) {
        if self.is_torn_down() {
            let _ = done.send(Err(PipelineError::Aborted));
            return;
        }
        // Only while Playing is the renderer guaranteed quiescent; during a
        // seek/suspend/resume sequence it is being flushed or initialized and
        // must not see a concurrent call.
        if self.state != PipelineState::Playing {
            warn!(state = ?self.state, "set_cdm rejected");
            let _ = done.send(Err(PipelineError::InvalidState(format!(
                "cannot attach CDM while {:?}",
                self.state
            ))));
            return;
        }
        match self.renderer.clone() {
            Some(renderer) => {
                tokio::spawn(async move {
                    let _ = done.send(renderer.set_cdm(cdm).await);
                });
            }
            None => {
                let _ = done.send(Err(PipelineError::InvalidState(
                    "no renderer to attach CDM to".into(),
                )));
            }
        }
    }

    // ------------------------------------------------------------------
    // Demuxer host events
    // ------------------------------------------------------------------

    fn on_duration_changed(&mut self, duration: Duration) {
        if self.is_torn_down() {
            return;
        }
        if self.duration == Some(duration) {
            return;
        }
        debug!(?duration, "duration changed");
        self.duration = Some(duration);
        self.client.on_duration_change(duration);
    }

    fn on_add_text_stream(&mut self, stream: DemuxerStream, config: TextTrackConfig) {
        if self.is_torn_down() {
            return;
        }
        let Some(text) = &self.text_renderer else {
            warn!(?stream, "text stream ignored: no text renderer");
            return;
        };
        debug!(?stream, "text stream added");
        text.add_text_stream(stream, config.clone());
        self.text_track_count += 1;
        self.text_ended = false;
        self.client.on_add_text_track(config);
    }

    fn on_remove_text_stream(&mut self, stream: DemuxerStream) {
        if self.is_torn_down() {
            return;
        }
        let Some(text) = &self.text_renderer else {
            return;
        };
        debug!(?stream, "text stream removed");
        text.remove_text_stream(stream);
        self.text_track_count = self.text_track_count.saturating_sub(1);
        self.maybe_fire_ended();
    }

    // ------------------------------------------------------------------
    // End-of-stream tracking
    // ------------------------------------------------------------------

    fn on_renderer_ended(&mut self) {
        if self.state != PipelineState::Playing || self.is_torn_down() {
            return;
        }
        self.renderer_ended = true;
        self.maybe_fire_ended();
    }

    fn on_text_ended(&mut self) {
        if self.state != PipelineState::Playing || self.is_torn_down() {
            return;
        }
        self.text_ended = true;
        self.maybe_fire_ended();
    }

    /// Ended is AND-combined: the audio/video renderer and, when text tracks
    /// are present, the text renderer must each report their own end.
    fn maybe_fire_ended(&mut self) {
        if self.state != PipelineState::Playing || self.ended_fired {
            return;
        }
        if !self.renderer_ended {
            return;
        }
        let text_done =
            self.text_renderer.is_none() || self.text_track_count == 0 || self.text_ended;
        if !text_done {
            return;
        }
        info!("playback ended");
        self.ended_fired = true;
        self.client.on_ended();
    }

    fn set_state(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
        self.shared.set_pipeline_state(next);
    }
}
