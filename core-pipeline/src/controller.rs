//! # Pipeline Controller
//!
//! Thread-agnostic facade over the pipeline state machine.
//!
//! ## Overview
//!
//! The controller is the handle the embedding application holds. Every
//! mutating call marshals a command into the pipeline context and returns
//! immediately; completion arrives through the [`PipelineClient`]
//! notifications supplied at [`PipelineController::start`]. Read methods are
//! either local mirrors (`playback_rate`, `volume`, `is_running`) or
//! lock-protected snapshot reads of [`SharedPlaybackState`] and are safe from
//! any context.
//!
//! The one blocking exception is [`PipelineController::stop`]: it awaits the
//! pipeline context's teardown acknowledgement so the caller can rely on the
//! demuxer and renderers being quiescent (and therefore safely destroyable)
//! once it returns.

use crate::shared_state::SharedPlaybackState;
use crate::state_machine::{PipelineCommand, PipelineState, PipelineStateMachine};
use parking_lot::Mutex;
use pipeline_traits::renderer::CdmContext;
use pipeline_traits::{
    BufferedTimeRanges, Demuxer, PipelineClient, PipelineError, PipelineResult,
    PipelineStatistics, Renderer, TextRenderer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

struct ControllerState {
    cmd_tx: Option<mpsc::UnboundedSender<PipelineCommand>>,
    playback_rate: f64,
    volume: f32,
    started: bool,
    stopped: bool,
}

/// Public-facing handle for one playback session.
///
/// A controller runs exactly one session: `start()` once, `stop()` once.
/// Construct a new controller for the next piece of media.
pub struct PipelineController {
    shared: Arc<SharedPlaybackState>,
    state: Mutex<ControllerState>,
}

impl PipelineController {
    /// Create an idle controller.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SharedPlaybackState::new()),
            state: Mutex::new(ControllerState {
                cmd_tx: None,
                playback_rate: 1.0,
                volume: 1.0,
                started: false,
                stopped: false,
            }),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start playback.
    ///
    /// Spawns the pipeline context and begins demuxer initialization; the
    /// outcome is delivered through `client.on_start` and, on success,
    /// `on_metadata`/`on_duration_change`. The demuxer is borrowed for the
    /// whole session; ownership of the renderer transfers to the pipeline.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidState`] if the controller was already
    /// started.
    #[instrument(skip_all)]
    pub fn start(
        &self,
        demuxer: Arc<dyn Demuxer>,
        renderer: Box<dyn Renderer>,
        text_renderer: Option<Box<dyn TextRenderer>>,
        client: Arc<dyn PipelineClient>,
    ) -> PipelineResult<()> {
        let mut state = self.state.lock();
        if state.started {
            warn!("start rejected: already started");
            return Err(PipelineError::InvalidState(
                "pipeline already started".into(),
            ));
        }
        state.started = true;

        let (tx, rx) = mpsc::unbounded_channel();
        state.cmd_tx = Some(tx.clone());

        let machine = PipelineStateMachine::new(
            demuxer,
            Arc::from(renderer),
            text_renderer.map(Arc::from),
            client,
            Arc::clone(&self.shared),
            tx,
            rx,
            state.playback_rate,
            state.volume,
        );
        drop(state);

        tokio::spawn(machine.run());
        Ok(())
    }

    /// Stop playback and tear the pipeline down.
    ///
    /// Idempotent beyond the first call. Awaits the pipeline context's
    /// acknowledgement, which is scheduled behind any work the demuxer or
    /// renderer queued during teardown; after this returns no further client
    /// notification will fire.
    #[instrument(skip_all)]
    pub async fn stop(&self) {
        let tx = {
            let mut state = self.state.lock();
            if state.stopped || !state.started {
                state.stopped = true;
                return;
            }
            state.stopped = true;
            state.cmd_tx.take()
        };
        let Some(tx) = tx else { return };

        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(PipelineCommand::Stop { ack: ack_tx }).is_ok() {
            // Waits on the teardown signal; the pipeline context acks once
            // its queue has drained past the teardown work.
            let _ = ack_rx.await;
        }
        debug!("pipeline stop acknowledged");
    }

    /// Returns `true` between a successful `start()` and `stop()`.
    pub fn is_running(&self) -> bool {
        let state = self.state.lock();
        state.started && !state.stopped
    }

    /// Current state of the playback session, as last published by the
    /// pipeline context. [`PipelineState::Created`] before `start()`.
    pub fn state(&self) -> PipelineState {
        self.shared.pipeline_state()
    }

    // ========================================================================
    // Playback operations
    // ========================================================================

    /// Seek to `time`. Only legal while playing; positions before the
    /// demuxer's start time are clamped. Completion arrives via
    /// `client.on_seek`.
    pub fn seek(&self, time: Duration) -> PipelineResult<()> {
        self.send(PipelineCommand::Seek { time })
    }

    /// Suspend playback: the current renderer is flushed and destroyed, and
    /// the reported media time freezes at the suspend position. Completion
    /// arrives via `client.on_suspend`.
    pub fn suspend(&self) -> PipelineResult<()> {
        self.send(PipelineCommand::Suspend)
    }

    /// Resume from suspension with a replacement renderer, seeking to `time`.
    /// The pipeline always re-seeks rather than trusting a cached position so
    /// the new renderer and the demuxer agree. Completion arrives via
    /// `client.on_resume`.
    pub fn resume(&self, renderer: Box<dyn Renderer>, time: Duration) -> PipelineResult<()> {
        self.send(PipelineCommand::Resume {
            renderer: Arc::from(renderer),
            time,
        })
    }

    /// Set the playback rate. Remembered if no renderer is live yet and
    /// applied before the next transition into playing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidState`] for negative or non-finite
    /// rates; invalid values never reach the state machine.
    pub fn set_playback_rate(&self, rate: f64) -> PipelineResult<()> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(PipelineError::InvalidState(format!(
                "playback rate must be finite and non-negative, got {rate}"
            )));
        }
        let mut state = self.state.lock();
        state.playback_rate = rate;
        if let Some(tx) = &state.cmd_tx {
            let _ = tx.send(PipelineCommand::SetPlaybackRate(rate));
        }
        Ok(())
    }

    /// Set the volume.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidState`] for volumes outside
    /// `[0.0, 1.0]`; invalid values never reach the state machine.
    pub fn set_volume(&self, volume: f32) -> PipelineResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(PipelineError::InvalidState(format!(
                "volume must be within [0.0, 1.0], got {volume}"
            )));
        }
        let mut state = self.state.lock();
        state.volume = volume;
        if let Some(tx) = &state.cmd_tx {
            let _ = tx.send(PipelineCommand::SetVolume(volume));
        }
        Ok(())
    }

    /// Attach a decryption context to the live renderer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidState`] when no renderer is live and
    /// [`PipelineError::Aborted`] when the pipeline stops before the renderer
    /// answers.
    pub async fn set_cdm(&self, cdm: Arc<dyn CdmContext>) -> PipelineResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(PipelineCommand::SetCdm { cdm, done: done_tx })?;
        done_rx.await.unwrap_or(Err(PipelineError::Aborted))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Last playback rate accepted by [`PipelineController::set_playback_rate`].
    pub fn playback_rate(&self) -> f64 {
        self.state.lock().playback_rate
    }

    /// Last volume accepted by [`PipelineController::set_volume`].
    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Current media time. While suspended this is the frozen suspend
    /// position; otherwise it tracks the live renderer.
    pub fn media_time(&self) -> Duration {
        self.shared.media_time()
    }

    /// Snapshot of the buffered time ranges.
    pub fn buffered_time_ranges(&self) -> BufferedTimeRanges {
        self.shared.buffered_time_ranges()
    }

    /// Snapshot of the accumulated decode statistics.
    pub fn statistics(&self) -> PipelineStatistics {
        self.shared.statistics()
    }

    /// One-shot loading flag: `true` if buffered data grew since the last
    /// call. The read clears it.
    pub fn did_loading_progress(&self) -> bool {
        self.shared.did_loading_progress()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn send(&self, cmd: PipelineCommand) -> PipelineResult<()> {
        let state = self.state.lock();
        if state.stopped {
            return Err(PipelineError::InvalidState("pipeline stopped".into()));
        }
        match &state.cmd_tx {
            Some(tx) if tx.send(cmd).is_ok() => Ok(()),
            _ => Err(PipelineError::InvalidState("pipeline not running".into())),
        }
    }
}

impl Default for PipelineController {
    fn default() -> Self {
        Self::new()
    }
}

/// Dropping the controller without calling [`PipelineController::stop`]
/// still tears the session down: a stop command is issued fire-and-forget so
/// the pipeline task exits instead of outliving its only handle. Callers that
/// need the teardown-complete guarantee must still await `stop()`.
impl Drop for PipelineController {
    fn drop(&mut self) {
        let tx = self.state.lock().cmd_tx.take();
        if let Some(tx) = tx {
            let (ack, _) = oneshot::channel();
            let _ = tx.send(PipelineCommand::Stop { ack });
        }
    }
}
