use thiserror::Error;

/// Errors surfaced by the playback pipeline.
///
/// The pipeline threads a single success sentinel (`Ok(())`) through every
/// asynchronous step; everything else is one of the terminal kinds below. Once
/// a fatal kind has been latched by the state machine the pipeline tears
/// itself down; errors are never recovered in place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The demuxer failed to open or parse the media source.
    #[error("demuxer could not be opened: {0}")]
    DemuxerOpenFailed(String),

    /// The source exposes neither an audio nor a video stream the renderer
    /// could consume.
    #[error("no audio or video stream to render")]
    CouldNotRender,

    /// The renderer failed to initialize against the demuxed streams.
    #[error("renderer initialization failed: {0}")]
    RendererInitFailed(String),

    /// A read failure surfaced while a seek/suspend/resume sequence was in
    /// flight.
    #[error("read error: {0}")]
    Read(String),

    /// API misuse, e.g. seeking while the pipeline is not playing. Reported
    /// to the offending operation's completion only; the pipeline keeps
    /// running.
    #[error("invalid pipeline state: {0}")]
    InvalidState(String),

    /// The operation was cancelled because the pipeline was stopped.
    #[error("operation aborted")]
    Aborted,
}

impl PipelineError {
    /// Returns `true` if this error tears the pipeline down once latched.
    ///
    /// `InvalidState` is a per-call usage error and `Aborted` is the normal
    /// outcome of cancellation; neither poisons the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::InvalidState(_) | PipelineError::Aborted
        )
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
