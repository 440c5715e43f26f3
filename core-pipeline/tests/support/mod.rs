//! Hand-rolled demuxer/renderer/client fakes shared by the integration
//! tests. They record every call so tests can assert on ordering, and they
//! expose gates so tests can hold an asynchronous step open at will.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_traits::renderer::CdmContext;
use pipeline_traits::{
    BufferingState, Demuxer, DemuxerHost, DemuxerStream, PipelineClient, PipelineError,
    PipelineMetadata, PipelineResult, Renderer, RendererClient, StreamType, TextEndedCallback,
    TextRenderer, TextTrackConfig, VideoSize,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Polls `predicate` until it holds or five seconds elapse.
pub async fn eventually<F: Fn() -> bool>(what: &str, predicate: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if predicate() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================================================
// Recording client
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Start(PipelineResult<()>),
    Seek(PipelineResult<()>),
    Suspend(PipelineResult<()>),
    Resume(PipelineResult<()>),
    Error(PipelineError),
    Ended,
    Metadata(PipelineMetadata),
    Buffering(BufferingState),
    DurationChange(Duration),
    AddTextTrack(TextTrackConfig),
    WaitingForDecryptionKey,
    NaturalSize(VideoSize),
    Opacity(bool),
}

/// Client that records every notification in arrival order.
#[derive(Default)]
pub struct RecordingClient {
    events: Mutex<Vec<ClientEvent>>,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: ClientEvent) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().clone()
    }

    pub fn count<F: Fn(&ClientEvent) -> bool>(&self, predicate: F) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub async fn wait_for<F: Fn(&ClientEvent) -> bool>(&self, what: &str, predicate: F) {
        eventually(what, || self.count(&predicate) > 0).await;
    }
}

impl PipelineClient for RecordingClient {
    fn on_start(&self, status: PipelineResult<()>) {
        self.push(ClientEvent::Start(status));
    }

    fn on_seek(&self, status: PipelineResult<()>) {
        self.push(ClientEvent::Seek(status));
    }

    fn on_suspend(&self, status: PipelineResult<()>) {
        self.push(ClientEvent::Suspend(status));
    }

    fn on_resume(&self, status: PipelineResult<()>) {
        self.push(ClientEvent::Resume(status));
    }

    fn on_error(&self, error: PipelineError) {
        self.push(ClientEvent::Error(error));
    }

    fn on_ended(&self) {
        self.push(ClientEvent::Ended);
    }

    fn on_metadata(&self, metadata: PipelineMetadata) {
        self.push(ClientEvent::Metadata(metadata));
    }

    fn on_buffering_state_change(&self, state: BufferingState) {
        self.push(ClientEvent::Buffering(state));
    }

    fn on_duration_change(&self, duration: Duration) {
        self.push(ClientEvent::DurationChange(duration));
    }

    fn on_add_text_track(&self, config: TextTrackConfig) {
        self.push(ClientEvent::AddTextTrack(config));
    }

    fn on_waiting_for_decryption_key(&self) {
        self.push(ClientEvent::WaitingForDecryptionKey);
    }

    fn on_video_natural_size_change(&self, size: VideoSize) {
        self.push(ClientEvent::NaturalSize(size));
    }

    fn on_video_opacity_change(&self, opaque: bool) {
        self.push(ClientEvent::Opacity(opaque));
    }
}

// ============================================================================
// Fake demuxer
// ============================================================================

pub struct FakeDemuxer {
    streams: Vec<DemuxerStream>,
    duration: Option<Duration>,
    start_time: Duration,
    timeline_offset: Duration,
    init_result: PipelineResult<()>,
    hang_initialize: bool,
    seek_gate: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
    pub seeks: Mutex<Vec<Duration>>,
    pub stopped: AtomicBool,
    /// Chronological record of seek/stop activity, including seeks whose
    /// futures were dropped mid-flight.
    pub log: Mutex<Vec<&'static str>>,
    host: Mutex<Option<Arc<dyn DemuxerHost>>>,
}

impl FakeDemuxer {
    pub fn new(streams: Vec<DemuxerStream>, duration: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            streams,
            duration,
            start_time: Duration::ZERO,
            timeline_offset: Duration::ZERO,
            init_result: Ok(()),
            hang_initialize: false,
            seek_gate: Mutex::new(None),
            seeks: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
            host: Mutex::new(None),
        })
    }

    pub fn audio_video(duration: Duration) -> Arc<Self> {
        Self::new(
            vec![
                DemuxerStream::new(1, StreamType::Audio),
                DemuxerStream::new(2, StreamType::Video),
            ],
            Some(duration),
        )
    }

    pub fn video_only(duration: Duration) -> Arc<Self> {
        Self::new(vec![DemuxerStream::new(1, StreamType::Video)], Some(duration))
    }

    pub fn without_streams() -> Arc<Self> {
        Self::new(Vec::new(), None)
    }

    pub fn failing_init(error: PipelineError) -> Arc<Self> {
        let mut demuxer = Self::new(
            vec![DemuxerStream::new(1, StreamType::Video)],
            Some(secs(10)),
        );
        Arc::get_mut(&mut demuxer).unwrap().init_result = Err(error);
        demuxer
    }

    pub fn hanging_init() -> Arc<Self> {
        let mut demuxer = Self::new(
            vec![DemuxerStream::new(1, StreamType::Video)],
            Some(secs(10)),
        );
        Arc::get_mut(&mut demuxer).unwrap().hang_initialize = true;
        demuxer
    }

    pub fn with_start_time(streams: Vec<DemuxerStream>, start_time: Duration) -> Arc<Self> {
        let mut demuxer = Self::new(streams, Some(secs(100)));
        Arc::get_mut(&mut demuxer).unwrap().start_time = start_time;
        demuxer
    }

    /// Hold the next `seek()` open until the returned sender fires.
    pub fn gate_next_seek(&self) -> tokio::sync::oneshot::Sender<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        *self.seek_gate.lock() = Some(rx);
        tx
    }

    /// Host handle captured during `initialize()`, for driving callbacks.
    pub fn host(&self) -> Arc<dyn DemuxerHost> {
        self.host.lock().clone().expect("demuxer not initialized")
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Demuxer for FakeDemuxer {
    async fn initialize(&self, host: Arc<dyn DemuxerHost>) -> PipelineResult<()> {
        if let Some(duration) = self.duration {
            host.set_duration(duration);
        }
        *self.host.lock() = Some(host);
        if self.hang_initialize {
            std::future::pending::<()>().await;
        }
        self.init_result.clone()
    }

    async fn seek(&self, time: Duration) -> PipelineResult<()> {
        self.seeks.lock().push(time);
        self.log.lock().push("seek started");
        let gate = self.seek_gate.lock().take();
        if let Some(gate) = gate {
            struct Unwound<'a> {
                log: &'a Mutex<Vec<&'static str>>,
                completed: bool,
            }
            impl Drop for Unwound<'_> {
                fn drop(&mut self) {
                    if !self.completed {
                        self.log.lock().push("seek dropped");
                    }
                }
            }
            let mut unwound = Unwound {
                log: &self.log,
                completed: false,
            };
            let _ = gate.await;
            unwound.completed = true;
        }
        self.log.lock().push("seek finished");
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.log.lock().push("stopped");
    }

    fn get_stream(&self, stream_type: StreamType) -> Option<DemuxerStream> {
        self.streams
            .iter()
            .find(|s| s.stream_type == stream_type)
            .copied()
    }

    fn start_time(&self) -> Duration {
        self.start_time
    }

    fn timeline_offset(&self) -> Duration {
        self.timeline_offset
    }
}

// ============================================================================
// Fake renderer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RendererCall {
    Initialize,
    Flush,
    StartPlayingFrom(Duration),
    SetPlaybackRate(f64),
    SetVolume(f32),
    SetCdm,
}

pub struct FakeRenderer {
    init_result: PipelineResult<()>,
    pub calls: Mutex<Vec<RendererCall>>,
    media_time: Mutex<Duration>,
    client: Mutex<Option<Arc<dyn RendererClient>>>,
    pub flushes: AtomicUsize,
    flush_gate: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
}

impl FakeRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            init_result: Ok(()),
            calls: Mutex::new(Vec::new()),
            media_time: Mutex::new(Duration::ZERO),
            client: Mutex::new(None),
            flushes: AtomicUsize::new(0),
            flush_gate: Mutex::new(None),
        })
    }

    /// Hold the next `flush()` open until the returned sender fires.
    pub fn gate_next_flush(&self) -> tokio::sync::oneshot::Sender<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        *self.flush_gate.lock() = Some(rx);
        tx
    }

    pub fn failing_init(error: PipelineError) -> Arc<Self> {
        let renderer = Self::new();
        // Safe: no other handles exist yet.
        let mut renderer = renderer;
        Arc::get_mut(&mut renderer).unwrap().init_result = Err(error);
        renderer
    }

    /// Simulate decode progress: move the reported media time.
    pub fn advance_to(&self, time: Duration) {
        *self.media_time.lock() = time;
    }

    /// Client handle captured during `initialize()`, for driving callbacks.
    pub fn client(&self) -> Arc<dyn RendererClient> {
        self.client.lock().clone().expect("renderer not initialized")
    }

    pub fn calls(&self) -> Vec<RendererCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn initialize(
        &self,
        _demuxer: Arc<dyn Demuxer>,
        client: Arc<dyn RendererClient>,
    ) -> PipelineResult<()> {
        self.calls.lock().push(RendererCall::Initialize);
        *self.client.lock() = Some(client);
        self.init_result.clone()
    }

    async fn flush(&self) -> PipelineResult<()> {
        self.calls.lock().push(RendererCall::Flush);
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let gate = self.flush_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(())
    }

    fn start_playing_from(&self, time: Duration) {
        self.calls.lock().push(RendererCall::StartPlayingFrom(time));
        *self.media_time.lock() = time;
    }

    fn set_playback_rate(&self, rate: f64) {
        self.calls.lock().push(RendererCall::SetPlaybackRate(rate));
    }

    fn set_volume(&self, volume: f32) {
        self.calls.lock().push(RendererCall::SetVolume(volume));
    }

    fn media_time(&self) -> Duration {
        *self.media_time.lock()
    }

    async fn set_cdm(&self, _cdm: Arc<dyn CdmContext>) -> PipelineResult<()> {
        self.calls.lock().push(RendererCall::SetCdm);
        Ok(())
    }
}

// ============================================================================
// Fake text renderer
// ============================================================================

pub struct FakeTextRenderer {
    ended_cb: Mutex<Option<TextEndedCallback>>,
    pub pauses: AtomicUsize,
    pub flushes: AtomicUsize,
    pub plays: AtomicUsize,
    pub streams: Mutex<Vec<DemuxerStream>>,
}

impl FakeTextRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ended_cb: Mutex::new(None),
            pauses: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            plays: AtomicUsize::new(0),
            streams: Mutex::new(Vec::new()),
        })
    }

    /// Report that every tracked text stream reached its end.
    pub fn signal_ended(&self) {
        let cb = self.ended_cb.lock();
        if let Some(cb) = cb.as_ref() {
            cb();
        }
    }
}

#[async_trait]
impl TextRenderer for FakeTextRenderer {
    fn initialize(&self, ended_cb: TextEndedCallback) {
        *self.ended_cb.lock() = Some(ended_cb);
    }

    fn add_text_stream(&self, stream: DemuxerStream, _config: TextTrackConfig) {
        self.streams.lock().push(stream);
    }

    fn remove_text_stream(&self, stream: DemuxerStream) {
        self.streams.lock().retain(|s| *s != stream);
    }

    async fn pause(&self) -> PipelineResult<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush(&self) -> PipelineResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn start_playing(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Ownership shims
// ============================================================================

/// The pipeline takes renderers by value; these shims hand it a delegate so
/// the test keeps its own handle on the fake for assertions.
pub struct SharedRenderer(pub Arc<FakeRenderer>);

pub fn boxed_renderer(renderer: &Arc<FakeRenderer>) -> Box<dyn Renderer> {
    Box::new(SharedRenderer(Arc::clone(renderer)))
}

#[async_trait]
impl Renderer for SharedRenderer {
    async fn initialize(
        &self,
        demuxer: Arc<dyn Demuxer>,
        client: Arc<dyn RendererClient>,
    ) -> PipelineResult<()> {
        self.0.initialize(demuxer, client).await
    }

    async fn flush(&self) -> PipelineResult<()> {
        self.0.flush().await
    }

    fn start_playing_from(&self, time: Duration) {
        self.0.start_playing_from(time);
    }

    fn set_playback_rate(&self, rate: f64) {
        self.0.set_playback_rate(rate);
    }

    fn set_volume(&self, volume: f32) {
        self.0.set_volume(volume);
    }

    fn media_time(&self) -> Duration {
        self.0.media_time()
    }

    async fn set_cdm(&self, cdm: Arc<dyn CdmContext>) -> PipelineResult<()> {
        self.0.set_cdm(cdm).await
    }
}

pub struct SharedTextRenderer(pub Arc<FakeTextRenderer>);

pub fn boxed_text_renderer(renderer: &Arc<FakeTextRenderer>) -> Box<dyn TextRenderer> {
    Box::new(SharedTextRenderer(Arc::clone(renderer)))
}

#[async_trait]
impl TextRenderer for SharedTextRenderer {
    fn initialize(&self, ended_cb: TextEndedCallback) {
        self.0.initialize(ended_cb);
    }

    fn add_text_stream(&self, stream: DemuxerStream, config: TextTrackConfig) {
        self.0.add_text_stream(stream, config);
    }

    fn remove_text_stream(&self, stream: DemuxerStream) {
        self.0.remove_text_stream(stream);
    }

    async fn pause(&self) -> PipelineResult<()> {
        self.0.pause().await
    }

    async fn flush(&self) -> PipelineResult<()> {
        self.0.flush().await
    }

    fn start_playing(&self) {
        self.0.start_playing();
    }
}

// ============================================================================
// Misc
// ============================================================================

pub struct FakeCdm;

impl CdmContext for FakeCdm {}

pub fn text_config() -> TextTrackConfig {
    TextTrackConfig {
        kind: "subtitles".into(),
        label: "English".into(),
        language: Some("en".into()),
    }
}
