//! # Pipeline Contracts
//!
//! Traits and value types that sit between the playback pipeline core and its
//! external collaborators.
//!
//! ## Overview
//!
//! This crate defines the narrow contracts the pipeline consumes and exposes:
//!
//! - [`Demuxer`](demuxer::Demuxer) / [`DemuxerHost`](demuxer::DemuxerHost) -
//!   container parsing and stream discovery
//! - [`Renderer`](renderer::Renderer) / [`RendererClient`](renderer::RendererClient) -
//!   audio/video decode and output scheduling
//! - [`TextRenderer`](text::TextRenderer) - subtitle/caption cue sequencing
//! - [`PipelineClient`](client::PipelineClient) - notifications back to the
//!   embedding application
//!
//! Implementations live elsewhere; the pipeline core only ever sees trait
//! objects. Decoding algorithms, container parsing, DRM mechanics, network
//! I/O, and presentation are all behind these seams.
//!
//! ## Thread Safety
//!
//! All contracts require `Send + Sync`: the pipeline drives collaborators
//! from its own dedicated context while the embedding application calls in
//! from arbitrary contexts. See the individual traits for which side of that
//! boundary each callback arrives on.

pub mod client;
pub mod demuxer;
pub mod error;
pub mod renderer;
pub mod text;
pub mod types;

pub use error::{PipelineError, PipelineResult};

// Re-export commonly used types
pub use client::PipelineClient;
pub use demuxer::{Demuxer, DemuxerHost};
pub use renderer::{CdmContext, Renderer, RendererClient};
pub use text::{TextEndedCallback, TextRenderer};
pub use types::{
    BufferedTimeRanges, BufferingState, DemuxerStream, PipelineMetadata, PipelineStatistics,
    StreamType, TextTrackConfig, VideoSize,
};
