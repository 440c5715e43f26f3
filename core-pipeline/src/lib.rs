//! # Playback Pipeline Core
//!
//! Sequencing, state machine, and shared playback state for one media
//! playback session.
//!
//! ## Overview
//!
//! This crate coordinates the asynchronous initialization, playback, seeking,
//! suspension, and teardown of a demuxer and one or more content renderers:
//!
//! - [`PipelineController`] - the thread-agnostic public handle
//! - [`SharedPlaybackState`] - lock-guarded cross-context snapshot of
//!   position, buffered ranges, and decode statistics
//! - [`SerialTaskQueue`] - cancellable sequencing of multi-step asynchronous
//!   operations
//!
//! The state machine itself is internal: it runs on a dedicated spawned task
//! (the pipeline context) and is only reachable through the controller. The
//! demuxer/renderer contracts it drives live in `pipeline-traits`.

pub mod controller;
pub mod sequence;
pub mod shared_state;
pub mod state_machine;

pub use controller::PipelineController;
pub use sequence::SerialTaskQueue;
pub use shared_state::SharedPlaybackState;
pub use state_machine::PipelineState;

// The contracts this pipeline is built against.
pub use pipeline_traits as traits;
pub use pipeline_traits::{PipelineError, PipelineResult};
