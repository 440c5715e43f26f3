//! Shared value types exchanged across the pipeline contracts.
//!
//! Everything here is plain data: cloned freely between execution contexts and
//! never holding references into the pipeline's internals.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Stream Descriptors
// ============================================================================

/// Kind of elementary stream exposed by a demuxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Audio,
    Video,
    Text,
}

/// Opaque handle to a single demuxed elementary stream.
///
/// The pipeline core never reads stream payloads; it only checks which
/// streams exist and forwards text-stream handles to the text renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DemuxerStream {
    /// Demuxer-assigned stream identifier, stable for the session.
    pub id: u32,
    /// Elementary stream kind.
    pub stream_type: StreamType,
}

impl DemuxerStream {
    /// Create a new stream descriptor.
    pub fn new(id: u32, stream_type: StreamType) -> Self {
        Self { id, stream_type }
    }
}

/// Configuration for a text (subtitle/caption) track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextTrackConfig {
    /// Kind of track, e.g. "subtitles" or "captions".
    pub kind: String,
    /// Human-readable label.
    pub label: String,
    /// BCP-47 language tag, when known.
    pub language: Option<String>,
}

// ============================================================================
// Playback Metadata & Events
// ============================================================================

/// Metadata reported to the client once the demuxer and renderer have both
/// initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    /// Total stream duration, when the container reports one.
    pub duration: Option<Duration>,
    /// Offset of the media timeline relative to the wall clock origin the
    /// demuxer advertises (zero for non-live content).
    pub timeline_offset: Duration,
    /// Whether an audio stream is present.
    pub has_audio: bool,
    /// Whether a video stream is present.
    pub has_video: bool,
}

/// Buffering state reported by renderers and forwarded to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferingState {
    /// Not enough data buffered to play through.
    HaveNothing,
    /// Enough data buffered for playback to proceed.
    HaveEnough,
}

/// Natural (coded) size of the video stream, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl VideoSize {
    /// Create a new size descriptor.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Decode statistics accumulated over the life of a playback session.
///
/// Byte and frame counters only ever grow; the memory-usage fields report the
/// renderer's current footprint and are overwritten on each update (and zeroed
/// while the pipeline is suspended).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStatistics {
    /// Total encoded audio bytes decoded so far.
    pub audio_bytes_decoded: u64,
    /// Total encoded video bytes decoded so far.
    pub video_bytes_decoded: u64,
    /// Total video frames decoded so far.
    pub video_frames_decoded: u64,
    /// Total video frames dropped so far.
    pub video_frames_dropped: u64,
    /// Current audio decoder memory footprint, in bytes.
    pub audio_memory_usage: u64,
    /// Current video decoder memory footprint, in bytes.
    pub video_memory_usage: u64,
}

// ============================================================================
// Buffered Time Ranges
// ============================================================================

/// Ordered set of non-overlapping, half-open `[start, end)` time intervals
/// describing which parts of the media are buffered.
///
/// Adding a range merges it with any ranges it touches, so the set stays
/// sorted and disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedTimeRanges {
    ranges: Vec<(Duration, Duration)>,
}

impl BufferedTimeRanges {
    /// Create an empty range set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `[start, end)`, merging with adjacent or overlapping ranges.
    ///
    /// Empty or inverted intervals are ignored.
    pub fn add(&mut self, start: Duration, end: Duration) {
        if end <= start {
            return;
        }
        let mut merged_start = start;
        let mut merged_end = end;
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut inserted = false;
        for &(s, e) in &self.ranges {
            if e < merged_start || s > merged_end {
                if s > merged_end && !inserted {
                    out.push((merged_start, merged_end));
                    inserted = true;
                }
                out.push((s, e));
            } else {
                merged_start = merged_start.min(s);
                merged_end = merged_end.max(e);
            }
        }
        if !inserted {
            out.push((merged_start, merged_end));
        }
        self.ranges = out;
    }

    /// Number of disjoint ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the `i`-th range, in ascending order.
    pub fn get(&self, i: usize) -> Option<(Duration, Duration)> {
        self.ranges.get(i).copied()
    }

    /// Returns `true` if `time` falls inside a buffered range.
    pub fn contains(&self, time: Duration) -> bool {
        self.ranges.iter().any(|&(s, e)| time >= s && time < e)
    }

    /// Iterate over the ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (Duration, Duration)> + '_ {
        self.ranges.iter().copied()
    }
}
