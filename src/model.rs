use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Common view over timeline entries: a span in absolute seconds.
///
/// `end() >= start()` is expected everywhere; zero-length spans are legal
/// (instantaneous events) and are produced as a defensive fallback when a
/// source payload carries no usable end timestamp.
pub trait TimedRecord {
    fn start(&self) -> f64;
    fn end(&self) -> f64;
    /// Shift the span by `offset` seconds (chunk-local to job-absolute time).
    fn shift(&mut self, offset: f64);
}

/// A timed transcript segment with text and an optional speaker label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl TimedRecord for TranscriptSegment {
    fn start(&self) -> f64 {
        self.start
    }

    fn end(&self) -> f64 {
        self.end
    }

    fn shift(&mut self, offset: f64) {
        self.start += offset;
        self.end += offset;
    }
}

/// A timed speaker interval from the diarization channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizationSegment {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

impl DiarizationSegment {
    /// Speaking time covered by this interval, clamped at zero.
    #[must_use]
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

impl TimedRecord for DiarizationSegment {
    fn start(&self) -> f64 {
        self.start
    }

    fn end(&self) -> f64 {
        self.end
    }

    fn shift(&mut self, offset: f64) {
        self.start += offset;
        self.end += offset;
    }
}

/// One bounded slice of a source audio asset, processed as an independent
/// unit of diarization work. Created by the chunker (or reloaded from a
/// prior chunking on disk); never deleted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    pub path: PathBuf,
    /// Best-effort duration in seconds, always > 0.
    pub duration_secs: f64,
    /// 1-based position in the chunk sequence (matches the on-disk
    /// `_partNNN` numbering).
    pub index: usize,
}

/// The assembled per-asset output: the canonical diarization timeline plus
/// the globally ordered transcript. This is also the cache payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub speakers: Vec<DiarizationSegment>,
    pub transcript: Vec<TranscriptSegment>,
}

/// A caller-supplied speaker hint, optionally backed by reference audio.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownSpeaker {
    pub name: String,
    pub reference_audio: Option<PathBuf>,
}

impl KnownSpeaker {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference_audio: None,
        }
    }

    #[must_use]
    pub fn with_reference(name: impl Into<String>, reference_audio: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            reference_audio: Some(reference_audio.into()),
        }
    }
}

/// Per-chunk request context handed to the diarization service collaborator.
/// Built once per aggregation run and reused for every chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub known_speaker_names: Vec<String>,
    /// Reference audio encoded as `data:audio/wav;base64,...` URLs. Names
    /// with reference audio form a prefix of `known_speaker_names`, so entry
    /// `i` here belongs to name `i`; name-only hints follow that prefix.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub known_speaker_references: Vec<String>,
}
