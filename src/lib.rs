#![forbid(unsafe_code)]

//! Segment aggregation and speaker assignment for chunked diarization jobs.
//!
//! Long audio assets are sliced into bounded chunks, each chunk is diarized
//! independently through a pluggable [`DiarizationService`], and the
//! chunk-local results are normalized, stitched onto one absolute timeline,
//! reduced to a bounded speaker set, aligned against the transcript, and
//! cached per asset.

pub mod audio;
pub mod cache;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod progress;
pub mod speakers;
pub mod stitch;

pub use engine::{AggregateOptions, Aggregator, DiarizationService};
pub use error::{VlError, VlResult};
pub use model::{
    AggregationResult, AudioChunk, ChunkRequest, DiarizationSegment, KnownSpeaker,
    TranscriptSegment,
};
pub use speakers::assign_speakers;
