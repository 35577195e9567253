//! End-to-end aggregation: chunk, diarize, stitch, reduce, align, cache.
//!
//! The engine owns no network code. It drives a [`DiarizationService`]
//! collaborator chunk by chunk and assembles whatever the service returns
//! into one job-absolute [`AggregationResult`]. All mutable state lives
//! inside a single `aggregate` call; the engine itself can be reused across
//! assets.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::audio;
use crate::cache::{self, DiarizationCache};
use crate::error::{VlError, VlResult};
use crate::model::{
    AggregationResult, AudioChunk, ChunkRequest, DiarizationSegment, KnownSpeaker,
    TranscriptSegment,
};
use crate::normalize;
use crate::progress::{self, ProgressState};
use crate::speakers::{assign_speakers, limit_speaker_count};
use crate::stitch::{merge_runs, TimelineStitcher};

/// The diarization backend seam. Implementations submit one chunk and return
/// the raw response document; the engine handles everything before and after.
pub trait DiarizationService {
    fn diarize_chunk(&mut self, chunk: &AudioChunk, request: &ChunkRequest) -> VlResult<Value>;
}

/// Per-run knobs for [`Aggregator::aggregate`].
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    /// Language hint forwarded to the service, when known.
    pub language: Option<String>,
    /// Upper bound on distinct speaker labels in the output. `None` (or 0)
    /// leaves the service's labeling untouched.
    pub max_speakers: Option<usize>,
    /// Caller-supplied speaker hints, optionally with reference audio.
    pub known_speakers: Vec<KnownSpeaker>,
    /// Explicit cache identity. When absent the asset's content fingerprint
    /// is used, so re-running on unchanged audio is a cache hit.
    pub cache_id: Option<String>,
}

/// Drives a [`DiarizationService`] over one asset at a time.
#[derive(Debug)]
pub struct Aggregator<S> {
    service: S,
    cache_dir: PathBuf,
}

impl<S: DiarizationService> Aggregator<S> {
    #[must_use]
    pub fn new(service: S, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            cache_dir: cache_dir.into(),
        }
    }

    /// Produce the aggregated diarization and transcript for `asset`.
    ///
    /// Cached results short-circuit before any service traffic. Service
    /// failures abort the run; degraded responses (missing speaker channel,
    /// empty chunks) do not.
    pub fn aggregate(
        &mut self,
        asset: &Path,
        options: &AggregateOptions,
    ) -> VlResult<AggregationResult> {
        let asset_id = match &options.cache_id {
            Some(id) => id.clone(),
            None => {
                ensure_asset_exists(asset)?;
                cache::asset_fingerprint(asset)?
            }
        };

        let result_cache = DiarizationCache::new(&self.cache_dir, &asset_id);
        if let Some(result) = result_cache.load() {
            info!(asset_id, "reusing cached diarization result");
            return Ok(result);
        }
        ensure_asset_exists(asset)?;

        let request = build_chunk_request(options)?;
        let chunks = audio::chunk_asset(asset);
        let durations: Vec<f64> = chunks.iter().map(|chunk| chunk.duration_secs).collect();
        let mut total_duration: f64 = durations.iter().sum();
        if total_duration <= 0.0 {
            total_duration = chunks.len() as f64;
        }
        let total_tokens = progress::estimate_total_tokens(&durations);
        let mut progress = ProgressState::new(total_duration, total_tokens, chunks.len());
        info!(
            asset = %asset.display(),
            chunks = chunks.len(),
            total_duration,
            "starting diarization"
        );

        let mut stitcher = TimelineStitcher::new();
        let mut speakers: Vec<DiarizationSegment> = Vec::new();
        let mut transcript: Vec<TranscriptSegment> = Vec::new();

        for chunk in &chunks {
            debug!(index = chunk.index, path = %chunk.path.display(), "submitting chunk");
            let payload = self.service.diarize_chunk(chunk, &request)?;

            let chunk_transcript = normalize::extract_transcript_segments(&payload);
            let mut chunk_diarization = normalize::extract_diarization_segments(&payload);
            if chunk_diarization.is_empty() && !chunk_transcript.is_empty() {
                warn!(
                    index = chunk.index,
                    "response carries no speaker intervals; synthesizing from transcript"
                );
                chunk_diarization = normalize::synthesize_diarization(&chunk_transcript);
            }

            let tokens = progress::estimate_transcript_tokens(&chunk_transcript);
            let (shifted_speakers, shifted_transcript) =
                stitcher.stitch_chunk(&chunk_diarization, &chunk_transcript, chunk.duration_secs);
            speakers.extend(shifted_speakers);
            transcript.extend(shifted_transcript);

            progress.record_chunk(chunk.duration_secs, tokens);
            info!(
                index = chunk.index,
                progress = progress.ratio(),
                detail = %progress.detail(),
                "chunk complete"
            );
        }
        progress.force_complete();

        if speakers.is_empty() && transcript.is_empty() {
            return Err(VlError::Service(
                "diarization produced no usable records for any chunk".to_owned(),
            ));
        }

        if let Some(max_speakers) = options.max_speakers {
            if max_speakers >= 1 {
                speakers = limit_speaker_count(speakers, max_speakers);
            }
        }

        let mut transcript = assign_speakers(&transcript, &speakers);
        speakers.sort_by(|a, b| a.start.total_cmp(&b.start));
        transcript.sort_by(|a, b| a.start.total_cmp(&b.start));
        let speakers = merge_runs(&speakers);

        let result = AggregationResult {
            speakers,
            transcript,
        };
        result_cache.save(&result);
        info!(
            speakers = result.speakers.len(),
            transcript = result.transcript.len(),
            "aggregation complete"
        );
        Ok(result)
    }

    /// Consume the engine and hand back its service.
    pub fn into_service(self) -> S {
        self.service
    }
}

fn ensure_asset_exists(asset: &Path) -> VlResult<()> {
    if asset.is_file() {
        Ok(())
    } else {
        Err(VlError::Config(format!(
            "audio asset not found at `{}`",
            asset.display()
        )))
    }
}

/// Fold the caller's speaker hints into the request forwarded with every
/// chunk. Names are trimmed and deduplicated; hints carrying reference audio
/// are emitted first so each `data:` URL pairs index-wise with its name, and
/// name-only hints are appended after that prefix.
fn build_chunk_request(options: &AggregateOptions) -> VlResult<ChunkRequest> {
    let mut names: Vec<String> = Vec::new();
    let mut references: Vec<String> = Vec::new();

    for speaker in &options.known_speakers {
        let Some(path) = &speaker.reference_audio else {
            continue;
        };
        let name = speaker.name.trim();
        if name.is_empty() || names.iter().any(|existing| existing == name) {
            continue;
        }
        references.push(encode_reference_audio(path)?);
        names.push(name.to_owned());
    }

    for speaker in &options.known_speakers {
        if speaker.reference_audio.is_some() {
            continue;
        }
        let name = speaker.name.trim();
        if name.is_empty() || names.iter().any(|existing| existing == name) {
            continue;
        }
        names.push(name.to_owned());
    }

    Ok(ChunkRequest {
        language: options.language.clone(),
        known_speaker_names: names,
        known_speaker_references: references,
    })
}

fn encode_reference_audio(path: &Path) -> VlResult<String> {
    if !path.is_file() {
        return Err(VlError::MissingReference(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    Ok(format!("data:audio/wav;base64,{}", STANDARD.encode(bytes)))
}
