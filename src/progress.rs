//! Multi-signal progress estimation for multi-chunk diarization jobs.
//!
//! Three clamped component ratios (duration processed, tokens produced,
//! chunks completed) blend into one monotonically non-decreasing value.
//! Token counts are crude character-based estimates; they exist to keep the
//! bar moving between duration updates, not to be accurate.

use crate::model::TranscriptSegment;

/// Expected token yield per second of audio.
pub const ESTIMATED_TOKENS_PER_SECOND: f64 = 4.0;

/// Assumed characters per token when estimating from transcript text.
pub const ASSUMED_CHARS_PER_TOKEN: f64 = 4.0;

/// Characters assumed per record when a transcript has records but no text.
const ASSUMED_CHARS_PER_EMPTY_RECORD: usize = 16;

const DURATION_WEIGHT: f64 = 0.5;
const TOKEN_WEIGHT: f64 = 0.3;
const CHUNK_WEIGHT: f64 = 0.2;

/// Expected total tokens for a job, from per-chunk durations. Floored at 1.0
/// so the token ratio never divides by zero.
#[must_use]
pub fn estimate_total_tokens(durations: &[f64]) -> f64 {
    let total: f64 = durations
        .iter()
        .map(|duration| duration.max(0.0) * ESTIMATED_TOKENS_PER_SECOND)
        .sum();
    total.max(1.0)
}

/// Approximate tokens produced by one chunk's transcript: characters / 4,
/// floored at the record count so short transcripts still register progress.
#[must_use]
pub fn estimate_transcript_tokens(segments: &[TranscriptSegment]) -> f64 {
    let mut total_chars: usize = segments.iter().map(|segment| segment.text.len()).sum();
    let record_count = segments.len();

    if total_chars == 0 && record_count == 0 {
        return 0.0;
    }
    if total_chars == 0 {
        total_chars = record_count * ASSUMED_CHARS_PER_EMPTY_RECORD;
    }
    (total_chars as f64 / ASSUMED_CHARS_PER_TOKEN).max(record_count as f64)
}

/// Weighted blend of the three component ratios, clamped to `[0, 1]`.
///
/// The token and chunk ratios fall back to the duration ratio when their
/// totals are unknown (`<= 0`), so a missing signal never drags the blend
/// toward zero.
#[must_use]
pub fn progress_ratio(
    processed_duration: f64,
    total_duration: f64,
    produced_tokens: f64,
    total_tokens: f64,
    chunks_done: usize,
    total_chunks: usize,
) -> f64 {
    let duration_ratio = if total_duration <= 0.0 {
        0.0
    } else {
        (processed_duration / total_duration).clamp(0.0, 1.0)
    };

    let token_ratio = if total_tokens <= 0.0 {
        duration_ratio
    } else {
        (produced_tokens / total_tokens).clamp(0.0, 1.0)
    };

    let chunk_ratio = if total_chunks == 0 {
        duration_ratio
    } else {
        (chunks_done as f64 / total_chunks as f64).clamp(0.0, 1.0)
    };

    (DURATION_WEIGHT * duration_ratio + TOKEN_WEIGHT * token_ratio + CHUNK_WEIGHT * chunk_ratio)
        .clamp(0.0, 1.0)
}

/// Mutable per-run progress accumulator, scoped to one aggregation call.
#[derive(Debug, Clone)]
pub struct ProgressState {
    processed_duration: f64,
    produced_tokens: f64,
    chunks_done: usize,
    total_duration: f64,
    total_tokens: f64,
    total_chunks: usize,
    completed: bool,
}

impl ProgressState {
    #[must_use]
    pub fn new(total_duration: f64, total_tokens: f64, total_chunks: usize) -> Self {
        Self {
            processed_duration: 0.0,
            produced_tokens: 0.0,
            chunks_done: 0,
            total_duration,
            total_tokens,
            total_chunks,
            completed: false,
        }
    }

    /// Account for one finished chunk, whether or not it yielded data.
    pub fn record_chunk(&mut self, duration: f64, tokens: f64) {
        self.processed_duration =
            (self.processed_duration + duration.max(0.0)).min(self.total_duration);
        self.produced_tokens += tokens.max(0.0);
        self.chunks_done += 1;
    }

    /// Force the estimator to report exactly 1.0. Called once after the last
    /// chunk, since floating-point accumulation may undershoot.
    pub fn force_complete(&mut self) {
        self.processed_duration = self.total_duration;
        self.produced_tokens = self.produced_tokens.max(self.total_tokens);
        self.chunks_done = self.total_chunks;
        self.completed = true;
    }

    #[must_use]
    pub fn chunks_done(&self) -> usize {
        self.chunks_done
    }

    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.completed {
            return 1.0;
        }
        progress_ratio(
            self.processed_duration,
            self.total_duration,
            self.produced_tokens,
            self.total_tokens,
            self.chunks_done,
            self.total_chunks,
        )
    }

    /// Human-readable progress line for log output.
    #[must_use]
    pub fn detail(&self) -> String {
        let total_minutes = if self.total_duration > 0.0 {
            self.total_duration / 60.0
        } else {
            0.0
        };
        let processed_minutes = self.processed_duration / 60.0;
        format!(
            "diarization {}/{} {:.1}m/{:.1}m tokens\u{2248}{}/{}",
            self.chunks_done,
            self.total_chunks,
            processed_minutes,
            total_minutes,
            self.produced_tokens as u64,
            self.total_tokens.max(1.0) as u64,
        )
    }
}
