//! Cross-chunk timeline stitching and adjacent-run merging.
//!
//! Chunks are diarized independently, so their records arrive in
//! chunk-local time. The stitcher folds them into one job-absolute timeline
//! by maintaining a running offset; monotonic non-overlap across chunk
//! boundaries is guaranteed by construction, not by sorting afterwards.

use crate::model::{DiarizationSegment, TimedRecord, TranscriptSegment};

/// Gap below which two consecutive same-speaker intervals are treated as one
/// continuous run. Absorbs fragmentation from chunk boundaries and model
/// jitter.
pub const MERGE_GAP_TOLERANCE_SECS: f64 = 0.2;

/// Shift every record in `records` by `offset` seconds, returning new
/// records (inputs are not mutated).
#[must_use]
pub fn offset_records<T: TimedRecord + Clone>(records: &[T], offset: f64) -> Vec<T> {
    records
        .iter()
        .map(|record| {
            let mut shifted = record.clone();
            shifted.shift(offset);
            shifted
        })
        .collect()
}

/// Latest end timestamp across a record list, or 0.0 when empty.
#[must_use]
pub fn max_end<T: TimedRecord>(records: &[T]) -> f64 {
    records
        .iter()
        .map(TimedRecord::end)
        .fold(0.0, f64::max)
}

/// Running fold over per-chunk record pairs.
///
/// The offset advances by the larger of the chunk's declared duration and
/// the latest timestamp the service actually emitted for the chunk, so a
/// duration estimate that undershoots cannot make later chunks overlap
/// earlier ones. A chunk that yields no records at all still advances the
/// offset by its estimated duration so subsequent chunks stay positioned.
#[derive(Debug, Default)]
pub struct TimelineStitcher {
    offset: f64,
}

impl TimelineStitcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cumulative offset that the next chunk's records will be shifted by.
    #[must_use]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Shift one chunk's records into job-absolute time and advance the
    /// offset past the chunk.
    pub fn stitch_chunk(
        &mut self,
        diarization: &[DiarizationSegment],
        transcript: &[TranscriptSegment],
        chunk_duration: f64,
    ) -> (Vec<DiarizationSegment>, Vec<TranscriptSegment>) {
        let duration = chunk_duration.max(0.0);

        if diarization.is_empty() && transcript.is_empty() {
            self.offset += duration;
            return (Vec::new(), Vec::new());
        }

        let shifted_diarization = offset_records(diarization, self.offset);
        let shifted_transcript = offset_records(transcript, self.offset);

        let chunk_max_end = max_end(&shifted_diarization).max(max_end(&shifted_transcript));
        if duration > 0.0 {
            self.offset = (self.offset + duration).max(chunk_max_end);
        } else {
            self.offset = self.offset.max(chunk_max_end);
        }

        (shifted_diarization, shifted_transcript)
    }
}

/// Collapse consecutive same-speaker intervals whose gap is below
/// [`MERGE_GAP_TOLERANCE_SECS`]. Input must be sorted by start; merging only
/// ever extends the kept record's end, never shrinks it.
#[must_use]
pub fn merge_runs(segments: &[DiarizationSegment]) -> Vec<DiarizationSegment> {
    let mut merged: Vec<DiarizationSegment> = Vec::with_capacity(segments.len());

    for segment in segments {
        if let Some(previous) = merged.last_mut() {
            if previous.speaker == segment.speaker
                && (previous.end - segment.start).abs() < MERGE_GAP_TOLERANCE_SECS
            {
                previous.end = previous.end.max(segment.end);
                continue;
            }
        }
        merged.push(segment.clone());
    }

    merged
}
