//! Speaker cardinality limiting and overlap-based speaker assignment.

use std::collections::HashMap;

use tracing::debug;

use crate::model::{DiarizationSegment, TranscriptSegment};

/// Reduce the number of distinct speaker labels to at most `max_speakers`.
///
/// Speakers are ranked by total speaking duration (ties broken by first
/// appearance in the input); the top `max_speakers` stay. Each remaining
/// speaker is remapped, at first encounter, onto whichever allowed speaker
/// currently has the smallest accumulated duration; the mapping is then
/// reused for all of that speaker's records, with the target's running total
/// updated per record. Lossy and best-effort: record spans are never
/// altered, so total speaking duration is preserved, and degenerate input
/// (`max_speakers == 0`, or nothing to rank) passes through unchanged.
#[must_use]
pub fn limit_speaker_count(
    segments: Vec<DiarizationSegment>,
    max_speakers: usize,
) -> Vec<DiarizationSegment> {
    let mut durations: HashMap<&str, f64> = HashMap::new();
    let mut appearance: Vec<&str> = Vec::new();
    for segment in &segments {
        if !durations.contains_key(segment.speaker.as_str()) {
            appearance.push(&segment.speaker);
        }
        *durations.entry(&segment.speaker).or_insert(0.0) += segment.duration();
    }

    if appearance.len() <= max_speakers {
        return segments;
    }

    // Rank by duration descending, first appearance breaking ties.
    let mut ranked: Vec<&str> = appearance.clone();
    let order: HashMap<&str, usize> = appearance
        .iter()
        .enumerate()
        .map(|(position, speaker)| (*speaker, position))
        .collect();
    ranked.sort_by(|a, b| {
        durations[b]
            .total_cmp(&durations[a])
            .then_with(|| order[a].cmp(&order[b]))
    });

    let allowed: Vec<String> = ranked
        .iter()
        .take(max_speakers)
        .map(|speaker| (*speaker).to_owned())
        .collect();
    if allowed.is_empty() {
        return segments;
    }

    // Running totals parallel to `allowed`, kept in rank order so the
    // earliest-ranked speaker wins duration ties deterministically.
    let mut totals: Vec<f64> = allowed
        .iter()
        .map(|speaker| durations[speaker.as_str()])
        .collect();
    let mut mapping: HashMap<String, usize> = HashMap::new();
    let mut remapped = Vec::with_capacity(segments.len());

    for mut segment in segments {
        if allowed.contains(&segment.speaker) {
            remapped.push(segment);
            continue;
        }

        let target = *mapping
            .entry(segment.speaker.clone())
            .or_insert_with(|| smallest_total(&totals));
        debug!(
            from = %segment.speaker,
            to = %allowed[target],
            "remapping speaker over cardinality bound"
        );
        segment.speaker = allowed[target].clone();
        totals[target] += segment.duration();
        remapped.push(segment);
    }

    remapped
}

/// Index of the smallest running total; first (highest-ranked) entry wins
/// ties.
fn smallest_total(totals: &[f64]) -> usize {
    let mut best = 0;
    for (index, total) in totals.iter().enumerate().skip(1) {
        if *total < totals[best] {
            best = index;
        }
    }
    best
}

/// Annotate each transcript segment with the diarization speaker whose
/// interval overlaps it the most.
///
/// Pure with respect to both inputs: returns new transcript records. A
/// segment with no positive-overlap match keeps whatever speaker it already
/// carried (possibly none) — that is a documented degraded outcome, not an
/// error.
#[must_use]
pub fn assign_speakers(
    transcript: &[TranscriptSegment],
    diarization: &[DiarizationSegment],
) -> Vec<TranscriptSegment> {
    transcript
        .iter()
        .map(|segment| {
            let mut annotated = segment.clone();
            if let Some(label) = best_speaker(segment.start, segment.end, diarization) {
                annotated.speaker = Some(label.to_owned());
            }
            annotated
        })
        .collect()
}

/// Speaker label with the strictly greatest temporal overlap against
/// `[start, end)`, or `None` when nothing overlaps. Ties keep the
/// first-seen maximal segment in input order.
#[must_use]
pub fn best_speaker<'a>(
    start: f64,
    end: f64,
    diarization: &'a [DiarizationSegment],
) -> Option<&'a str> {
    let mut best_label: Option<&str> = None;
    let mut best_overlap = 0.0;

    for segment in diarization {
        if segment.end <= start || segment.start >= end {
            continue;
        }
        let overlap = segment.end.min(end) - segment.start.max(start);
        if overlap > best_overlap {
            best_overlap = overlap;
            best_label = Some(&segment.speaker);
        }
    }

    best_label
}
