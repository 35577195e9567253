//! Diarization response normalization.
//!
//! Per-chunk service responses are untyped, nested payloads whose shape
//! varies by backend version: record lists appear at the top level
//! (`segments` / `words` / `items` / `utterances` / `results`), nested under
//! a `diarization` object, or inside a `data` array of entries. Extraction is
//! a fixed, ordered list of rules; each rule is a pure probe
//! `&Value -> Option<Vec<&Value>>`. Every rule is applied, the hits are
//! concatenated, and duplicates are dropped (first occurrence wins).

use std::collections::HashSet;

use serde_json::Value;

use crate::model::{DiarizationSegment, TranscriptSegment};

/// Timestamps with a magnitude above this are treated as 100-nanosecond
/// ticks rather than seconds. This is a heuristic, not a schema-declared
/// unit: no backend documents its timestamp unit, and a legitimate
/// second-based value this large would correspond to ~11 days of audio.
pub const TICK_THRESHOLD: f64 = 1_000_000.0;

/// Divisor converting 100-nanosecond ticks to seconds.
pub const TICKS_PER_SECOND: f64 = 10_000_000.0;

/// Speaker label used when the diarization channel is degraded and labels
/// must be synthesized from the transcript.
pub const UNKNOWN_SPEAKER: &str = "Unknown";

type ExtractionRule = for<'a> fn(&'a Value) -> Option<Vec<&'a Value>>;

const DIARIZATION_RULES: &[ExtractionRule] = &[
    top_level_segments,
    top_level_words,
    top_level_items,
    nested_diarization_segments,
    data_entry_diarization_lists,
];

const TRANSCRIPT_RULES: &[ExtractionRule] = &[
    top_level_segments,
    top_level_utterances,
    top_level_results,
    nested_diarization_segments,
    nested_diarization_utterances,
    data_entry_transcript_lists,
];

/// Extract speaker intervals from a raw per-chunk payload.
///
/// Records lacking a start value or a speaker label are discarded. Output
/// order follows probe order; the stitcher and run merger impose final order.
#[must_use]
pub fn extract_diarization_segments(payload: &Value) -> Vec<DiarizationSegment> {
    let mut segments = Vec::new();
    let mut seen = HashSet::new();

    for rule in DIARIZATION_RULES {
        let Some(nodes) = rule(payload) else {
            continue;
        };
        for node in nodes {
            let Some(segment) = parse_diarization_entry(node) else {
                continue;
            };
            let fingerprint = (
                round_millis(segment.start),
                round_millis(segment.end),
                segment.speaker.clone(),
            );
            if seen.insert(fingerprint) {
                segments.push(segment);
            }
        }
    }

    segments
}

/// Extract timed text records from a raw per-chunk payload, sorted ascending
/// by start time. Records with empty text (after trimming) are discarded; a
/// speaker label is carried through when present.
#[must_use]
pub fn extract_transcript_segments(payload: &Value) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    let mut seen = HashSet::new();

    for rule in TRANSCRIPT_RULES {
        let Some(nodes) = rule(payload) else {
            continue;
        };
        for node in nodes {
            let Some(segment) = parse_transcript_entry(node) else {
                continue;
            };
            let fingerprint = (
                round_millis(segment.start),
                round_millis(segment.end),
                segment.text.clone(),
            );
            if seen.insert(fingerprint) {
                segments.push(segment);
            }
        }
    }

    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    segments
}

/// Degrade gracefully when the diarization channel is empty: one speaker
/// interval per transcript record, labeled with the record's own speaker or
/// [`UNKNOWN_SPEAKER`].
#[must_use]
pub fn synthesize_diarization(transcript: &[TranscriptSegment]) -> Vec<DiarizationSegment> {
    transcript
        .iter()
        .map(|segment| DiarizationSegment {
            start: segment.start,
            end: segment.end,
            speaker: segment
                .speaker
                .clone()
                .unwrap_or_else(|| UNKNOWN_SPEAKER.to_owned()),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Extraction rules
// ---------------------------------------------------------------------------

fn object_list(value: Option<&Value>) -> Option<Vec<&Value>> {
    let items = value?.as_array()?;
    let objects: Vec<&Value> = items.iter().filter(|item| item.is_object()).collect();
    if objects.is_empty() {
        None
    } else {
        Some(objects)
    }
}

fn top_level_segments(payload: &Value) -> Option<Vec<&Value>> {
    object_list(payload.get("segments"))
}

fn top_level_words(payload: &Value) -> Option<Vec<&Value>> {
    object_list(payload.get("words"))
}

fn top_level_items(payload: &Value) -> Option<Vec<&Value>> {
    object_list(payload.get("items"))
}

fn top_level_utterances(payload: &Value) -> Option<Vec<&Value>> {
    object_list(payload.get("utterances"))
}

fn top_level_results(payload: &Value) -> Option<Vec<&Value>> {
    object_list(payload.get("results"))
}

fn nested_diarization_segments(payload: &Value) -> Option<Vec<&Value>> {
    object_list(payload.get("diarization")?.get("segments"))
}

fn nested_diarization_utterances(payload: &Value) -> Option<Vec<&Value>> {
    object_list(payload.get("diarization")?.get("utterances"))
}

fn data_entry_lists<'a>(payload: &'a Value, keys: &[&str]) -> Option<Vec<&'a Value>> {
    let entries = payload.get("data")?.as_array()?;
    let mut collected = Vec::new();
    for entry in entries {
        for key in keys {
            if let Some(mut nodes) = object_list(entry.get(*key)) {
                collected.append(&mut nodes);
            }
        }
    }
    if collected.is_empty() {
        None
    } else {
        Some(collected)
    }
}

fn data_entry_diarization_lists(payload: &Value) -> Option<Vec<&Value>> {
    data_entry_lists(payload, &["segments"])
}

fn data_entry_transcript_lists(payload: &Value) -> Option<Vec<&Value>> {
    data_entry_lists(payload, &["segments", "utterances"])
}

// ---------------------------------------------------------------------------
// Record parsing
// ---------------------------------------------------------------------------

fn parse_diarization_entry(node: &Value) -> Option<DiarizationSegment> {
    let (start, end) = parse_span(node)?;
    let speaker = speaker_label(node)?;
    Some(DiarizationSegment {
        start,
        end,
        speaker,
    })
}

fn parse_transcript_entry(node: &Value) -> Option<TranscriptSegment> {
    let text = node
        .get("text")
        .or_else(|| node.get("display_text"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())?
        .to_owned();

    let (start, end) = parse_span(node)?;

    Some(TranscriptSegment {
        start,
        end,
        text,
        speaker: speaker_label(node),
    })
}

/// Derive `(start, end)` from a record: `start` or `offset` for the start,
/// `end` or `start + duration` for the end, falling back to `end = start`.
/// Returns `None` when no start value exists at all.
fn parse_span(node: &Value) -> Option<(f64, f64)> {
    let raw_start = node.get("start").or_else(|| node.get("offset"))?;
    let start = coerce_seconds(raw_start).unwrap_or(0.0);

    let end = node
        .get("end")
        .and_then(coerce_seconds)
        .or_else(|| {
            node.get("duration")
                .and_then(coerce_seconds)
                .map(|duration| start + duration)
        })
        .unwrap_or(start);

    Some((start, end))
}

fn speaker_label(node: &Value) -> Option<String> {
    for key in ["speaker", "speaker_label", "speakerId", "speaker_id"] {
        match node.get(key) {
            Some(Value::String(label)) if !label.trim().is_empty() => {
                return Some(label.clone());
            }
            Some(Value::Number(id)) => return Some(id.to_string()),
            _ => {}
        }
    }
    None
}

/// Coerce a raw timestamp value into seconds, applying the tick heuristic.
fn coerce_seconds(value: &Value) -> Option<f64> {
    let numeric = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))?;

    if numeric.abs() > TICK_THRESHOLD {
        Some(numeric / TICKS_PER_SECOND)
    } else {
        Some(numeric)
    }
}

/// Fingerprint component: timestamps rounded to 3 decimals.
fn round_millis(value: f64) -> i64 {
    (value * 1_000.0).round() as i64
}
