//! End-to-end pipeline tests for the aggregation engine.
//!
//! A scripted in-process service stands in for the diarization backend: each
//! test queues the raw JSON documents the "service" will return, then checks
//! the assembled timeline, the cache behavior, and the failure paths.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use serde_json::{json, Value};

use voiceline::engine::{AggregateOptions, Aggregator, DiarizationService};
use voiceline::model::{AudioChunk, ChunkRequest};
use voiceline::{AggregationResult, VlError, VlResult};

// ---------------------------------------------------------------------------
// Scripted service
// ---------------------------------------------------------------------------

/// Pops one queued response per call and logs every chunk index it sees.
/// The shared call log lets a test inspect traffic after the engine has
/// consumed the service.
struct ScriptedService {
    responses: Vec<VlResult<Value>>,
    seen_chunks: Rc<RefCell<Vec<usize>>>,
}

impl ScriptedService {
    fn new(responses: Vec<VlResult<Value>>) -> (Self, Rc<RefCell<Vec<usize>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                responses,
                seen_chunks: Rc::clone(&log),
            },
            log,
        )
    }
}

impl DiarizationService for ScriptedService {
    fn diarize_chunk(&mut self, chunk: &AudioChunk, _request: &ChunkRequest) -> VlResult<Value> {
        self.seen_chunks.borrow_mut().push(chunk.index);
        if self.responses.is_empty() {
            Err(VlError::Service("scripted response queue exhausted".to_owned()))
        } else {
            self.responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// Fixture helpers
// ---------------------------------------------------------------------------

fn write_wav(path: &Path, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = (seconds * 8_000.0) as usize;
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for frame in 0..frames {
        writer.write_sample((frame % 100) as i32).expect("sample");
    }
    writer.finalize().expect("finalize");
}

/// Two pre-split chunk files next to the asset, so the engine processes two
/// chunks without needing an hour of synthetic audio.
fn two_chunk_asset(dir: &Path) -> std::path::PathBuf {
    let asset = dir.join("episode.wav");
    write_wav(&asset, 1.0);
    write_wav(&dir.join("episode_part001.wav"), 10.0);
    write_wav(&dir.join("episode_part002.wav"), 15.0);
    asset
}

fn run(
    dir: &Path,
    asset: &Path,
    responses: Vec<VlResult<Value>>,
    options: &AggregateOptions,
) -> VlResult<AggregationResult> {
    let (service, _) = ScriptedService::new(responses);
    let mut engine = Aggregator::new(service, dir.join("cache"));
    engine.aggregate(asset, options)
}

// ---------------------------------------------------------------------------
// Stitching across chunks
// ---------------------------------------------------------------------------

#[test]
fn two_chunk_run_stitches_onto_one_timeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = two_chunk_asset(dir.path());

    let chunk1 = json!({
        "segments": [
            {"start": 0.0, "end": 8.0, "speaker": "A", "text": "first chunk"},
        ]
    });
    let chunk2 = json!({
        "segments": [
            {"start": 0.0, "end": 2.0, "speaker": "B", "text": "second chunk"},
        ]
    });

    let result = run(
        dir.path(),
        &asset,
        vec![Ok(chunk1), Ok(chunk2)],
        &AggregateOptions::default(),
    )
    .expect("aggregate");

    assert_eq!(result.speakers.len(), 2);
    // Chunk 1 is 10 seconds, so chunk 2 records shift to [10, 12].
    assert!((result.speakers[1].start - 10.0).abs() < 1e-9);
    assert!((result.speakers[1].end - 12.0).abs() < 1e-9);
    assert_eq!(result.transcript[1].text, "second chunk");
    assert!((result.transcript[1].start - 10.0).abs() < 1e-9);
}

#[test]
fn empty_middle_chunk_still_advances_the_timeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = two_chunk_asset(dir.path());

    let chunk2 = json!({
        "segments": [
            {"start": 0.0, "end": 3.0, "speaker": "B", "text": "after silence"},
        ]
    });
    let result = run(
        dir.path(),
        &asset,
        vec![Ok(json!({"segments": []})), Ok(chunk2)],
        &AggregateOptions::default(),
    )
    .expect("aggregate");

    // The silent 10 second chunk must still push chunk 2 to absolute time.
    assert_eq!(result.speakers.len(), 1);
    assert!((result.speakers[0].start - 10.0).abs() < 1e-9);
}

#[test]
fn chunks_are_processed_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = two_chunk_asset(dir.path());

    let payload = json!({
        "segments": [{"start": 0.0, "end": 1.0, "speaker": "A", "text": "x"}]
    });
    let (service, log) = ScriptedService::new(vec![Ok(payload.clone()), Ok(payload)]);
    let mut engine = Aggregator::new(service, dir.path().join("cache"));
    engine
        .aggregate(&asset, &AggregateOptions::default())
        .expect("aggregate");

    assert_eq!(*log.borrow(), vec![1, 2]);
}

// ---------------------------------------------------------------------------
// Speaker reduction and run merging
// ---------------------------------------------------------------------------

#[test]
fn same_speaker_across_chunk_boundary_merges_into_one_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = two_chunk_asset(dir.path());

    // Chunk 1 ends with A speaking to 10.0; chunk 2 opens with A at 0.1,
    // which lands at absolute 10.1, inside the merge tolerance.
    let chunk1 = json!({
        "segments": [{"start": 5.0, "end": 10.0, "speaker": "A", "text": "before"}]
    });
    let chunk2 = json!({
        "segments": [{"start": 0.1, "end": 4.0, "speaker": "A", "text": "after"}]
    });
    let result = run(
        dir.path(),
        &asset,
        vec![Ok(chunk1), Ok(chunk2)],
        &AggregateOptions::default(),
    )
    .expect("aggregate");

    assert_eq!(result.speakers.len(), 1, "boundary run must merge");
    assert!((result.speakers[0].start - 5.0).abs() < 1e-9);
    assert!((result.speakers[0].end - 14.1).abs() < 1e-9);
    // Transcript records are never merged.
    assert_eq!(result.transcript.len(), 2);
}

#[test]
fn max_speakers_reduces_cardinality_and_reassigns_transcript() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = dir.path().join("audio.wav");
    write_wav(&asset, 1.0);

    let payload = json!({
        "segments": [
            {"start": 0.0, "end": 30.0, "speaker": "host", "text": "long intro"},
            {"start": 30.0, "end": 50.0, "speaker": "guest", "text": "reply"},
            {"start": 50.0, "end": 51.0, "speaker": "crosstalk", "text": "brief"},
        ]
    });
    let options = AggregateOptions {
        max_speakers: Some(2),
        ..AggregateOptions::default()
    };
    let result = run(dir.path(), &asset, vec![Ok(payload)], &options).expect("aggregate");

    let mut labels: Vec<&str> = result.speakers.iter().map(|s| s.speaker.as_str()).collect();
    labels.sort_unstable();
    labels.dedup();
    assert!(labels.len() <= 2, "got: {labels:?}");
    // Every transcript record must carry one of the surviving labels.
    for segment in &result.transcript {
        let speaker = segment.speaker.as_deref().expect("assigned speaker");
        assert!(labels.contains(&speaker), "unexpected label {speaker}");
    }
}

// ---------------------------------------------------------------------------
// Degraded and failing services
// ---------------------------------------------------------------------------

#[test]
fn transcript_only_service_yields_synthesized_speakers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = dir.path().join("audio.wav");
    write_wav(&asset, 1.0);

    let payload = json!({
        "utterances": [
            {"start": 0.0, "end": 2.0, "text": "who is talking"},
            {"start": 2.0, "end": 4.0, "text": "nobody knows"},
        ]
    });
    let result = run(
        dir.path(),
        &asset,
        vec![Ok(payload)],
        &AggregateOptions::default(),
    )
    .expect("aggregate");

    assert_eq!(result.speakers.len(), 1, "adjacent unknown runs merge");
    assert_eq!(result.speakers[0].speaker, "Unknown");
    assert_eq!(result.transcript.len(), 2);
}

#[test]
fn bad_request_from_service_carries_remediation_guidance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = dir.path().join("audio.wav");
    write_wav(&asset, 1.0);

    let err = run(
        dir.path(),
        &asset,
        vec![Err(VlError::bad_request("corrupt audio payload"))],
        &AggregateOptions::default(),
    )
    .expect_err("must fail");

    assert_eq!(err.error_code(), "VL-BAD-REQUEST");
    let text = err.to_string();
    assert!(text.contains("corrupt audio payload"), "got: {text}");
    assert!(text.contains("regenerate the audio cache"), "got: {text}");
}

#[test]
fn mid_run_failure_aborts_and_leaves_cache_cold() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = two_chunk_asset(dir.path());

    let chunk1 = json!({
        "segments": [{"start": 0.0, "end": 5.0, "speaker": "A", "text": "ok"}]
    });
    let err = run(
        dir.path(),
        &asset,
        vec![Ok(chunk1), Err(VlError::Service("backend gone".to_owned()))],
        &AggregateOptions::default(),
    )
    .expect_err("must fail");
    assert_eq!(err.error_code(), "VL-SERVICE");

    // A retry with working responses must re-run both chunks, not replay a
    // half-finished cache entry.
    let chunk = json!({
        "segments": [{"start": 0.0, "end": 5.0, "speaker": "A", "text": "ok"}]
    });
    let (service, log) = ScriptedService::new(vec![Ok(chunk.clone()), Ok(chunk)]);
    let mut engine = Aggregator::new(service, dir.path().join("cache"));
    engine
        .aggregate(&asset, &AggregateOptions::default())
        .expect("retry");
    assert_eq!(log.borrow().len(), 2);
}

// ---------------------------------------------------------------------------
// Cache behavior
// ---------------------------------------------------------------------------

#[test]
fn second_run_short_circuits_to_the_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = dir.path().join("audio.wav");
    write_wav(&asset, 1.0);
    let cache_dir = dir.path().join("cache");

    let payload = json!({
        "segments": [{"start": 0.0, "end": 2.0, "speaker": "A", "text": "hello"}]
    });
    let (service, _) = ScriptedService::new(vec![Ok(payload)]);
    let mut engine = Aggregator::new(service, cache_dir.clone());
    let first = engine
        .aggregate(&asset, &AggregateOptions::default())
        .expect("first run");

    let (service, log) = ScriptedService::new(vec![]);
    let mut engine = Aggregator::new(service, cache_dir);
    let second = engine
        .aggregate(&asset, &AggregateOptions::default())
        .expect("second run");

    assert_eq!(first, second);
    assert!(log.borrow().is_empty(), "cache hit must not call the service");
}

#[test]
fn corrupt_cache_entry_falls_back_to_a_fresh_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = dir.path().join("audio.wav");
    write_wav(&asset, 1.0);
    let cache_dir = dir.path().join("cache");

    let options = AggregateOptions {
        cache_id: Some("episode-1".to_owned()),
        ..AggregateOptions::default()
    };
    let slot = cache_dir.join("episode-1");
    std::fs::create_dir_all(&slot).expect("mkdir");
    std::fs::write(slot.join("diarization.json"), b"{ truncated").expect("write");

    let payload = json!({
        "segments": [{"start": 0.0, "end": 2.0, "speaker": "A", "text": "fresh"}]
    });
    let (service, log) = ScriptedService::new(vec![Ok(payload)]);
    let mut engine = Aggregator::new(service, cache_dir);
    let result = engine.aggregate(&asset, &options).expect("aggregate");

    assert_eq!(log.borrow().len(), 1, "corrupt cache must not short-circuit");
    assert_eq!(result.transcript[0].text, "fresh");
}

#[test]
fn cached_document_is_readable_json_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = dir.path().join("audio.wav");
    write_wav(&asset, 1.0);
    let cache_dir = dir.path().join("cache");

    let options = AggregateOptions {
        cache_id: Some("episode-7".to_owned()),
        ..AggregateOptions::default()
    };
    let payload = json!({
        "segments": [{"start": 0.0, "end": 2.0, "speaker": "A", "text": "persisted"}]
    });
    let (service, _) = ScriptedService::new(vec![Ok(payload)]);
    let mut engine = Aggregator::new(service, cache_dir.clone());
    engine.aggregate(&asset, &options).expect("aggregate");

    let raw = std::fs::read_to_string(cache_dir.join("episode-7").join("diarization.json"))
        .expect("read cache file");
    let value: Value = serde_json::from_str(&raw).expect("valid json");
    assert!(value["speakers"].is_array());
    assert!(value["transcript"].is_array());
}

// ---------------------------------------------------------------------------
// Heterogeneous payload shapes through the whole pipeline
// ---------------------------------------------------------------------------

#[test]
fn nested_and_tick_based_payloads_normalize_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let asset = dir.path().join("audio.wav");
    write_wav(&asset, 1.0);

    // Vendor shape: records under data[0], tick timestamps, offset alias.
    let payload = json!({
        "data": [{
            "segments": [
                {"offset": 20_000_000.0, "end": 50_000_000.0, "speaker_label": "S1"},
            ],
            "utterances": [
                {"offset": 20_000_000.0, "end": 50_000_000.0, "display_text": " spoken words "},
            ],
        }]
    });
    let result = run(
        dir.path(),
        &asset,
        vec![Ok(payload)],
        &AggregateOptions::default(),
    )
    .expect("aggregate");

    assert_eq!(result.speakers.len(), 1);
    assert!((result.speakers[0].start - 2.0).abs() < 1e-9);
    assert!((result.speakers[0].end - 5.0).abs() < 1e-9);
    assert_eq!(result.speakers[0].speaker, "S1");
    assert_eq!(result.transcript[0].text, "spoken words");
    assert_eq!(result.transcript[0].speaker.as_deref(), Some("S1"));
}
