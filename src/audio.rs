//! Audio chunking and best-effort duration estimation.
//!
//! The diarization service imposes per-request duration and payload-size
//! limits, so oversized WAV assets are sliced into fixed windows along frame
//! boundaries, preserving the original sample format. Chunking is a
//! best-effort optimization: any read or decode failure degrades to treating
//! the whole asset as a single chunk, never to failing the job.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec};
use tracing::{debug, warn};

use crate::error::VlResult;
use crate::model::AudioChunk;

/// Assets longer than this must be split before submission.
pub const MAX_SINGLE_DURATION_SECS: f64 = 3_600.0;

/// Assets larger than this must be split before submission.
pub const MAX_SINGLE_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Window length of each produced chunk.
pub const CHUNK_WINDOW_SECS: f64 = 1_800.0;

/// Byte-rate heuristic for duration when container metadata is unusable:
/// 16 kHz mono s16le.
pub const FALLBACK_BYTES_PER_SECOND: f64 = 32_000.0;

/// Last-resort duration so downstream timing never divides by zero.
pub const NOMINAL_FALLBACK_SECS: f64 = 1.0;

const FALLBACK_SAMPLE_RATE: u32 = 16_000;

/// Split `asset` into bounded chunks, or return it whole when no ceiling is
/// exceeded. Idempotent: chunk files already present on disk (matched by the
/// `{base}_partNNN.wav` naming convention) are returned unchanged and never
/// regenerated.
#[must_use]
pub fn chunk_asset(asset: &Path) -> Vec<AudioChunk> {
    let directory = asset.parent().unwrap_or_else(|| Path::new("."));
    let base = asset
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("audio");

    let existing = list_existing_chunks(directory, base);

    let byte_size = fs::metadata(asset).map(|meta| meta.len()).unwrap_or(0);
    let duration = wav_duration_secs(asset).unwrap_or(0.0);
    let needs_split = duration > MAX_SINGLE_DURATION_SECS || byte_size > MAX_SINGLE_SIZE_BYTES;

    let paths = if !existing.is_empty() {
        debug!(count = existing.len(), "reusing existing chunk files");
        existing
    } else if !needs_split {
        vec![asset.to_path_buf()]
    } else {
        match split_wav_file(asset, directory, base, CHUNK_WINDOW_SECS) {
            Ok(produced) if !produced.is_empty() => produced,
            Ok(_) => vec![asset.to_path_buf()],
            Err(error) => {
                warn!(%error, asset = %asset.display(), "chunking failed; using whole asset");
                vec![asset.to_path_buf()]
            }
        }
    };

    paths
        .into_iter()
        .enumerate()
        .map(|(position, path)| AudioChunk {
            duration_secs: estimate_duration_secs(&path),
            path,
            index: position + 1,
        })
        .collect()
}

/// Exact duration from WAV container metadata, when readable.
#[must_use]
pub fn wav_duration_secs(path: &Path) -> Option<f64> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

/// Best-effort duration, always > 0. Precedence: exact container metadata,
/// then the byte-rate heuristic, then [`NOMINAL_FALLBACK_SECS`].
#[must_use]
pub fn estimate_duration_secs(path: &Path) -> f64 {
    if let Some(duration) = wav_duration_secs(path) {
        if duration > 0.0 {
            return duration;
        }
    }

    let byte_size = fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
    if byte_size > 0 {
        let duration = byte_size as f64 / FALLBACK_BYTES_PER_SECOND;
        if duration > 0.0 {
            return duration;
        }
    }

    NOMINAL_FALLBACK_SECS
}

fn chunk_file_path(directory: &Path, base: &str, index: usize) -> PathBuf {
    directory.join(format!("{base}_part{index:03}.wav"))
}

/// Previously produced chunk files for `base`, sorted by name (the
/// zero-padded index makes lexical order equal sequence order).
fn list_existing_chunks(directory: &Path, base: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(directory) else {
        return Vec::new();
    };

    let prefix = format!("{base}_part");
    let mut chunks: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if name.starts_with(&prefix) && name.to_ascii_lowercase().ends_with(".wav") {
                let path = entry.path();
                path.is_file().then_some(path)
            } else {
                None
            }
        })
        .collect();
    chunks.sort();
    chunks
}

/// Slice a WAV file into windows of `window_secs`, preserving the source
/// sample format. Windows that produce zero frames are dropped.
pub(crate) fn split_wav_file(
    asset: &Path,
    directory: &Path,
    base: &str,
    window_secs: f64,
) -> VlResult<Vec<PathBuf>> {
    let mut reader = hound::WavReader::open(asset)?;
    let spec = reader.spec();

    let sample_rate = if spec.sample_rate == 0 {
        FALLBACK_SAMPLE_RATE
    } else {
        spec.sample_rate
    };
    let mut frames_per_window = (window_secs * f64::from(sample_rate)) as u64;
    if frames_per_window == 0 {
        frames_per_window = u64::from(sample_rate);
    }
    let samples_per_window = frames_per_window * u64::from(spec.channels.max(1));

    match spec.sample_format {
        SampleFormat::Float => {
            copy_windows::<f32, _>(&mut reader, spec, directory, base, samples_per_window)
        }
        SampleFormat::Int => {
            copy_windows::<i32, _>(&mut reader, spec, directory, base, samples_per_window)
        }
    }
}

fn copy_windows<S, R>(
    reader: &mut hound::WavReader<R>,
    spec: WavSpec,
    directory: &Path,
    base: &str,
    samples_per_window: u64,
) -> VlResult<Vec<PathBuf>>
where
    S: hound::Sample + Copy,
    R: std::io::Read,
{
    let mut produced = Vec::new();
    let mut samples = reader.samples::<S>();
    let mut index = 0usize;

    loop {
        index += 1;
        let path = chunk_file_path(directory, base, index);
        let mut writer = hound::WavWriter::create(&path, spec)?;
        let mut written: u64 = 0;

        while written < samples_per_window {
            match samples.next() {
                Some(sample) => {
                    writer.write_sample(sample?)?;
                    written += 1;
                }
                None => break,
            }
        }
        writer.finalize()?;

        if written == 0 {
            // Empty window; drop the file and stop.
            let _ = fs::remove_file(&path);
            break;
        }
        produced.push(path);
        if written < samples_per_window {
            break;
        }
    }

    Ok(produced)
}
