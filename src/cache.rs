//! Idempotent per-asset result cache.
//!
//! One JSON document per asset under `{cache_dir}/{asset_id}/diarization.json`.
//! Loading is strict about shape and forgiving about failure: anything short
//! of a well-formed document with both record lists is a cache miss, never an
//! error. Saving is best-effort and atomic (temp file plus rename), so a
//! crash mid-write leaves either the old document or none at all.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::VlResult;
use crate::model::AggregationResult;

const CACHE_FILE_NAME: &str = "diarization.json";

/// Hex characters of the asset fingerprint kept as the cache identity.
const FINGERPRINT_HEX_CHARS: usize = 16;

/// Handle on one asset's cache slot.
#[derive(Debug, Clone)]
pub struct DiarizationCache {
    path: PathBuf,
}

impl DiarizationCache {
    #[must_use]
    pub fn new(cache_dir: &Path, asset_id: &str) -> Self {
        Self {
            path: cache_dir.join(asset_id).join(CACHE_FILE_NAME),
        }
    }

    /// Location of the cache document (which may not exist yet).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a previously saved result, or `None` when the slot is empty,
    /// unreadable, or malformed.
    #[must_use]
    pub fn load(&self) -> Option<AggregationResult> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, path = %self.path.display(), "discarding unparseable cache document");
                return None;
            }
        };

        if !has_expected_shape(&value) {
            warn!(path = %self.path.display(), "discarding cache document with unexpected shape");
            return None;
        }

        match serde_json::from_value(value) {
            Ok(result) => {
                debug!(path = %self.path.display(), "cache hit");
                Some(result)
            }
            Err(error) => {
                warn!(%error, path = %self.path.display(), "discarding undecodable cache document");
                None
            }
        }
    }

    /// Persist `result` for future runs. Failures are logged and swallowed;
    /// a cold cache on the next run is the only consequence.
    pub fn save(&self, result: &AggregationResult) {
        if let Err(error) = self.try_save(result) {
            warn!(%error, path = %self.path.display(), "failed to persist cache document");
        }
    }

    fn try_save(&self, result: &AggregationResult) -> VlResult<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut staged, result)?;
        staged.write_all(b"\n")?;
        staged
            .persist(&self.path)
            .map_err(|persist| persist.error)?;
        debug!(path = %self.path.display(), "cache document written");
        Ok(())
    }
}

/// Both record lists must be present as arrays before the document is
/// trusted; older or foreign files in the slot are treated as misses.
fn has_expected_shape(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    object.get("speakers").is_some_and(Value::is_array)
        && object.get("transcript").is_some_and(Value::is_array)
}

/// Content fingerprint of an asset file, used as the cache identity when the
/// caller does not supply one. Streaming SHA-256, truncated to a short hex
/// prefix that is still far beyond collision risk for a local cache.
pub fn asset_fingerprint(path: &Path) -> VlResult<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex.truncate(FINGERPRINT_HEX_CHARS);
    Ok(hex)
}
