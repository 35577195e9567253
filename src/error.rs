use std::path::PathBuf;

use thiserror::Error;

pub type VlResult<T> = Result<T, VlError>;

/// Guidance attached to service bad-request failures. The most common cause
/// in practice is a stale or mis-encoded audio cache.
pub const BAD_REQUEST_REMEDIATION: &str =
    "regenerate the audio cache and verify ffmpeg/codec support";

#[derive(Debug, Error)]
pub enum VlError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("wav failure: {0}")]
    Wav(#[from] hound::Error),

    #[error("missing configuration: {0}")]
    Config(String),

    #[error("diarization service failure: {0}")]
    Service(String),

    #[error("diarization service rejected the request: {message}; {BAD_REQUEST_REMEDIATION}")]
    BadRequest { message: String },

    #[error("missing known-speaker reference audio at `{0}`")]
    MissingReference(PathBuf),
}

impl VlError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        let message = message.into();
        let trimmed = message.trim();
        Self::BadRequest {
            message: if trimmed.is_empty() {
                "unknown service error".to_owned()
            } else {
                trimmed.to_owned()
            },
        }
    }

    /// Stable, machine-readable error code for every variant.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "VL-IO",
            Self::Json(_) => "VL-JSON",
            Self::Wav(_) => "VL-WAV",
            Self::Config(_) => "VL-CONFIG",
            Self::Service(_) => "VL-SERVICE",
            Self::BadRequest { .. } => "VL-BAD-REQUEST",
            Self::MissingReference(_) => "VL-MISSING-REFERENCE",
        }
    }

    /// Bad-request failures are actionable by the caller (after remediation);
    /// everything else is fatal for the job.
    #[must_use]
    pub const fn is_caller_actionable(&self) -> bool {
        matches!(self, Self::BadRequest { .. })
    }
}
