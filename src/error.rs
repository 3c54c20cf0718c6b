//! Error taxonomy shared by the cipher, pipeline and store layers.
//!
//! Only [`Error::Transient`] is retried by the pipeline. Everything else is
//! either fatal for the whole call (configuration, authorization) or fatal
//! for one file (rejections, prehash mismatches, local I/O).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::cipher::ContentDigest;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid arguments detected before any work starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Account credentials were refused.
    #[error("authorization failed: {0}")]
    Auth(String),

    /// Network failure or a status the store asks us to retry.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The store answered with a status that retrying cannot fix.
    #[error("request rejected with status {status} ({code}): {message}")]
    Rejected { status: u16, code: String, message: String },

    /// The bytes streamed in pass two differ from what pass one measured.
    #[error("prehash mismatch for {}: expected {expected}, got {actual}", path.display())]
    PrehashMismatch { path: PathBuf, expected: ContentDigest, actual: ContentDigest },

    /// A sink refused to overwrite an existing file.
    #[error("destination exists: {} (set force to overwrite)", .0.display())]
    DestinationExists(PathBuf),

    /// The retry budget for one file is exhausted.
    #[error("upload of {} failed after {attempts} attempt(s): {source}", path.display())]
    PermanentUploadFailure {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true when another attempt may succeed.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Transient(error.to_string())
    }
}
