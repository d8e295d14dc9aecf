//! Error types for mss-aggregate

use std::path::PathBuf;

use thiserror::Error;

/// Result type for aggregation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Aggregation errors
///
/// Stem- and track-level variants are recovered locally by the pipeline
/// (skip and record). Only [`Error::is_fatal`] errors abort a run.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV read/write error
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Compressed audio decode error
    #[error("Decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Rule document or configuration rejected at load time
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single input stem could not be used
    #[error("Corrupt stem {stem}: {reason}")]
    CorruptStem { stem: String, reason: String },

    /// A stem named in a track's metadata has no usable audio
    #[error("Missing stem {stem}: {reason}")]
    MissingStem { stem: String, reason: String },

    /// Per-track metadata could not be interpreted
    #[error("Malformed track {track}: {reason}")]
    MalformedTrack { track: String, reason: String },

    /// Write destination is out of space or quota
    #[error("Storage exhausted while writing {path}: {source}")]
    StorageExhausted {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Permission denied: {path}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::StorageExhausted { .. } | Error::PermissionDenied { .. }
        )
    }

    /// Classify an I/O error raised while touching `path`.
    ///
    /// Out-of-space, quota and permission failures become fatal variants,
    /// everything else stays a plain [`Error::Io`].
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) if code == libc::ENOSPC || code == libc::EDQUOT => {
                Error::StorageExhausted {
                    path: path.into(),
                    source: err,
                }
            }
            _ if err.kind() == std::io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: path.into(),
                source: err,
            },
            _ => Error::Io(err),
        }
    }

    pub(crate) fn corrupt_stem(stem: impl Into<String>, reason: impl ToString) -> Self {
        Error::CorruptStem {
            stem: stem.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn missing_stem(stem: impl Into<String>, reason: impl ToString) -> Self {
        Error::MissingStem {
            stem: stem.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed_track(track: impl Into<String>, reason: impl ToString) -> Self {
        Error::MalformedTrack {
            track: track.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_enospc_is_fatal() {
        let err = Error::from_io("/out/a.wav", io::Error::from_raw_os_error(libc::ENOSPC));
        assert!(matches!(err, Error::StorageExhausted { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_permission_denied_is_fatal() {
        let err = Error::from_io(
            "/out/a.wav",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_other_io_is_recoverable() {
        let err = Error::from_io("/out/a.wav", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_fatal());
        assert!(!Error::corrupt_stem("S01", "truncated").is_fatal());
    }
}
