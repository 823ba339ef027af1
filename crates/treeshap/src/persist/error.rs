//! Persistence error types.

use thiserror::Error;

use crate::repr::EnsembleError;

/// Errors that can occur while writing an ensemble.
#[derive(Debug, Error)]
pub enum WriteError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Postcard encoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),

    /// A header field does not fit in 32 bits.
    #[error("{field} is too large for the binary format: {value}")]
    TooLarge { field: &'static str, value: usize },
}

/// Errors that can occur while reading an ensemble.
#[derive(Debug, Error)]
pub enum ReadError {
    /// File is not a treeshap ensemble (wrong magic).
    #[error("not a treeshap ensemble file")]
    NotAnEnsemble,

    /// Ensemble was written by a newer format version.
    #[error("ensemble uses format {major}.{minor}, which this version cannot read")]
    UnsupportedVersion { major: u32, minor: u32 },

    /// Payload checksum doesn't match.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// File was truncated or incomplete.
    #[error("file truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Payload decoded but is internally inconsistent.
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    /// Decoded trees failed validation.
    #[error("invalid ensemble: {0}")]
    Invalid(#[from] EnsembleError),

    /// I/O error during reading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Postcard decoding error.
    #[error("decoding error: {0}")]
    Decoding(#[from] postcard::Error),
}
