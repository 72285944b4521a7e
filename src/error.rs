// src/error.rs
//! Error types for the NMEA pipeline

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NmeaError>;

/// Errors from the outer surfaces: configuration and input sources.
#[derive(Debug, Error)]
pub enum NmeaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Problems found while decoding a single line.
///
/// None of these stop the pipeline. They are surfaced as events next to
/// whatever partial data could still be recovered from the line.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeError {
    /// The line lacks the `$`/`!` sentinel or a usable address field.
    #[error("not an NMEA sentence: {line:?}")]
    NotASentence { line: String },
    /// The `*XX` suffix disagrees with the XOR of the framed characters.
    #[error("checksum mismatch: computed {computed:02X}, declared {declared:?}")]
    ChecksumMismatch { computed: u8, declared: String },
    /// A single field could not be read; the field decodes to absent.
    #[error("malformed {field} in {sentence}: {value:?}")]
    MalformedField {
        sentence: String,
        field: &'static str,
        value: String,
    },
    /// The sentence type has no typed decoder and was kept raw.
    #[error("unsupported sentence type {address}")]
    UnsupportedType { address: String },
}

impl DecodeError {
    pub fn is_checksum(&self) -> bool {
        matches!(self, DecodeError::ChecksumMismatch { .. })
    }
}
