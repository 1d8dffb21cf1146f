//! Error types for gcscope-core

use thiserror::Error;

/// Main error type for the gcscope-core library
///
/// Only the variants below ever leave the parser/pipeline boundary.
/// Unrecognized lines, missing fields and truncated trailing events are
/// recovered from locally and reported through [`ParseStats`](crate::parser::ParseStats).
#[derive(Error, Debug)]
pub enum Error {
    /// The collector family or log generation is unknown or not supported
    #[error("unsupported log format: {0}")]
    UnsupportedFormat(String),

    /// Input does not match the declared format at all
    #[error("malformed input for {format} log: {message}")]
    MalformedInput { format: String, message: String },

    /// A VM option string that could not be parsed
    #[error("malformed VM option: {0}")]
    MalformedVmOption(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for gcscope-core
pub type Result<T> = std::result::Result<T, Error>;
