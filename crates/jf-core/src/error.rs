//! Error types for jetfit

use thiserror::Error;

/// jetfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unrecognized measurement method name
    #[error("unsupported measurement method \"{0}\"")]
    UnsupportedMethod(String),

    /// Unrecognized jet-correction form label
    #[error("unknown correction form \"{0}\"")]
    UnknownCorrectionForm(String),

    /// Constraint specification that does not parse
    #[error("malformed constraint \"{0}\"")]
    MalformedConstraint(String),

    /// Lookup of a nuisance parameter that was never registered
    #[error("unknown nuisance parameter \"{0}\"")]
    UnknownNuisance(String),

    /// Serialized fit record that is internally inconsistent
    #[error("serialization mismatch: {0}")]
    SerializationMismatch(String),

    /// Validation error
    #[error("validation error: {0}")]
    Validation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
