//! Error types for the ekman engine.
//!
//! One enum covers every failure mode in the crate. Expected backend
//! failure shapes (HTTP error statuses from statistics/info calls) are
//! NOT errors here; builders normalize those into sentinel values, and
//! only transport-level or contract-violation failures surface as
//! `EkmanError`.

use thiserror::Error;

/// The main error type for ekman operations.
#[derive(Error, Debug)]
pub enum EkmanError {
    /// HTTP transport errors (unreachable host, connection reset, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid coordinate errors
    #[error("Invalid coordinates: {message}")]
    InvalidCoordinates { message: String },

    /// Invalid parameter errors (contract violations from upstream)
    #[error("Invalid parameter: {param} - {message}")]
    InvalidParameter { param: String, message: String },

    /// Data not found errors
    #[error("Data not found: {message}")]
    DataNotFound { message: String },

    /// WMS capability document parsing errors
    #[error("Capabilities error: {message}")]
    Capabilities { message: String },

    /// Chunked-array store access errors
    #[error("Chunked store error: {message}")]
    ChunkedStore { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed URL errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl EkmanError {
    /// Build a chunked-store error from anything displayable.
    pub fn store<E: std::fmt::Display>(e: E) -> Self {
        EkmanError::ChunkedStore {
            message: e.to_string(),
        }
    }
}

/// Convenience type alias for Results with EkmanError
pub type Result<T> = std::result::Result<T, EkmanError>;
