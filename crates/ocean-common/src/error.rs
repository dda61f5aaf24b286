//! Error types shared across the ingestion workspace.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised while building the immutable run context
/// (regions, periods, source names).
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Invalid bounding box for region '{region_id}': {message}")]
    InvalidBoundingBox { region_id: String, message: String },

    #[error("Unknown region_id '{requested}'. Known region_id values: {known}")]
    UnknownRegion { requested: String, known: String },

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Failed to read region config: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("Failed to parse region config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}
