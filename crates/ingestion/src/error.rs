//! Error types for the ingestion crate.
//!
//! Each pipeline stage has its own error; [`IngestError`] rolls them up and
//! exposes a stable [`IngestError::kind`] used in audit notes.

use std::time::Duration;
use thiserror::Error;

use netcdf_parser::NetCdfError;
use storage::StorageError;

/// Remote fetch failures. Only produced after classification by the retry loop.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("non-retryable fetch failure: {0}")]
    Fatal(String),
}

/// The staged file does not have the expected structure.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    NetCdf(#[from] NetCdfError),

    #[error("variable '{variable}' has no {axis} axis")]
    MissingAxis { variable: String, axis: &'static str },

    #[error("variable '{variable}' has unexpected dimension '{dimension}' of length {len}")]
    UnexpectedDimension {
        variable: String,
        dimension: String,
        len: usize,
    },

    #[error("variables '{first}' and '{second}' are laid out on different grids")]
    MismatchedGrids { first: String, second: String },

    #[error("time axis: {0}")]
    TimeAxis(String),

    #[error("decode task failed: {0}")]
    Task(String),
}

/// The quality gate rejected the batch.
#[derive(Error, Debug)]
#[error("validation failed: {}", reasons.join("; "))]
pub struct ValidationFailure {
    pub reasons: Vec<String>,
}

/// Destination write failures.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Warehouse(#[from] StorageError),

    #[error("load timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that can end an ingestion run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid request: {0}")]
    Config(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("staging failed: {0}")]
    Stage(StorageError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl IngestError {
    /// Stable name of the failing stage.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Config(_) => "ConfigError",
            IngestError::Fetch(_) => "FetchError",
            IngestError::Stage(_) => "StageError",
            IngestError::Decode(_) => "DecodeError",
            IngestError::Validation(_) => "ValidationFailure",
            IngestError::Load(_) => "LoadError",
        }
    }
}

impl From<ocean_common::CommonError> for IngestError {
    fn from(e: ocean_common::CommonError) -> Self {
        IngestError::Config(e.to_string())
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
