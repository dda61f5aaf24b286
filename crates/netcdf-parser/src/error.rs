//! Error types for NetCDF parsing operations.

use thiserror::Error;

/// Result type for NetCDF parser operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for NetCDF parsing.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Missing required variable, dimension or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Invalid data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Variable shape does not match its dimensions
    #[error("Shape mismatch for '{variable}': expected {expected} values, got {actual}")]
    ShapeMismatch {
        variable: String,
        expected: usize,
        actual: usize,
    },

    /// Unparseable CF time units attribute
    #[error("Invalid time units: {0}")]
    InvalidTimeUnits(String),
}
