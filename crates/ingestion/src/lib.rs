//! Gridded ocean data ingestion library.
//!
//! Pulls ERDDAP griddap subsets for a region and period, stages them
//! atomically, decodes them into standardized rows, gates them on schema and
//! quality checks, and replaces the matching warehouse partition.
//!
//! # Architecture
//!
//! This crate is used by the `ingester` service. It handles:
//!
//! - Griddap query construction, including prime-meridian splits
//! - Fetching with classified, bounded retries
//! - Decoding and subsetting (daily, daily mean, centered composites)
//! - Validation reports and load gating
//! - Partition-replace loads and run auditing

pub mod config;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod pipeline;
pub mod recorder;
pub mod request;
pub mod validate;

// Re-exports
pub use config::{
    FallbackFill, FetchConfig, LoadConfig, SourceCatalog, SourceSpec, TimeMapping, TimeWindow,
    ValidationConfig, VariableSpec, VerticalSpec, DEFAULT_ERDDAP_BASE,
};
pub use error::{DecodeError, FetchError, IngestError, LoadError, Result, ValidationFailure};
pub use fetch::{
    retry_with_backoff, AttemptError, ErddapClient, FetchedPayload, GridServer, GriddapQuery,
    RemoteDataClient, RetryPolicy,
};
pub use loader::WarehouseLoader;
pub use pipeline::{Ingester, IngestionResult};
pub use recorder::{RunGuard, RunRecorder};
pub use request::{IngestionRequest, LoadMode};
pub use validate::{validate, ValidationReport};
