//! Storage abstractions for the ingestion pipeline.
//!
//! Provides unified interfaces for:
//! - Object storage (local disk, MinIO/S3) for staged downloads
//! - SQL warehouse tables (PostgreSQL, SQLite) with partition replace
//! - The `ingest_runs` audit table

pub mod audit;
pub mod error;
pub mod object_store;
pub mod staging;
pub mod warehouse;

pub use self::object_store::{S3Config, StagingStoreConfig};
pub use audit::{RunRecord, RunStatus};
pub use error::{StorageError, StorageResult};
pub use staging::{sha256_hex, StagedArtifact, StagingKey, StagingWriter};
pub use warehouse::{AuditSink, PartitionScope, PgWarehouse, SqliteWarehouse, TableNames, Warehouse};
