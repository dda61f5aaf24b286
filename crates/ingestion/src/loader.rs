//! Warehouse load stage.

use ocean_common::GridRow;
use std::sync::Arc;
use std::time::Duration;
use storage::{PartitionScope, StorageError, Warehouse};
use tracing::{info, instrument};

use crate::error::LoadError;
use crate::request::{IngestionRequest, LoadMode};

/// Writes validated batches into their partition.
#[derive(Clone)]
pub struct WarehouseLoader {
    warehouse: Arc<dyn Warehouse>,
    timeout: Duration,
}

impl WarehouseLoader {
    pub fn new(warehouse: Arc<dyn Warehouse>, timeout: Duration) -> Self {
        Self { warehouse, timeout }
    }

    /// Load `rows` for `request` and return the number of rows written.
    ///
    /// In dry-run mode nothing is written and the returned count is what a
    /// replace would have written. The timeout bounds the partition writes;
    /// on expiry the warehouse rolls back and `LoadError::Timeout` is
    /// returned. A commit that has started always runs to completion.
    #[instrument(skip(self, rows), fields(source = %request.source, region = %request.region_id, period = %request.period, mode = %request.mode, rows = rows.len()))]
    pub async fn load(&self, rows: &[GridRow], request: &IngestionRequest) -> Result<u64, LoadError> {
        match request.mode {
            LoadMode::DryRun => {
                info!("Dry run, skipping warehouse write");
                Ok(rows.len() as u64)
            }
            LoadMode::Replace => {
                let scope = PartitionScope::new(request.source, &request.region_id, request.period);
                let written = self
                    .warehouse
                    .replace_partition(&scope, rows, self.timeout)
                    .await
                    .map_err(|e| match e {
                        StorageError::Timeout(after) => LoadError::Timeout(after),
                        other => LoadError::Warehouse(other),
                    })?;
                info!(written, "Partition replaced");
                Ok(written)
            }
        }
    }
}
