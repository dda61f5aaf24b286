//! Object storage backends for staged downloads (local disk, MinIO/S3, memory).

use object_store::{
    aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, ObjectStore,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::error::{StorageError, StorageResult};

/// Where staged files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StagingStoreConfig {
    /// A directory on the local filesystem
    Local { root: PathBuf },
    /// An S3-compatible bucket
    S3(S3Config),
    /// Process memory; contents are lost on exit
    Memory,
}

impl Default for StagingStoreConfig {
    fn default() -> Self {
        StagingStoreConfig::Local {
            root: PathBuf::from("data/staging"),
        }
    }
}

/// Configuration for an S3/MinIO connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    #[serde(default = "default_region")]
    pub region: String,
    /// Allow HTTP (for local MinIO)
    #[serde(default)]
    pub allow_http: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl StagingStoreConfig {
    /// Build the configured store.
    pub fn build(&self) -> StorageResult<Arc<dyn ObjectStore>> {
        match self {
            StagingStoreConfig::Local { root } => {
                std::fs::create_dir_all(root).map_err(|e| {
                    StorageError::Config(format!("Failed to create {}: {}", root.display(), e))
                })?;
                let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
                    StorageError::Config(format!("Failed to open {}: {}", root.display(), e))
                })?;
                info!(root = %root.display(), "Using local staging store");
                Ok(Arc::new(store))
            }
            StagingStoreConfig::S3(config) => {
                let mut builder = AmazonS3Builder::new()
                    .with_endpoint(&config.endpoint)
                    .with_bucket_name(&config.bucket)
                    .with_access_key_id(&config.access_key_id)
                    .with_secret_access_key(&config.secret_access_key)
                    .with_region(&config.region);

                if config.allow_http {
                    builder = builder.with_allow_http(true);
                }

                let store = builder.build().map_err(|e| {
                    StorageError::Config(format!("Failed to create S3 client: {}", e))
                })?;
                info!(endpoint = %config.endpoint, bucket = %config.bucket, "Using S3 staging store");
                Ok(Arc::new(store))
            }
            StagingStoreConfig::Memory => Ok(Arc::new(InMemory::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_config() {
        let config: StagingStoreConfig =
            serde_yaml::from_str("backend: local\nroot: /tmp/staging\n").unwrap();
        assert!(matches!(config, StagingStoreConfig::Local { .. }));
    }

    #[test]
    fn test_build_local_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/staging");
        StagingStoreConfig::Local { root: root.clone() }
            .build()
            .unwrap();
        assert!(root.is_dir());
    }
}
