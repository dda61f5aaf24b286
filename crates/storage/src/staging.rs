//! Atomic staging of downloaded payloads.
//!
//! A payload is written to a uniquely named `.part` object, read back and
//! checked (size and SHA-256), then renamed onto its final key. Readers of the
//! final key therefore never observe a partially written file. The temp object
//! is removed on every failure path, and a drop guard removes it if the write
//! future is cancelled mid-flight.

use bytes::Bytes;
use object_store::{path::Path, ObjectStore};
use ocean_common::{Period, SourceKind};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// Deterministic identity of a staged file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingKey {
    pub source: SourceKind,
    pub region_id: String,
    pub period: Period,
    /// Set when a request is split into several server queries.
    pub part: Option<usize>,
}

impl StagingKey {
    pub fn new(source: SourceKind, region_id: impl Into<String>, period: Period) -> Self {
        Self {
            source,
            region_id: region_id.into(),
            period,
            part: None,
        }
    }

    pub fn with_part(mut self, part: usize) -> Self {
        self.part = Some(part);
        self
    }

    /// `raw/{source}/{region}/{start}_{end}[_partN].nc`
    pub fn path(&self) -> String {
        let suffix = self
            .part
            .map(|n| format!("_part{}", n))
            .unwrap_or_default();
        format!(
            "raw/{}/{}/{}_{}{}.nc",
            self.source, self.region_id, self.period.start, self.period.end, suffix
        )
    }
}

impl fmt::Display for StagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// A payload that has been durably staged under its final key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    pub key: StagingKey,
    pub size: u64,
    /// Lowercase hex SHA-256 of the content
    pub content_hash: String,
}

/// Writes payloads to an object store without ever exposing partial files.
#[derive(Clone)]
pub struct StagingWriter {
    store: Arc<dyn ObjectStore>,
    min_bytes: usize,
}

impl StagingWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            min_bytes: netcdf_parser::DEFAULT_MIN_BYTES,
        }
    }

    /// Minimum size for a cached file to be reused.
    pub fn with_min_bytes(mut self, min_bytes: usize) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Stage `payload` under `key`, replacing any previous object.
    ///
    /// `declared_len` is the server's Content-Length, when it sent one.
    #[instrument(skip(self, payload), fields(key = %key, size = payload.len()))]
    pub async fn write(
        &self,
        key: &StagingKey,
        payload: Bytes,
        declared_len: Option<u64>,
    ) -> StorageResult<StagedArtifact> {
        let final_path = Path::from(key.path());
        let mut temp = TempObject::new(
            self.store.clone(),
            Path::from(format!("{}.{}.part", key.path(), Uuid::new_v4())),
        );

        match self.write_verified(key, &temp.path, &final_path, payload, declared_len).await {
            Ok(artifact) => {
                temp.disarm();
                info!(
                    size = artifact.size,
                    content_hash = %artifact.content_hash,
                    "Staged artifact"
                );
                Ok(artifact)
            }
            Err(e) => {
                warn!(error = %e, "Staging failed, removing temp object");
                temp.remove().await;
                Err(e)
            }
        }
    }

    async fn write_verified(
        &self,
        key: &StagingKey,
        temp_path: &Path,
        final_path: &Path,
        payload: Bytes,
        declared_len: Option<u64>,
    ) -> StorageResult<StagedArtifact> {
        let integrity = |message: String| StorageError::Integrity {
            key: key.path(),
            message,
        };

        let size = payload.len() as u64;
        if let Some(declared) = declared_len {
            if declared != size {
                return Err(integrity(format!(
                    "received {} bytes but server declared {}",
                    size, declared
                )));
            }
        }

        let content_hash = sha256_hex(&payload);

        self.store
            .put(temp_path, payload.into())
            .await
            .map_err(|e| StorageError::ObjectStore(format!("Failed to write {}: {}", temp_path, e)))?;

        let written = self.read_path(temp_path).await?;
        if written.len() as u64 != size {
            return Err(integrity(format!(
                "temp object has {} bytes, expected {}",
                written.len(),
                size
            )));
        }
        if sha256_hex(&written) != content_hash {
            return Err(integrity("content hash mismatch after write".to_string()));
        }

        self.store
            .rename(temp_path, final_path)
            .await
            .map_err(|e| StorageError::ObjectStore(format!("Failed to rename onto {}: {}", final_path, e)))?;

        Ok(StagedArtifact {
            key: key.clone(),
            size,
            content_hash,
        })
    }

    /// Return the artifact already staged under `key`, if it looks like a
    /// usable NetCDF file.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn existing(&self, key: &StagingKey) -> StorageResult<Option<StagedArtifact>> {
        let location = Path::from(key.path());

        let bytes = match self.store.get(&location).await {
            Ok(result) => result.bytes().await.map_err(|e| {
                StorageError::ObjectStore(format!("Failed to read {}: {}", location, e))
            })?,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => {
                return Err(StorageError::ObjectStore(format!(
                    "Failed to check {}: {}",
                    location, e
                )))
            }
        };

        if let Err(e) = netcdf_parser::validate_header(&bytes, self.min_bytes) {
            warn!(error = %e, "Ignoring invalid cached artifact");
            return Ok(None);
        }

        debug!(size = bytes.len(), "Found cached artifact");
        Ok(Some(StagedArtifact {
            key: key.clone(),
            size: bytes.len() as u64,
            content_hash: sha256_hex(&bytes),
        }))
    }

    /// Read a staged artifact's content.
    pub async fn read(&self, artifact: &StagedArtifact) -> StorageResult<Bytes> {
        self.read_path(&Path::from(artifact.key.path())).await
    }

    async fn read_path(&self, location: &Path) -> StorageResult<Bytes> {
        let result = self
            .store
            .get(location)
            .await
            .map_err(|e| StorageError::ObjectStore(format!("Failed to read {}: {}", location, e)))?;

        result
            .bytes()
            .await
            .map_err(|e| StorageError::ObjectStore(format!("Failed to read bytes: {}", e)))
    }
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Scoped handle to a temp object; deletes it unless disarmed.
struct TempObject {
    store: Arc<dyn ObjectStore>,
    path: Path,
    armed: bool,
}

impl TempObject {
    fn new(store: Arc<dyn ObjectStore>, path: Path) -> Self {
        Self {
            store,
            path,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    async fn remove(&mut self) {
        self.armed = false;
        match self.store.delete(&self.path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => warn!(path = %self.path, error = %e, "Failed to remove temp object"),
        }
    }
}

impl Drop for TempObject {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Cancelled mid-write: clean up in the background.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = self.store.clone();
            let path = self.path.clone();
            handle.spawn(async move {
                let _ = store.delete(&path).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::throttle::{ThrottleConfig, ThrottledStore};
    use futures::TryStreamExt;
    use std::time::Duration;

    fn key() -> StagingKey {
        StagingKey::new(SourceKind::Sst, "NTT", Period::month(2001, 1).unwrap())
    }

    fn netcdf_like(len: usize) -> Bytes {
        let mut data = b"CDF\x01".to_vec();
        data.resize(len, 7);
        Bytes::from(data)
    }

    async fn list_all(store: &Arc<dyn ObjectStore>) -> Vec<String> {
        store
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .unwrap()
    }

    #[test]
    fn test_key_path() {
        assert_eq!(key().path(), "raw/sst/NTT/2001-01-01_2001-01-31.nc");
        assert_eq!(
            key().with_part(1).path(),
            "raw/sst/NTT/2001-01-01_2001-01-31_part1.nc"
        );
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let writer = StagingWriter::new(Arc::new(InMemory::new()));
        let payload = netcdf_like(2048);

        let artifact = writer.write(&key(), payload.clone(), Some(2048)).await.unwrap();
        assert_eq!(artifact.size, 2048);
        assert_eq!(artifact.content_hash, sha256_hex(&payload));
        assert_eq!(writer.read(&artifact).await.unwrap(), payload);

        let objects = list_all(writer.store()).await;
        assert_eq!(objects, vec![key().path()]);
    }

    #[tokio::test]
    async fn test_truncated_payload_leaves_nothing() {
        let writer = StagingWriter::new(Arc::new(InMemory::new()));

        let result = writer.write(&key(), netcdf_like(1500), Some(4096)).await;
        assert!(matches!(result, Err(StorageError::Integrity { .. })));
        assert!(list_all(writer.store()).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_rewrite_keeps_previous_file() {
        let writer = StagingWriter::new(Arc::new(InMemory::new()));
        let first = netcdf_like(2048);
        writer.write(&key(), first.clone(), None).await.unwrap();

        let result = writer.write(&key(), netcdf_like(3000), Some(10)).await;
        assert!(result.is_err());

        let existing = writer.existing(&key()).await.unwrap().unwrap();
        assert_eq!(existing.content_hash, sha256_hex(&first));
        assert_eq!(list_all(writer.store()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_existing_ignores_invalid_cache() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        store
            .put(&Path::from(key().path()), Bytes::from_static(b"<html>error</html>"))
            .await
            .unwrap();

        let writer = StagingWriter::new(store);
        assert!(writer.existing(&key()).await.unwrap().is_none());
        assert!(writer
            .existing(&key().with_part(2))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rewrite_is_last_writer_wins() {
        let writer = StagingWriter::new(Arc::new(InMemory::new()));
        writer.write(&key(), netcdf_like(2048), None).await.unwrap();
        let second = netcdf_like(4096);
        let artifact = writer.write(&key(), second.clone(), None).await.unwrap();

        assert_eq!(writer.read(&artifact).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_cancelled_write_removes_temp_object() {
        // Reads stall, so the write parks on the read-back with the temp object in place.
        let store = ThrottledStore::new(
            InMemory::new(),
            ThrottleConfig {
                wait_get_per_call: Duration::from_secs(30),
                ..Default::default()
            },
        );
        let writer = StagingWriter::new(Arc::new(store));

        let task = tokio::spawn({
            let writer = writer.clone();
            async move { writer.write(&key(), netcdf_like(2048), None).await }
        });

        let mut staged = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            staged = list_all(writer.store()).await;
            if !staged.is_empty() {
                break;
            }
        }
        assert_eq!(staged.len(), 1);
        assert!(staged[0].ends_with(".part"));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let mut remaining = staged;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remaining = list_all(writer.store()).await;
            if remaining.is_empty() {
                break;
            }
        }
        assert!(remaining.is_empty(), "left behind: {:?}", remaining);
    }
}
