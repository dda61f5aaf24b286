//! Run auditing: exactly one `ingest_runs` row per invocation.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use storage::{AuditSink, RunRecord, RunStatus};
use tracing::{error, info};
use uuid::Uuid;

/// Opens [`RunGuard`]s against an audit sink.
#[derive(Clone)]
pub struct RunRecorder {
    sink: Arc<dyn AuditSink>,
}

impl RunRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Mark the start of a run.
    pub fn start(&self, job_name: impl Into<String>) -> RunGuard {
        RunGuard {
            sink: self.sink.clone(),
            run_id: Uuid::new_v4(),
            job_name: job_name.into(),
            start_ts: Utc::now(),
            finished: false,
        }
    }
}

/// An open run. Finish it with [`RunGuard::success`] or [`RunGuard::failure`].
///
/// A guard dropped without finishing (the invocation was cancelled) spawns a
/// FAILED record with the note `cancelled` on the current runtime.
pub struct RunGuard {
    sink: Arc<dyn AuditSink>,
    run_id: Uuid,
    job_name: String,
    start_ts: DateTime<Utc>,
    finished: bool,
}

impl RunGuard {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub async fn success(mut self, rows_written: u64, notes: impl Into<String>) -> RunRecord {
        let record = self.record(RunStatus::Success, rows_written, notes.into());
        self.finish(record).await
    }

    /// Failed runs always record zero rows written.
    pub async fn failure(mut self, notes: impl Into<String>) -> RunRecord {
        let record = self.record(RunStatus::Failed, 0, notes.into());
        self.finish(record).await
    }

    fn record(&mut self, status: RunStatus, rows_written: u64, notes: String) -> RunRecord {
        self.finished = true;
        RunRecord {
            run_id: self.run_id,
            job_name: self.job_name.clone(),
            start_ts: self.start_ts,
            end_ts: Utc::now(),
            status,
            rows_written,
            notes,
        }
    }

    async fn finish(&self, record: RunRecord) -> RunRecord {
        append(self.sink.as_ref(), &record).await;
        info!(
            run_id = %record.run_id,
            job = %record.job_name,
            status = %record.status,
            rows_written = record.rows_written,
            "Run recorded"
        );
        record
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let record = self.record(RunStatus::Failed, 0, "cancelled".to_string());
        let sink = self.sink.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { append(sink.as_ref(), &record).await });
            }
            Err(_) => error!(run_id = %record.run_id, "Run cancelled outside a runtime, audit record lost"),
        }
    }
}

/// Audit failures are logged, never returned.
async fn append(sink: &dyn AuditSink, record: &RunRecord) {
    if let Err(e) = sink.append_run(record).await {
        error!(
            run_id = %record.run_id,
            job = %record.job_name,
            status = %record.status,
            error = %e,
            "Failed to write audit record"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use storage::{SqliteWarehouse, StorageError, StorageResult};

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn append_run(&self, _record: &RunRecord) -> StorageResult<()> {
            Err(StorageError::Database("connection refused".to_string()))
        }

        async fn recent_runs(&self, _limit: u32) -> StorageResult<Vec<RunRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_success_and_failure_records() {
        let sink = Arc::new(SqliteWarehouse::open_memory().await.unwrap());
        let recorder = RunRecorder::new(sink.clone());

        recorder.start("ingest_sst").success(124, "").await;
        recorder.start("ingest_chl").failure("FetchError: HTTP 404").await;

        let runs = sink.recent_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        let failed = runs.iter().find(|r| r.job_name == "ingest_chl").unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.rows_written, 0);
        assert_eq!(failed.notes, "FetchError: HTTP 404");
        let ok = runs.iter().find(|r| r.job_name == "ingest_sst").unwrap();
        assert_eq!(ok.rows_written, 124);
        assert!(ok.end_ts >= ok.start_ts);
    }

    #[tokio::test]
    async fn test_audit_error_does_not_fail_caller() {
        let recorder = RunRecorder::new(Arc::new(BrokenSink));
        let record = recorder.start("ingest_sst").success(3, "").await;
        assert_eq!(record.status, RunStatus::Success);
    }

    #[tokio::test]
    async fn test_dropped_guard_records_cancellation() {
        let sink = Arc::new(SqliteWarehouse::open_memory().await.unwrap());
        let recorder = RunRecorder::new(sink.clone());

        let guard = recorder.start("ingest_waves");
        let run_id = guard.run_id();
        drop(guard);

        let mut runs = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            runs = sink.recent_runs(10).await.unwrap();
            if !runs.is_empty() {
                break;
            }
        }
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, run_id);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].notes, "cancelled");
    }
}
