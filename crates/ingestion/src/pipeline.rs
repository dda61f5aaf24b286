//! The ingestion pipeline.
//!
//! One [`Ingester::run`] call handles one (source, region, period) request
//! and runs the stages strictly in order:
//!
//! ```text
//! fetch -> stage -> decode -> validate -> load
//! ```
//!
//! wrapped by the run recorder, so every exit path leaves one audit row.
//! Only the fetch stage retries; every other failure ends the run.

use bytes::Bytes;
use chrono::Utc;
use metrics::counter;
use ocean_common::{GridRow, Region, RegionCatalog};
use std::sync::Arc;
use storage::{RunRecord, StagedArtifact, StagingKey, StagingWriter};
use tracing::{info, instrument, warn};

use crate::config::{SourceCatalog, SourceSpec, ValidationConfig};
use crate::decode::decode_payloads;
use crate::error::{DecodeError, IngestError, Result, ValidationFailure};
use crate::fetch::{build_queries, GriddapQuery, RemoteDataClient};
use crate::loader::WarehouseLoader;
use crate::recorder::RunRecorder;
use crate::request::IngestionRequest;
use crate::validate::{validate, ValidationReport};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct IngestionResult {
    pub run: RunRecord,
    pub artifacts: Vec<StagedArtifact>,
    pub report: ValidationReport,
    /// Rows written, or rows that would have been written in dry-run mode
    pub rows_written: u64,
}

struct StageOutput {
    artifacts: Vec<StagedArtifact>,
    report: ValidationReport,
    rows_written: u64,
}

/// Runs ingestion requests against shared, immutable configuration.
#[derive(Clone)]
pub struct Ingester {
    regions: Arc<RegionCatalog>,
    sources: Arc<SourceCatalog>,
    client: RemoteDataClient,
    staging: StagingWriter,
    loader: WarehouseLoader,
    recorder: RunRecorder,
    validation: ValidationConfig,
}

impl Ingester {
    pub fn new(
        regions: Arc<RegionCatalog>,
        sources: Arc<SourceCatalog>,
        client: RemoteDataClient,
        staging: StagingWriter,
        loader: WarehouseLoader,
        recorder: RunRecorder,
    ) -> Self {
        Self {
            regions,
            sources,
            client,
            staging,
            loader,
            recorder,
            validation: ValidationConfig::default(),
        }
    }

    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    /// Run one request end to end and record its outcome.
    #[instrument(skip(self, request), fields(source = %request.source, region = %request.region_id, period = %request.period, mode = %request.mode))]
    pub async fn run(&self, request: &IngestionRequest) -> Result<IngestionResult> {
        let guard = self.recorder.start(request.job_name());
        let context = format!(
            "region={} period={} mode={}",
            request.region_id, request.period, request.mode
        );

        match self.execute(request).await {
            Ok(output) => {
                let mut notes = context;
                for warning in output.report.warnings() {
                    notes.push_str("; ");
                    notes.push_str(warning);
                }
                let run = guard.success(output.rows_written, notes).await;

                counter!("ingest_runs_total", "status" => "success").increment(1);
                counter!("ingest_rows_written_total", "source" => request.source.as_str())
                    .increment(output.rows_written);
                info!(rows_written = output.rows_written, "Ingestion succeeded");

                Ok(IngestionResult {
                    run,
                    artifacts: output.artifacts,
                    report: output.report,
                    rows_written: output.rows_written,
                })
            }
            Err(e) => {
                guard
                    .failure(format!("{}: {} ({})", e.kind(), e, context))
                    .await;
                counter!("ingest_runs_total", "status" => "failed").increment(1);
                warn!(kind = e.kind(), error = %e, "Ingestion failed");
                Err(e)
            }
        }
    }

    async fn execute(&self, request: &IngestionRequest) -> Result<StageOutput> {
        let region = self.regions.get(&request.region_id)?.clone();
        let spec = self.sources.get(request.source).clone();

        // Fetch and stage every part before decoding any of them.
        let queries = build_queries(&spec, &region, &request.period)?;
        let split = queries.len() > 1;
        let mut artifacts = Vec::with_capacity(queries.len());
        let mut payloads = Vec::with_capacity(queries.len());
        for (i, query) in queries.iter().enumerate() {
            let mut key = StagingKey::new(request.source, &request.region_id, request.period);
            if split {
                key = key.with_part(i + 1);
            }
            let (artifact, bytes) = self.stage_part(&key, query, request.force_download).await?;
            artifacts.push(artifact);
            payloads.push(bytes);
        }

        let rows = self.decode(spec, region.clone(), request, payloads).await?;

        let report = validate(&rows, &region, request, &self.validation);
        for reason in &report.reasons {
            warn!(reason = %reason, "Validation finding");
        }
        if !report.passed {
            return Err(ValidationFailure {
                reasons: report.failures().map(str::to_string).collect(),
            }
            .into());
        }

        let rows_written = self.loader.load(&rows, request).await?;

        Ok(StageOutput {
            artifacts,
            report,
            rows_written,
        })
    }

    /// Reuse a valid staged file, or fetch and stage the part.
    async fn stage_part(
        &self,
        key: &StagingKey,
        query: &GriddapQuery,
        force_download: bool,
    ) -> Result<(StagedArtifact, Bytes)> {
        if !force_download {
            if let Some(artifact) = self.staging.existing(key).await.map_err(IngestError::Stage)? {
                info!(key = %key, "Using cached staged artifact");
                let bytes = self.staging.read(&artifact).await.map_err(IngestError::Stage)?;
                return Ok((artifact, bytes));
            }
        }

        let payload = self.client.fetch(query).await?;
        let artifact = self
            .staging
            .write(key, payload.bytes, payload.content_length)
            .await
            .map_err(IngestError::Stage)?;
        let bytes = self.staging.read(&artifact).await.map_err(IngestError::Stage)?;
        Ok((artifact, bytes))
    }

    /// Decode on the blocking pool; the NetCDF library is synchronous.
    async fn decode(
        &self,
        spec: SourceSpec,
        region: Region,
        request: &IngestionRequest,
        payloads: Vec<Bytes>,
    ) -> Result<Vec<GridRow>> {
        let period = request.period;
        let ingested_at = Utc::now();
        let rows = tokio::task::spawn_blocking(move || {
            decode_payloads(&spec, &region, &period, &payloads, ingested_at)
        })
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))??;

        info!(rows = rows.len(), "Decoded staged artifacts");
        Ok(rows)
    }
}
