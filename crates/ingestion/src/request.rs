//! A single ingestion run's parameters.

use ocean_common::{Period, SourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the load stage does with validated rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Run every stage but write nothing to the warehouse
    DryRun,
    /// Delete the target partition and insert the new rows in one transaction
    #[default]
    Replace,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::DryRun => f.write_str("dry-run"),
            LoadMode::Replace => f.write_str("replace"),
        }
    }
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "dry-run" | "dryrun" => Ok(LoadMode::DryRun),
            "replace" => Ok(LoadMode::Replace),
            other => Err(format!("unknown load mode '{}'", other)),
        }
    }
}

/// Parameters of one run: one source, one region, one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionRequest {
    pub source: SourceKind,
    pub region_id: String,
    pub period: Period,
    #[serde(default)]
    pub mode: LoadMode,
    /// Ignore a valid staged file and fetch again
    #[serde(default)]
    pub force_download: bool,
}

impl IngestionRequest {
    pub fn new(source: SourceKind, region_id: impl Into<String>, period: Period) -> Self {
        Self {
            source,
            region_id: region_id.into(),
            period,
            mode: LoadMode::Replace,
            force_download: false,
        }
    }

    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn force_download(mut self, force: bool) -> Self {
        self.force_download = force;
        self
    }

    /// Audit job name, e.g. `ingest_sst`.
    pub fn job_name(&self) -> String {
        format!("ingest_{}", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_mode_parse() {
        assert_eq!("dry-run".parse::<LoadMode>().unwrap(), LoadMode::DryRun);
        assert_eq!("DRY_RUN".parse::<LoadMode>().unwrap(), LoadMode::DryRun);
        assert_eq!("replace".parse::<LoadMode>().unwrap(), LoadMode::Replace);
        assert!("append".parse::<LoadMode>().is_err());
    }

    #[test]
    fn test_job_name() {
        let period = Period::month(2001, 1).unwrap();
        let request = IngestionRequest::new(SourceKind::Waves, "NTT", period);
        assert_eq!(request.job_name(), "ingest_waves");
        assert_eq!(request.mode, LoadMode::Replace);
        assert!(!request.force_download);
    }
}
