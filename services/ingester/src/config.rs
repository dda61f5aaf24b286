//! Configuration loader for the ingester.
//!
//! One YAML file holds the region catalog plus everything the pipeline needs
//! at startup:
//!
//! ```yaml
//! regions:
//!   NTT:
//!     boundbox: { lat_min: -11.0, lat_max: -8.0, lon_min: 118.0, lon_max: 125.0 }
//! base_url: ${ERDDAP_BASE_URL:-https://coastwatch.pfeg.noaa.gov/erddap/griddap}
//! staging:
//!   backend: local
//!   root: ${STAGING_ROOT:-data/staging}
//! warehouse:
//!   backend: postgres
//!   url: ${DATABASE_URL}
//! fetch:
//!   max_attempts: 5
//! ```
//!
//! Supports environment variable substitution using `${VAR}` and
//! `${VAR:-default}` syntax before the YAML is parsed.

use anyhow::{bail, Context, Result};
use ingestion::{FetchConfig, LoadConfig, SourceCatalog, SourceSpec, ValidationConfig};
use ocean_common::RegionCatalog;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::{AuditSink, PgWarehouse, SqliteWarehouse, StagingStoreConfig, TableNames, Warehouse};
use tracing::info;

/// Everything except the region catalog.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngesterSettings {
    /// Replaces the ERDDAP base URL of every source
    pub base_url: Option<String>,
    /// Full source specs replacing the built-in entry of the same kind
    pub sources: Vec<SourceSpec>,
    pub staging: StagingStoreConfig,
    pub warehouse: WarehouseConfig,
    pub fetch: FetchConfig,
    pub validation: ValidationConfig,
    pub load: LoadConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    Postgres,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub backend: WarehouseBackend,
    /// Connection URL, required for postgres
    pub url: Option<String>,
    /// Database file, used by sqlite
    pub path: PathBuf,
    pub tables: TableNames,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: WarehouseBackend::Sqlite,
            url: None,
            path: PathBuf::from("data/warehouse.db"),
            tables: TableNames::default(),
        }
    }
}

/// The same connection serves as destination tables and audit sink.
pub struct WarehouseHandles {
    pub warehouse: Arc<dyn Warehouse>,
    pub audit: Arc<dyn AuditSink>,
}

impl WarehouseConfig {
    /// Connect to the configured backend and create missing tables.
    pub async fn connect(&self) -> Result<WarehouseHandles> {
        match self.backend {
            WarehouseBackend::Postgres => {
                let Some(url) = self.url.as_deref() else {
                    bail!("warehouse.url is required for the postgres backend");
                };
                let pg = PgWarehouse::connect(url, self.tables.clone())
                    .await
                    .context("Failed to connect to PostgreSQL warehouse")?;
                pg.migrate().await?;
                info!("Connected to PostgreSQL warehouse");
                let pg = Arc::new(pg);
                Ok(WarehouseHandles {
                    warehouse: pg.clone(),
                    audit: pg,
                })
            }
            WarehouseBackend::Sqlite => {
                let sqlite = SqliteWarehouse::open(&self.path, self.tables.clone())
                    .await
                    .with_context(|| format!("Failed to open SQLite warehouse {}", self.path.display()))?;
                info!(path = %self.path.display(), "Opened SQLite warehouse");
                let sqlite = Arc::new(sqlite);
                Ok(WarehouseHandles {
                    warehouse: sqlite.clone(),
                    audit: sqlite,
                })
            }
        }
    }
}

/// Fully loaded configuration.
#[derive(Debug, Clone)]
pub struct IngesterConfig {
    pub regions: RegionCatalog,
    pub sources: SourceCatalog,
    pub settings: IngesterSettings,
}

impl IngesterConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to load config file: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        let regions = RegionCatalog::from_yaml_str(&expanded).context("Invalid regions section")?;
        if regions.is_empty() {
            bail!("No regions configured");
        }

        let settings: IngesterSettings =
            serde_yaml::from_str(&expanded).context("Failed to parse ingester settings")?;
        validate_settings(&settings)?;

        let mut sources = SourceCatalog::with_overrides(settings.sources.iter().cloned())?;
        if let Some(base_url) = &settings.base_url {
            sources = sources.with_base_url(base_url);
        }

        Ok(Self {
            regions,
            sources,
            settings,
        })
    }
}

fn validate_settings(settings: &IngesterSettings) -> Result<()> {
    if settings.fetch.max_attempts == 0 {
        bail!("fetch.max_attempts must be at least 1");
    }
    if settings.fetch.initial_retry_delay_ms > settings.fetch.max_retry_delay_ms {
        bail!("fetch.initial_retry_delay_ms exceeds fetch.max_retry_delay_ms");
    }
    let threshold = settings.validation.null_rate_warn_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        bail!("validation.null_rate_warn_threshold must be within [0, 1], got {}", threshold);
    }
    if settings.load.timeout_secs == 0 {
        bail!("load.timeout_secs must be positive");
    }
    Ok(())
}

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> Result<String> {
    shellexpand::env(content)
        .map(|expanded| expanded.into_owned())
        .map_err(|e| anyhow::anyhow!("Environment variable {} not set", e.var_name))
}
