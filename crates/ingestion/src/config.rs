//! Source specifications and stage settings.
//!
//! Built-in [`SourceSpec`]s describe the three ERDDAP products. Every field
//! can be overridden from the service's YAML config.

use ocean_common::{measurement_columns, Granularity, LonConvention, SourceKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::IngestError;

/// Public CoastWatch West Coast node.
pub const DEFAULT_ERDDAP_BASE: &str = "https://coastwatch.pfeg.noaa.gov/erddap/griddap";

/// Upper bound for query padding and composite half-windows.
const MAX_WINDOW_DAYS: i64 = 366;

/// How the query's time window is derived from the requested period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeWindow {
    /// `[start T00:00Z, end T00:00Z]`
    InclusiveDays,
    /// `[start T00:00Z, end+1 T00:00Z]`, with rows filtered back to the period
    EndExclusive,
    /// `[start T00:00Z, end+days T00:00Z]`, for centered composites
    PaddedEnd { days: i64 },
}

/// Value rule applied when the file declares no fill attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FallbackFill {
    AtOrBelow(f64),
    AtOrAbove(f64),
}

impl FallbackFill {
    pub fn is_fill(&self, value: f64) -> bool {
        match *self {
            FallbackFill::AtOrBelow(t) => value <= t,
            FallbackFill::AtOrAbove(t) => value >= t,
        }
    }
}

/// How time steps map onto rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeMapping {
    /// One row per time step, keyed by its UTC date
    Daily,
    /// Mean of all time steps sharing a UTC date, nulls skipped
    DailyMean,
    /// Centered composite: `[center - before, center + after]`
    Composite { before_days: i64, after_days: i64 },
}

/// A remote variable and the column it feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Name in the remote dataset
    pub remote: String,
    /// Destination column
    pub column: String,
    /// Physical range; values outside become null
    #[serde(default)]
    pub valid_range: Option<(f64, f64)>,
}

/// A singleton vertical dimension selected in queries (zlev, altitude, depth).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalSpec {
    pub name: String,
    pub value: f64,
}

/// Everything needed to fetch and standardize one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub kind: SourceKind,
    pub base_url: String,
    pub dataset_id: String,
    /// In measurement column order
    pub variables: Vec<VariableSpec>,
    pub vertical: Option<VerticalSpec>,
    pub lon_convention: LonConvention,
    pub time_window: TimeWindow,
    pub time_mapping: TimeMapping,
    pub fallback_fill: FallbackFill,
    /// Provenance written to every row
    pub source_label: String,
}

impl SourceSpec {
    /// Built-in spec for a source.
    pub fn builtin(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Sst => Self {
                kind,
                base_url: DEFAULT_ERDDAP_BASE.to_string(),
                dataset_id: "ncdcOisst21Agg".to_string(),
                variables: vec![VariableSpec {
                    remote: "sst".to_string(),
                    column: "sst_c".to_string(),
                    valid_range: None,
                }],
                vertical: Some(VerticalSpec {
                    name: "zlev".to_string(),
                    value: 0.0,
                }),
                lon_convention: LonConvention::Zero360,
                time_window: TimeWindow::InclusiveDays,
                time_mapping: TimeMapping::Daily,
                fallback_fill: FallbackFill::AtOrBelow(-9.0),
                source_label: "NOAA_OISST_v2_1_via_ERDDAP".to_string(),
            },
            SourceKind::Chl => Self {
                kind,
                base_url: DEFAULT_ERDDAP_BASE.to_string(),
                dataset_id: "erdMBchla8day_LonPM180".to_string(),
                variables: vec![VariableSpec {
                    remote: "chlorophyll".to_string(),
                    column: "chl_mg_m3".to_string(),
                    valid_range: None,
                }],
                vertical: Some(VerticalSpec {
                    name: "altitude".to_string(),
                    value: 0.0,
                }),
                lon_convention: LonConvention::Pm180,
                time_window: TimeWindow::PaddedEnd { days: 7 },
                time_mapping: TimeMapping::Composite {
                    before_days: 3,
                    after_days: 4,
                },
                fallback_fill: FallbackFill::AtOrBelow(-9_990_000.0),
                source_label: "NOAA_ERDDAP_erdMBchla8day_LonPM180".to_string(),
            },
            SourceKind::Waves => Self {
                kind,
                base_url: DEFAULT_ERDDAP_BASE.to_string(),
                dataset_id: "NWW3_Global_Best".to_string(),
                variables: vec![
                    VariableSpec {
                        remote: "Thgt".to_string(),
                        column: "swh_m".to_string(),
                        valid_range: Some((0.0, 40.0)),
                    },
                    VariableSpec {
                        remote: "Tper".to_string(),
                        column: "peak_period_s".to_string(),
                        valid_range: Some((0.0, 60.0)),
                    },
                ],
                vertical: Some(VerticalSpec {
                    name: "depth".to_string(),
                    value: 0.0,
                }),
                lon_convention: LonConvention::Zero360,
                time_window: TimeWindow::EndExclusive,
                time_mapping: TimeMapping::DailyMean,
                fallback_fill: FallbackFill::AtOrAbove(9e35),
                source_label: "PacIOOS_WW3_Global_via_ERDDAP_NWW3_Global_Best".to_string(),
            },
        }
    }

    pub fn remote_variables(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.remote.as_str()).collect()
    }

    /// Check that the spec produces rows of its kind's shape.
    ///
    /// Variables must feed the kind's measurement columns in order, and the
    /// time mapping must match the kind's granularity.
    pub fn check(&self) -> Result<(), String> {
        let expected = measurement_columns(self.kind);
        let columns: Vec<&str> = self.variables.iter().map(|v| v.column.as_str()).collect();
        if columns != expected {
            return Err(format!(
                "{} variables feed columns [{}], expected [{}]",
                self.kind,
                columns.join(", "),
                expected.join(", ")
            ));
        }
        if let Some(v) = self.variables.iter().find(|v| v.remote.trim().is_empty()) {
            return Err(format!("{} column {} has an empty remote name", self.kind, v.column));
        }
        for v in &self.variables {
            if let Some((min, max)) = v.valid_range {
                if min.is_nan() || max.is_nan() || min > max {
                    return Err(format!("{} valid_range for {} is empty: [{}, {}]", self.kind, v.column, min, max));
                }
            }
        }
        if self.dataset_id.trim().is_empty() {
            return Err(format!("{} dataset_id is empty", self.kind));
        }
        if self.source_label.trim().is_empty() {
            return Err(format!("{} source_label is empty", self.kind));
        }

        if let TimeWindow::PaddedEnd { days } = self.time_window {
            if !(0..=MAX_WINDOW_DAYS).contains(&days) {
                return Err(format!("{} time window padding {} days is out of range", self.kind, days));
            }
        }

        match (self.kind.granularity(), self.time_mapping) {
            (Granularity::Daily, TimeMapping::Daily | TimeMapping::DailyMean) => Ok(()),
            (
                Granularity::Composite { days },
                TimeMapping::Composite {
                    before_days,
                    after_days,
                },
            ) => {
                let in_range = |d: i64| (0..=MAX_WINDOW_DAYS).contains(&d);
                if !in_range(before_days) || !in_range(after_days) {
                    return Err(format!(
                        "{} composite window -{}/+{} days is out of range",
                        self.kind, before_days, after_days
                    ));
                }
                if before_days + after_days + 1 != i64::from(days) {
                    return Err(format!(
                        "{} composite window -{}/+{} days does not span {} days",
                        self.kind, before_days, after_days, days
                    ));
                }
                Ok(())
            }
            (granularity, mapping) => Err(format!(
                "{} has {:?} granularity but time mapping {:?}",
                self.kind, granularity, mapping
            )),
        }
    }
}

/// Immutable set of source specs, built once at startup.
#[derive(Debug, Clone)]
pub struct SourceCatalog {
    specs: Vec<SourceSpec>,
}

impl Default for SourceCatalog {
    fn default() -> Self {
        Self {
            specs: SourceKind::ALL.iter().map(|k| SourceSpec::builtin(*k)).collect(),
        }
    }
}

impl SourceCatalog {
    /// Built-ins with `overrides` replacing same-kind entries.
    ///
    /// Each override must pass [`SourceSpec::check`].
    pub fn with_overrides(overrides: impl IntoIterator<Item = SourceSpec>) -> Result<Self, IngestError> {
        let mut catalog = Self::default();
        for spec in overrides {
            spec.check()
                .map_err(|e| IngestError::Config(format!("invalid source override: {}", e)))?;
            if let Some(slot) = catalog.specs.iter_mut().find(|s| s.kind == spec.kind) {
                *slot = spec;
            }
        }
        Ok(catalog)
    }

    pub fn get(&self, kind: SourceKind) -> &SourceSpec {
        self.specs
            .iter()
            .find(|s| s.kind == kind)
            .unwrap_or_else(|| unreachable!("catalog holds every SourceKind"))
    }

    /// Point every source at another ERDDAP server.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        for spec in &mut self.specs {
            spec.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }
}

/// Remote fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Smallest payload accepted as a NetCDF file
    pub min_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_retry_delay_ms: 2_000,
            max_retry_delay_ms: 120_000,
            request_timeout_secs: 600,
            min_bytes: netcdf_parser::DEFAULT_MIN_BYTES,
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Quality gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Primary-column null rate above which a warning is raised
    pub null_rate_warn_threshold: f64,
    /// Turn the null-rate warning into a failure
    pub block_on_null_rate: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            null_rate_warn_threshold: 0.5,
            block_on_null_rate: false,
        }
    }
}

/// Warehouse load settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub timeout_secs: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl LoadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
