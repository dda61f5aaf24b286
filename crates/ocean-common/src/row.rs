//! Standardized per-cell rows shared by the decoder, validator and warehouse.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::source::SourceKind;
use crate::time::Period;

/// Temporal key of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeKey {
    /// A single calendar day
    Daily(NaiveDate),
    /// A composite window, both bounds inclusive
    Composite {
        period_start_date: NaiveDate,
        period_end_date: NaiveDate,
    },
}

impl TimeKey {
    pub fn start(&self) -> NaiveDate {
        match self {
            TimeKey::Daily(d) => *d,
            TimeKey::Composite {
                period_start_date, ..
            } => *period_start_date,
        }
    }

    pub fn end(&self) -> NaiveDate {
        match self {
            TimeKey::Daily(d) => *d,
            TimeKey::Composite {
                period_end_date, ..
            } => *period_end_date,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, TimeKey::Composite { .. })
    }

    /// True when the key falls in (daily) or overlaps (composite) `period`.
    pub fn within(&self, period: &Period) -> bool {
        period.overlaps(self.start(), self.end())
    }
}

/// Per-source measured values. `None` marks a fill cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    Sst {
        sst_c: Option<f64>,
    },
    Chl {
        chl_mg_m3: Option<f64>,
    },
    Waves {
        swh_m: Option<f64>,
        peak_period_s: Option<f64>,
    },
}

impl Measurement {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Measurement::Sst { .. } => SourceKind::Sst,
            Measurement::Chl { .. } => SourceKind::Chl,
            Measurement::Waves { .. } => SourceKind::Waves,
        }
    }

    /// Measurement columns in table order.
    pub fn columns(&self) -> Vec<(&'static str, Option<f64>)> {
        match *self {
            Measurement::Sst { sst_c } => vec![("sst_c", sst_c)],
            Measurement::Chl { chl_mg_m3 } => vec![("chl_mg_m3", chl_mg_m3)],
            Measurement::Waves {
                swh_m,
                peak_period_s,
            } => vec![("swh_m", swh_m), ("peak_period_s", peak_period_s)],
        }
    }

    /// The column whose null rate gates a load.
    pub fn primary(&self) -> (&'static str, Option<f64>) {
        match *self {
            Measurement::Sst { sst_c } => ("sst_c", sst_c),
            Measurement::Chl { chl_mg_m3 } => ("chl_mg_m3", chl_mg_m3),
            Measurement::Waves { swh_m, .. } => ("swh_m", swh_m),
        }
    }
}

/// Column names per source, matching [`Measurement::columns`].
pub fn measurement_columns(kind: SourceKind) -> &'static [&'static str] {
    match kind {
        SourceKind::Sst => &["sst_c"],
        SourceKind::Chl => &["chl_mg_m3"],
        SourceKind::Waves => &["swh_m", "peak_period_s"],
    }
}

/// One standardized grid cell observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub time: TimeKey,
    pub region_id: String,
    pub lat: f64,
    pub lon: f64,
    pub measurement: Measurement,
    /// Provenance label, e.g. `NOAA_OISST_v2_1_via_ERDDAP`
    pub source: String,
    pub ingested_at: DateTime<Utc>,
}

/// Identity of a row within one batch.
pub type RowKey = (TimeKey, String, u64, u64);

impl GridRow {
    /// Uniqueness key. Coordinates compare by bit pattern.
    pub fn key(&self) -> RowKey {
        (
            self.time,
            self.region_id.clone(),
            self.lat.to_bits(),
            self.lon.to_bits(),
        )
    }
}
