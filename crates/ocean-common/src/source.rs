//! Remote data source identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CommonError;

/// The gridded products this workspace knows how to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// NOAA OISST v2.1 daily sea-surface temperature
    Sst,
    /// Chlorophyll-a 8-day composites
    Chl,
    /// WaveWatch III significant height and peak period
    Waves,
}

/// How a source's time axis maps onto warehouse rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// One row per calendar day
    Daily,
    /// One row per N-day composite window
    Composite { days: u32 },
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Sst, SourceKind::Chl, SourceKind::Waves];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Sst => "sst",
            SourceKind::Chl => "chl",
            SourceKind::Waves => "waves",
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            SourceKind::Sst | SourceKind::Waves => Granularity::Daily,
            SourceKind::Chl => Granularity::Composite { days: 8 },
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sst" => Ok(SourceKind::Sst),
            "chl" | "chlorophyll" => Ok(SourceKind::Chl),
            "waves" | "wave" => Ok(SourceKind::Waves),
            other => Err(CommonError::UnknownSource(other.to_string())),
        }
    }
}
