//! Common test fixtures for ingestion tests.
//!
//! Pre-defined regions and dataset constants shared by the crates' test
//! suites.

use ocean_common::{BoundingBox, Region, RegionCatalog};

/// Region definitions used across the test suite.
pub mod regions {
    /// Nusa Tenggara Timur coastal waters, the reference scenario region
    pub const NTT: (&str, f64, f64, f64, f64) = ("NTT", -11.0, -8.0, 118.0, 125.0);

    /// Straddles the prime meridian, so 0..360 sources need two queries
    pub const GULF_OF_GUINEA: (&str, f64, f64, f64, f64) = ("GULF_OF_GUINEA", -2.0, 2.0, -4.0, 4.0);

    /// Gulf of Mexico, entirely in the western hemisphere
    pub const GULF_OF_MEXICO: (&str, f64, f64, f64, f64) = ("GULF_OF_MEXICO", 18.0, 31.0, -98.0, -80.0);

    /// Region catalog YAML in the on-disk layout.
    pub const REGIONS_YAML: &str = r#"
regions:
  NTT:
    boundbox: { lat_min: -11.0, lat_max: -8.0, lon_min: 118.0, lon_max: 125.0 }
  GULF_OF_GUINEA:
    boundbox: { lat_min: -2.0, lat_max: 2.0, lon_min: -4.0, lon_max: 4.0 }
  GULF_OF_MEXICO:
    boundbox: { lat_min: 18.0, lat_max: 31.0, lon_min: -98.0, lon_max: -80.0 }
"#;
}

/// ERDDAP dataset identifiers and variable names.
pub mod datasets {
    pub const SST_DATASET: &str = "ncdcOisst21Agg";
    pub const SST_VARIABLE: &str = "sst";

    pub const CHL_DATASET: &str = "erdMBchla8day_LonPM180";
    pub const CHL_VARIABLE: &str = "chlorophyll";

    pub const WAVES_DATASET: &str = "NWW3_Global_Best";
    pub const WAVES_HEIGHT: &str = "Thgt";
    pub const WAVES_PERIOD: &str = "Tper";
}

fn region_from(def: (&str, f64, f64, f64, f64)) -> Region {
    let (id, lat_min, lat_max, lon_min, lon_max) = def;
    Region::new(id, BoundingBox::new(lat_min, lat_max, lon_min, lon_max))
        .expect("fixture region is valid")
}

/// The NTT reference region.
pub fn ntt_region() -> Region {
    region_from(regions::NTT)
}

/// A region straddling the prime meridian.
pub fn guinea_region() -> Region {
    region_from(regions::GULF_OF_GUINEA)
}

/// Catalog holding every fixture region.
pub fn test_catalog() -> RegionCatalog {
    RegionCatalog::from_regions([
        region_from(regions::NTT),
        region_from(regions::GULF_OF_GUINEA),
        region_from(regions::GULF_OF_MEXICO),
    ])
}
