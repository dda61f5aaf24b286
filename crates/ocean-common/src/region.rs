//! Named regions and the read-only region catalog.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::bbox::BoundingBox;
use crate::error::{CommonError, CommonResult};

/// A named geographic region used to subset global grids.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    region_id: String,
    bbox: BoundingBox,
}

impl Region {
    /// Build a region, rejecting malformed bounding boxes.
    pub fn new(region_id: impl Into<String>, bbox: BoundingBox) -> CommonResult<Self> {
        let region_id = region_id.into();
        bbox.check()
            .map_err(|message| CommonError::InvalidBoundingBox {
                region_id: region_id.clone(),
                message,
            })?;
        Ok(Self { region_id, bbox })
    }

    pub fn id(&self) -> &str {
        &self.region_id
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
}

#[derive(Debug, Deserialize)]
struct RegionsFile {
    regions: BTreeMap<String, RegionEntry>,
}

#[derive(Debug, Deserialize)]
struct RegionEntry {
    boundbox: BoundingBox,
}

/// Immutable region_id -> Region mapping, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: BTreeMap<String, Region>,
}

impl RegionCatalog {
    pub fn from_regions(regions: impl IntoIterator<Item = Region>) -> Self {
        Self {
            regions: regions
                .into_iter()
                .map(|r| (r.region_id.clone(), r))
                .collect(),
        }
    }

    /// Parse the `regions:` YAML document.
    ///
    /// ```yaml
    /// regions:
    ///   NTT:
    ///     boundbox: { lat_min: -11.0, lat_max: -8.0, lon_min: 118.0, lon_max: 125.0 }
    /// ```
    pub fn from_yaml_str(content: &str) -> CommonResult<Self> {
        let file: RegionsFile = serde_yaml::from_str(content)?;
        let regions = file
            .regions
            .into_iter()
            .map(|(id, entry)| Region::new(id, entry.boundbox))
            .collect::<CommonResult<Vec<_>>>()?;
        Ok(Self::from_regions(regions))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> CommonResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Look up a region, listing known ids on failure.
    pub fn get(&self, region_id: &str) -> CommonResult<&Region> {
        self.regions
            .get(region_id)
            .ok_or_else(|| CommonError::UnknownRegion {
                requested: region_id.to_string(),
                known: self.regions.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGIONS_YAML: &str = r#"
regions:
  NTT:
    boundbox:
      lat_min: -11.0
      lat_max: -8.0
      lon_min: 118.0
      lon_max: 125.0
  GULF:
    boundbox: { lat_min: 18.0, lat_max: 31.0, lon_min: -98.0, lon_max: -80.0 }
"#;

    #[test]
    fn test_load_regions_yaml() {
        let catalog = RegionCatalog::from_yaml_str(REGIONS_YAML).unwrap();
        assert_eq!(catalog.len(), 2);
        let ntt = catalog.get("NTT").unwrap();
        assert_eq!(ntt.bbox().lat_min, -11.0);
        assert_eq!(ntt.bbox().lon_max, 125.0);
    }

    #[test]
    fn test_unknown_region_lists_known_ids() {
        let catalog = RegionCatalog::from_yaml_str(REGIONS_YAML).unwrap();
        let err = catalog.get("NOPE").unwrap_err();
        assert!(err.to_string().contains("GULF, NTT"));
    }

    #[test]
    fn test_inverted_bbox_rejected() {
        let yaml = "regions:\n  BAD:\n    boundbox: { lat_min: 5.0, lat_max: 1.0, lon_min: 0.0, lon_max: 1.0 }\n";
        assert!(matches!(
            RegionCatalog::from_yaml_str(yaml),
            Err(CommonError::InvalidBoundingBox { .. })
        ));
    }
}
