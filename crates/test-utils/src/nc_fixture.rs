//! Writes small NetCDF files shaped like ERDDAP griddap responses.
//!
//! ```ignore
//! let grid = FixtureGrid::new()
//!     .axis("time", daily_epoch_seconds(start, 31), Some(EPOCH_SECONDS))
//!     .axis("zlev", vec![0.0], Some("m"))
//!     .axis("latitude", lats.clone(), Some("degrees_north"))
//!     .axis("longitude", lons.clone(), Some("degrees_east"))
//!     .variable("sst", &["time", "zlev", "latitude", "longitude"], values);
//! let bytes = grid.to_bytes()?;
//! ```

use std::path::Path;

/// ERDDAP's time axis units.
pub const EPOCH_SECONDS: &str = "seconds since 1970-01-01T00:00:00Z";

#[derive(Debug, Clone)]
struct FixtureAxis {
    name: String,
    values: Vec<f64>,
    units: Option<String>,
}

#[derive(Debug, Clone)]
struct FixtureVariable {
    name: String,
    dims: Vec<String>,
    values: Vec<f64>,
    fill_value: Option<f64>,
    scale_factor: Option<f64>,
    add_offset: Option<f64>,
}

/// Builder for a fixture file: coordinate axes plus data variables.
#[derive(Debug, Clone, Default)]
pub struct FixtureGrid {
    axes: Vec<FixtureAxis>,
    variables: Vec<FixtureVariable>,
}

impl FixtureGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dimension and its coordinate variable.
    pub fn axis(mut self, name: &str, values: Vec<f64>, units: Option<&str>) -> Self {
        self.axes.push(FixtureAxis {
            name: name.to_string(),
            values,
            units: units.map(str::to_string),
        });
        self
    }

    /// Add a data variable laid out row-major over `dims`.
    pub fn variable(mut self, name: &str, dims: &[&str], values: Vec<f64>) -> Self {
        self.variables.push(FixtureVariable {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            values,
            fill_value: None,
            scale_factor: None,
            add_offset: None,
        });
        self
    }

    /// Declare `_FillValue` on the most recently added variable.
    pub fn fill_value(mut self, fill: f64) -> Self {
        if let Some(var) = self.variables.last_mut() {
            var.fill_value = Some(fill);
        }
        self
    }

    /// Declare packing attributes on the most recently added variable.
    pub fn packed(mut self, scale_factor: f64, add_offset: f64) -> Self {
        if let Some(var) = self.variables.last_mut() {
            var.scale_factor = Some(scale_factor);
            var.add_offset = Some(add_offset);
        }
        self
    }

    /// Write the grid to `path`.
    pub fn write(&self, path: &Path) -> Result<(), netcdf::Error> {
        let mut file = netcdf::create(path)?;

        for axis in &self.axes {
            file.add_dimension(&axis.name, axis.values.len())?;
        }

        for axis in &self.axes {
            let mut var = file.add_variable::<f64>(&axis.name, &[axis.name.as_str()])?;
            if let Some(units) = &axis.units {
                var.put_attribute("units", units.as_str())?;
            }
            var.put_values(&axis.values, ..)?;
        }

        for spec in &self.variables {
            let dims: Vec<&str> = spec.dims.iter().map(String::as_str).collect();
            let mut var = file.add_variable::<f64>(&spec.name, &dims)?;
            if let Some(fill) = spec.fill_value {
                var.put_attribute("_FillValue", fill)?;
            }
            if let Some(scale) = spec.scale_factor {
                var.put_attribute("scale_factor", scale)?;
            }
            if let Some(offset) = spec.add_offset {
                var.put_attribute("add_offset", offset)?;
            }
            var.put_values(&spec.values, ..)?;
        }

        Ok(())
    }

    /// Write the grid to a temp file and return the file's bytes.
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fixture.nc");
        self.write(&path)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        std::fs::read(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_has_netcdf_header() {
        let bytes = FixtureGrid::new()
            .axis("latitude", vec![-10.0, -9.0], Some("degrees_north"))
            .axis("longitude", vec![120.0], Some("degrees_east"))
            .variable("sst", &["latitude", "longitude"], vec![28.0, 28.5])
            .to_bytes()
            .unwrap();

        assert!(bytes.starts_with(b"CDF") || bytes.starts_with(b"\x89HDF"));
    }
}
