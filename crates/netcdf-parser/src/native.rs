//! Native NetCDF reading using the netcdf library.
//!
//! The netcdf library requires a file path (it wraps libnetcdf/HDF5 which need
//! file handles). When reading from bytes, we write to a temp file first.
//!
//! On Linux, we use `/dev/shm` (memory-backed tmpfs) to minimize I/O latency.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tracing::debug;

use crate::error::{NetCdfError, NetCdfResult};
use crate::grid::{Axis, GridVariable};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints diagnostics even when the Rust side handles the
/// error (for example when probing optional attributes). Call this once early
/// in `main()`; repeated calls are no-ops.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Read the named data variables, with their coordinate axes, from a file.
///
/// Variables are returned in the order requested. Each variable's values
/// have `_FillValue`/`missing_value` replaced by `NaN` and
/// `scale_factor`/`add_offset` applied.
pub fn read_grid_file<P: AsRef<Path>>(path: P, variables: &[&str]) -> NetCdfResult<Vec<GridVariable>> {
    silence_hdf5_errors();

    let path = path.as_ref();
    let file = netcdf::open(path)
        .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to open NetCDF: {}", e)))?;

    let mut out = Vec::with_capacity(variables.len());
    for name in variables {
        let var = file
            .variable(name)
            .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", name)))?;
        out.push(read_variable(&file, &var)?);
    }

    debug!(path = %path.display(), variables = variables.len(), "Read NetCDF grid variables");
    Ok(out)
}

/// Same as [`read_grid_file`] but for an in-memory payload.
///
/// The payload is written to a named temp file that is removed on every
/// return path, including a failed write.
pub fn read_grid_bytes(data: &[u8], variables: &[&str]) -> NetCdfResult<Vec<GridVariable>> {
    let mut temp_file = tempfile::Builder::new()
        .prefix("grid_native_")
        .suffix(".nc")
        .tempfile_in(get_optimal_temp_dir())?;
    temp_file.write_all(data)?;
    temp_file.flush()?;

    read_grid_file(temp_file.path(), variables)
}

fn read_variable(file: &netcdf::File, var: &netcdf::Variable) -> NetCdfResult<GridVariable> {
    let name = var.name();

    let mut axes = Vec::new();
    for dim in var.dimensions() {
        axes.push(read_axis(file, &dim.name(), dim.len())?);
    }

    let raw: Vec<f64> = var
        .get_values(..)
        .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to read {}: {}", name, e)))?;

    let fill_value = get_f64_attr(var, "_FillValue").or_else(|| get_f64_attr(var, "missing_value"));
    let scale_factor = get_f64_attr(var, "scale_factor").unwrap_or(1.0);
    let add_offset = get_f64_attr(var, "add_offset").unwrap_or(0.0);

    let values = raw
        .into_iter()
        .map(|v| unpack(v, fill_value, scale_factor, add_offset))
        .collect();

    Ok(GridVariable::new(name, axes, values)?.with_fill_value(fill_value))
}

/// Read a dimension's coordinate variable, or fall back to index positions
/// for dimensions without one.
fn read_axis(file: &netcdf::File, dim_name: &str, len: usize) -> NetCdfResult<Axis> {
    let Some(coord) = file.variable(dim_name) else {
        return Ok(Axis::new(dim_name, (0..len).map(|i| i as f64).collect()));
    };

    let values: Vec<f64> = coord
        .get_values(..)
        .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to read {} axis: {}", dim_name, e)))?;

    let axis = Axis::new(dim_name, values);
    Ok(match get_str_attr(&coord, "units") {
        Some(units) => axis.with_units(units),
        None => axis,
    })
}

/// Map one raw stored value to its physical value.
pub(crate) fn unpack(raw: f64, fill_value: Option<f64>, scale: f64, offset: f64) -> f64 {
    if raw.is_nan() || fill_value.is_some_and(|f| raw == f) {
        f64::NAN
    } else {
        raw * scale + offset
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Get the optimal temp directory for NetCDF file operations.
///
/// On Linux, uses /dev/shm (memory-backed tmpfs) if available for faster I/O.
/// Falls back to the system temp directory on other platforms or if /dev/shm is unavailable.
fn get_optimal_temp_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let shm_path = Path::new("/dev/shm");
        if shm_path.exists() && shm_path.is_dir() {
            let test_path = shm_path.join(format!(".netcdf_test_{}", std::process::id()));
            if std::fs::write(&test_path, b"test").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return shm_path.to_path_buf();
            }
        }
    }

    std::env::temp_dir()
}

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

fn get_str_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
