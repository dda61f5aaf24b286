//! NetCDF reader for CF-style gridded ocean products.
//!
//! Reads NetCDF classic and NetCDF-4 files as served by ERDDAP griddap and
//! returns each requested data variable as a [`GridVariable`]: its coordinate
//! axes (time, latitude, longitude and any vertical dimensions) plus the
//! unpacked values in row-major order.
//!
//! # Conventions
//!
//! - `_FillValue` and `missing_value` cells become `NaN`.
//! - `scale_factor` and `add_offset` are applied to every other cell.
//! - Time axes keep their raw offsets; decode them with [`TimeUnits`].

pub mod error;
pub mod grid;
pub mod native;
pub mod time_units;

pub use error::{NetCdfError, NetCdfResult};
pub use grid::{Axis, AxisKind, GridVariable};
pub use native::{read_grid_bytes, read_grid_file, silence_hdf5_errors};
pub use time_units::TimeUnits;

/// Default lower bound on the size of a plausible NetCDF payload.
pub const DEFAULT_MIN_BYTES: usize = 1024;

/// On-disk container format, identified by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetCdfFormat {
    /// NetCDF classic / 64-bit offset (`CDF\x01`, `CDF\x02`, `CDF\x05`)
    Classic,
    /// NetCDF-4 (HDF5 container)
    Hdf5,
}

impl NetCdfFormat {
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"CDF") {
            Some(NetCdfFormat::Classic)
        } else if bytes.starts_with(b"\x89HDF") {
            Some(NetCdfFormat::Hdf5)
        } else {
            None
        }
    }
}

/// Cheap sanity check on a payload before it is trusted as a NetCDF file.
///
/// Servers under load sometimes answer with an HTML or text error page and a
/// 200 status; those bodies fail here.
pub fn validate_header(bytes: &[u8], min_bytes: usize) -> NetCdfResult<NetCdfFormat> {
    if bytes.len() < min_bytes {
        return Err(NetCdfError::InvalidFormat(format!(
            "payload too small: {} bytes (minimum {})",
            bytes.len(),
            min_bytes
        )));
    }
    NetCdfFormat::detect(bytes).ok_or_else(|| {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(16)]).into_owned();
        NetCdfError::InvalidFormat(format!("not a NetCDF header: {:?}", head))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(head: &[u8], len: usize) -> Vec<u8> {
        let mut bytes = head.to_vec();
        bytes.resize(len, 0);
        bytes
    }

    #[test]
    fn test_detect_formats() {
        assert_eq!(NetCdfFormat::detect(b"CDF\x01...."), Some(NetCdfFormat::Classic));
        assert_eq!(NetCdfFormat::detect(b"\x89HDF\r\n\x1a\n"), Some(NetCdfFormat::Hdf5));
        assert_eq!(NetCdfFormat::detect(b"<html>"), None);
    }

    #[test]
    fn test_validate_header_size() {
        let bytes = padded(b"CDF\x01", 100);
        assert!(validate_header(&bytes, DEFAULT_MIN_BYTES).is_err());
        assert!(validate_header(&bytes, 64).is_ok());
    }

    #[test]
    fn test_validate_header_rejects_html() {
        let bytes = padded(b"<!DOCTYPE html>", 2048);
        let err = validate_header(&bytes, DEFAULT_MIN_BYTES).unwrap_err();
        assert!(err.to_string().contains("not a NetCDF header"));
    }
}
