//! Common types shared across the ocean drivers ingestion workspace.

pub mod bbox;
pub mod error;
pub mod region;
pub mod row;
pub mod source;
pub mod time;

pub use bbox::{lon_intervals_360, BoundingBox, Lon360Interval, LonConvention};
pub use error::{CommonError, CommonResult};
pub use region::{Region, RegionCatalog};
pub use row::{measurement_columns, GridRow, Measurement, RowKey, TimeKey};
pub use source::{Granularity, SourceKind};
pub use time::Period;
