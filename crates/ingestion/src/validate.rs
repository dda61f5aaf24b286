//! Schema and quality gate between decoding and loading.
//!
//! [`validate`] is pure: it inspects a batch and reports, it never modifies
//! rows. Checks run in a fixed order so the reasons list is stable for the
//! same input. Reasons starting with `warning:` do not block the load.

use ocean_common::{measurement_columns, GridRow, Granularity, Region};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::config::ValidationConfig;
use crate::request::IngestionRequest;

/// Prefix of reasons that are reported but do not fail the batch.
pub const WARNING_PREFIX: &str = "warning:";

/// Outcome of validating one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub row_count: usize,
    /// Fraction of null values per measurement column
    pub null_rate_per_column: BTreeMap<String, f64>,
    pub out_of_bbox_count: usize,
    pub duplicate_count: usize,
    pub passed: bool,
    pub reasons: Vec<String>,
}

impl ValidationReport {
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.reasons
            .iter()
            .map(String::as_str)
            .filter(|r| r.starts_with(WARNING_PREFIX))
    }

    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.reasons
            .iter()
            .map(String::as_str)
            .filter(|r| !r.starts_with(WARNING_PREFIX))
    }
}

/// Validate `rows` decoded for `request` over `region`.
pub fn validate(
    rows: &[GridRow],
    region: &Region,
    request: &IngestionRequest,
    config: &ValidationConfig,
) -> ValidationReport {
    let mut report = ValidationReport {
        row_count: rows.len(),
        null_rate_per_column: BTreeMap::new(),
        out_of_bbox_count: 0,
        duplicate_count: 0,
        passed: false,
        reasons: Vec::new(),
    };

    if rows.is_empty() {
        report.reasons.push("empty batch: no rows decoded".to_string());
        return report;
    }

    let mut failures = Vec::new();
    let mut warnings = Vec::new();

    // Schema
    let composite = matches!(request.source.granularity(), Granularity::Composite { .. });
    let schema_mismatches = rows
        .iter()
        .filter(|r| {
            r.measurement.source_kind() != request.source
                || r.time.is_composite() != composite
                || r.source.is_empty()
        })
        .count();
    if schema_mismatches > 0 {
        failures.push(format!(
            "schema: {} rows do not match the {} row layout",
            schema_mismatches, request.source
        ));
    }

    // Required fields
    let wrong_region = rows.iter().filter(|r| r.region_id != request.region_id).count();
    if wrong_region > 0 {
        failures.push(format!(
            "required: {} rows have region_id other than {}",
            wrong_region, request.region_id
        ));
    }
    let bad_coords = rows
        .iter()
        .filter(|r| !r.lat.is_finite() || !r.lon.is_finite())
        .count();
    if bad_coords > 0 {
        failures.push(format!("required: {} rows have non-finite lat/lon", bad_coords));
    }
    let bad_windows = rows.iter().filter(|r| r.time.start() > r.time.end()).count();
    if bad_windows > 0 {
        failures.push(format!(
            "required: {} rows have period_start_date after period_end_date",
            bad_windows
        ));
    }

    // Bounding box
    let bbox = region.bbox();
    report.out_of_bbox_count = rows
        .iter()
        .filter(|r| r.lat.is_finite() && r.lon.is_finite() && !bbox.contains(r.lat, r.lon))
        .count();
    if report.out_of_bbox_count > 0 {
        failures.push(format!(
            "bbox: {} rows outside lat [{}, {}] lon [{}, {}]",
            report.out_of_bbox_count, bbox.lat_min, bbox.lat_max, bbox.lon_min, bbox.lon_max
        ));
    }

    // Period
    let out_of_period = rows.iter().filter(|r| !r.time.within(&request.period)).count();
    if out_of_period > 0 {
        failures.push(format!(
            "period: {} rows outside {}",
            out_of_period, request.period
        ));
    }

    // Duplicates
    let mut seen = HashSet::with_capacity(rows.len());
    report.duplicate_count = rows.iter().filter(|r| !seen.insert(r.key())).count();
    if report.duplicate_count > 0 {
        failures.push(format!(
            "duplicates: {} rows repeat a (time, region_id, lat, lon) key",
            report.duplicate_count
        ));
    }

    // Null rates
    for (i, column) in measurement_columns(request.source).iter().enumerate() {
        let nulls = rows
            .iter()
            .filter(|r| r.measurement.columns().get(i).map_or(true, |(_, v)| v.is_none()))
            .count();
        report
            .null_rate_per_column
            .insert(column.to_string(), nulls as f64 / rows.len() as f64);
    }
    let (primary, _) = rows[0].measurement.primary();
    let primary_nulls = rows.iter().filter(|r| r.measurement.primary().1.is_none()).count();
    let primary_rate = primary_nulls as f64 / rows.len() as f64;
    if primary_rate >= 1.0 {
        failures.push(format!("null_rate: every {} value is null", primary));
    } else if primary_rate > config.null_rate_warn_threshold {
        let message = format!(
            "null_rate: {} null rate {:.3} exceeds {:.3}",
            primary, primary_rate, config.null_rate_warn_threshold
        );
        if config.block_on_null_rate {
            failures.push(message);
        } else {
            warnings.push(format!("{} {}", WARNING_PREFIX, message));
        }
    }

    // Temporal coverage
    if matches!(request.source.granularity(), Granularity::Daily) {
        let dates: BTreeSet<_> = rows
            .iter()
            .map(|r| r.time.start())
            .filter(|d| request.period.contains(*d))
            .collect();
        let expected = request.period.num_days() as usize;
        if dates.len() < expected {
            warnings.push(format!(
                "{} partial coverage: {} of {} days present",
                WARNING_PREFIX,
                dates.len(),
                expected
            ));
        }
    }

    report.passed = failures.is_empty();
    report.reasons = failures;
    report.reasons.extend(warnings);
    report
}
