//! Turn staged griddap files into standardized rows.
//!
//! Every part of a request is decoded on its own and the rows are merged.
//! Per cell the decoder:
//!
//! 1. selects the vertical level (by value) or drops singleton dimensions
//! 2. masks fill values, using the source's fallback rule when the file
//!    declares none, and masks values outside the physical range
//! 3. converts longitudes to -180..180 and drops cells outside the region
//! 4. maps time steps to daily, daily-mean or composite keys and drops keys
//!    that miss the requested period
//!
//! Output is sorted by time key, latitude and longitude, so the same file
//! always produces the same rows.

use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use netcdf_parser::{AxisKind, GridVariable, TimeUnits};
use ocean_common::{GridRow, Measurement, Period, Region, SourceKind, TimeKey};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::config::{SourceSpec, TimeMapping};
use crate::error::DecodeError;

/// Vertical coordinate match tolerance.
const VERTICAL_TOLERANCE: f64 = 1e-6;

/// Axes and fixed indices shared by every variable of one part.
struct Layout {
    time_pos: usize,
    times: Vec<DateTime<Utc>>,
    lat_pos: usize,
    lats: Vec<f64>,
    lon_pos: usize,
    lons: Vec<f64>,
    /// (axis position, selected index) for every non-spatial, non-time axis
    fixed: Vec<(usize, usize)>,
}

/// Decode raw NetCDF parts into rows.
pub fn decode_payloads(
    spec: &SourceSpec,
    region: &Region,
    period: &Period,
    payloads: &[Bytes],
    ingested_at: DateTime<Utc>,
) -> Result<Vec<GridRow>, DecodeError> {
    let variables = spec.remote_variables();
    let mut parts = Vec::with_capacity(payloads.len());
    for payload in payloads {
        parts.push(netcdf_parser::read_grid_bytes(payload, &variables)?);
    }
    decode_grids(spec, region, period, &parts, ingested_at)
}

/// Decode already-read grids (one `Vec` per request part) into rows.
pub fn decode_grids(
    spec: &SourceSpec,
    region: &Region,
    period: &Period,
    parts: &[Vec<GridVariable>],
    ingested_at: DateTime<Utc>,
) -> Result<Vec<GridRow>, DecodeError> {
    let mut cells = Vec::new();
    for part in parts {
        decode_part(spec, region, period, part, &mut cells)?;
    }

    let mut rows: Vec<GridRow> = match spec.time_mapping {
        TimeMapping::DailyMean => daily_means(cells),
        TimeMapping::Daily | TimeMapping::Composite { .. } => cells,
    }
    .into_iter()
    .map(|cell| GridRow {
        time: cell.time,
        region_id: region.id().to_string(),
        lat: cell.lat,
        lon: cell.lon,
        measurement: measurement(spec.kind, &cell.values),
        source: spec.source_label.clone(),
        ingested_at,
    })
    .collect();

    rows.sort_by(|a, b| {
        a.time
            .cmp(&b.time)
            .then(a.lat.total_cmp(&b.lat))
            .then(a.lon.total_cmp(&b.lon))
    });

    log_row_stats(&rows);
    Ok(rows)
}

/// A single time step at one grid cell.
struct Cell {
    time: TimeKey,
    lat: f64,
    lon: f64,
    values: Vec<Option<f64>>,
}

fn decode_part(
    spec: &SourceSpec,
    region: &Region,
    period: &Period,
    variables: &[GridVariable],
    out: &mut Vec<Cell>,
) -> Result<(), DecodeError> {
    let Some(first) = variables.first() else {
        return Ok(());
    };
    for other in &variables[1..] {
        if other.axes.iter().map(|a| (&a.name, a.len())).ne(first.axes.iter().map(|a| (&a.name, a.len()))) {
            return Err(DecodeError::MismatchedGrids {
                first: first.name.clone(),
                second: other.name.clone(),
            });
        }
    }

    let layout = layout(spec, first)?;
    let strides = first.strides();
    let base: usize = layout.fixed.iter().map(|(pos, idx)| strides[*pos] * idx).sum();
    let bbox = region.bbox();

    for (ti, instant) in layout.times.iter().enumerate() {
        let time = time_key(spec.time_mapping, instant.date_naive())?;
        if !time.within(period) {
            continue;
        }

        for (yi, &lat) in layout.lats.iter().enumerate() {
            for (xi, &raw_lon) in layout.lons.iter().enumerate() {
                let lon = spec.lon_convention.to_pm180(raw_lon);
                if !bbox.contains(lat, lon) {
                    continue;
                }

                let offset = base
                    + strides[layout.time_pos] * ti
                    + strides[layout.lat_pos] * yi
                    + strides[layout.lon_pos] * xi;

                let values = variables
                    .iter()
                    .zip(&spec.variables)
                    .map(|(var, var_spec)| {
                        let value = var.values.get(offset).copied()?;
                        clean_value(spec, var, var_spec.valid_range, value)
                    })
                    .collect();

                out.push(Cell {
                    time,
                    lat,
                    lon,
                    values,
                });
            }
        }
    }

    Ok(())
}

fn layout(spec: &SourceSpec, var: &GridVariable) -> Result<Layout, DecodeError> {
    let missing = |axis: &'static str| DecodeError::MissingAxis {
        variable: var.name.clone(),
        axis,
    };
    let (time_pos, time_axis) = var.axis(AxisKind::Time).ok_or_else(|| missing("time"))?;
    let (lat_pos, lat_axis) = var.axis(AxisKind::Lat).ok_or_else(|| missing("latitude"))?;
    let (lon_pos, lon_axis) = var.axis(AxisKind::Lon).ok_or_else(|| missing("longitude"))?;

    let units = time_axis
        .units
        .as_deref()
        .ok_or_else(|| DecodeError::TimeAxis(format!("'{}' has no units attribute", time_axis.name)))?;
    let units = TimeUnits::parse(units).map_err(|e| DecodeError::TimeAxis(e.to_string()))?;
    let times = time_axis
        .values
        .iter()
        .map(|v| units.to_datetime(*v))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DecodeError::TimeAxis(e.to_string()))?;

    let mut fixed = Vec::new();
    for (pos, axis) in var.axes.iter().enumerate() {
        if pos == time_pos || pos == lat_pos || pos == lon_pos {
            continue;
        }
        let index = match &spec.vertical {
            Some(vertical) if vertical.name.eq_ignore_ascii_case(&axis.name) => axis
                .values
                .iter()
                .position(|v| (v - vertical.value).abs() <= VERTICAL_TOLERANCE),
            _ if axis.len() == 1 => Some(0),
            _ => None,
        };
        let index = index.ok_or_else(|| DecodeError::UnexpectedDimension {
            variable: var.name.clone(),
            dimension: axis.name.clone(),
            len: axis.len(),
        })?;
        fixed.push((pos, index));
    }

    Ok(Layout {
        time_pos,
        times,
        lat_pos,
        lats: lat_axis.values.clone(),
        lon_pos,
        lons: lon_axis.values.clone(),
        fixed,
    })
}

/// `None` for fill, non-finite and out-of-range values.
fn clean_value(
    spec: &SourceSpec,
    var: &GridVariable,
    valid_range: Option<(f64, f64)>,
    value: f64,
) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    if var.fill_value.is_none() && spec.fallback_fill.is_fill(value) {
        return None;
    }
    match valid_range {
        Some((min, max)) if value < min || value > max => None,
        _ => Some(value),
    }
}

fn time_key(mapping: TimeMapping, date: NaiveDate) -> Result<TimeKey, DecodeError> {
    match mapping {
        TimeMapping::Daily | TimeMapping::DailyMean => Ok(TimeKey::Daily(date)),
        TimeMapping::Composite {
            before_days,
            after_days,
        } => {
            let shift = |days: i64, forward: bool| {
                let delta = Duration::try_days(days)?;
                if forward {
                    date.checked_add_signed(delta)
                } else {
                    date.checked_sub_signed(delta)
                }
            };
            match (shift(before_days, false), shift(after_days, true)) {
                (Some(period_start_date), Some(period_end_date)) => Ok(TimeKey::Composite {
                    period_start_date,
                    period_end_date,
                }),
                _ => Err(DecodeError::TimeAxis(format!(
                    "composite window -{}/+{} days around {} is out of range",
                    before_days, after_days, date
                ))),
            }
        }
    }
}

/// Average every column over the time steps of each (date, lat, lon), ignoring nulls.
fn daily_means(cells: Vec<Cell>) -> Vec<Cell> {
    struct Acc {
        cell: Cell,
        sums: Vec<f64>,
        counts: Vec<usize>,
    }

    let mut groups: HashMap<(TimeKey, u64, u64), Acc> = HashMap::new();
    for cell in cells {
        let key = (cell.time, cell.lat.to_bits(), cell.lon.to_bits());
        let acc = groups.entry(key).or_insert_with(|| Acc {
            sums: vec![0.0; cell.values.len()],
            counts: vec![0; cell.values.len()],
            cell: Cell {
                time: cell.time,
                lat: cell.lat,
                lon: cell.lon,
                values: Vec::new(),
            },
        });
        for (i, value) in cell.values.iter().enumerate() {
            if let (Some(v), Some(sum), Some(count)) = (value, acc.sums.get_mut(i), acc.counts.get_mut(i)) {
                *sum += v;
                *count += 1;
            }
        }
    }

    groups
        .into_values()
        .map(|mut acc| {
            acc.cell.values = acc
                .sums
                .iter()
                .zip(&acc.counts)
                .map(|(sum, count)| (*count > 0).then(|| sum / *count as f64))
                .collect();
            acc.cell
        })
        .collect()
}

fn measurement(kind: SourceKind, values: &[Option<f64>]) -> Measurement {
    let at = |i: usize| values.get(i).copied().flatten();
    match kind {
        SourceKind::Sst => Measurement::Sst { sst_c: at(0) },
        SourceKind::Chl => Measurement::Chl { chl_mg_m3: at(0) },
        SourceKind::Waves => Measurement::Waves {
            swh_m: at(0),
            peak_period_s: at(1),
        },
    }
}

fn log_row_stats(rows: &[GridRow]) {
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        debug!(rows = 0, "Decoded rows");
        return;
    };
    let lats: BTreeSet<u64> = rows.iter().map(|r| r.lat.to_bits()).collect();
    let lons: BTreeSet<u64> = rows.iter().map(|r| r.lon.to_bits()).collect();
    debug!(
        rows = rows.len(),
        min_date = %first.time.start(),
        max_date = %last.time.end(),
        unique_lat = lats.len(),
        unique_lon = lons.len(),
        "Decoded rows"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcdf_parser::Axis;
    use ocean_common::BoundingBox;

    const EPOCH: &str = "seconds since 1970-01-01T00:00:00Z";
    // 2001-01-01T00:00:00Z
    const JAN_1_2001: f64 = 978_307_200.0;
    const DAY: f64 = 86_400.0;

    fn ntt() -> Region {
        Region::new("NTT", BoundingBox::new(-11.0, -8.0, 118.0, 125.0)).unwrap()
    }

    fn time_axis(values: Vec<f64>) -> Axis {
        Axis::new("time", values).with_units(EPOCH)
    }

    fn sst_grid(days: usize, lats: &[f64], lons: &[f64], value: impl Fn(usize, usize, usize) -> f64) -> GridVariable {
        let times: Vec<f64> = (0..days).map(|d| JAN_1_2001 + d as f64 * DAY).collect();
        let mut values = Vec::new();
        for t in 0..days {
            for y in 0..lats.len() {
                for x in 0..lons.len() {
                    values.push(value(t, y, x));
                }
            }
        }
        GridVariable::new(
            "sst",
            vec![
                time_axis(times),
                Axis::new("zlev", vec![0.0]),
                Axis::new("latitude", lats.to_vec()),
                Axis::new("longitude", lons.to_vec()),
            ],
            values,
        )
        .unwrap()
    }

    fn ingested_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_daily_rows_per_cell() {
        let spec = SourceSpec::builtin(SourceKind::Sst);
        let var = sst_grid(31, &[-10.875, -9.125], &[118.125, 124.875], |t, _, _| 20.0 + t as f64);

        let rows = decode_grids(&spec, &ntt(), &Period::month(2001, 1).unwrap(), &[vec![var]], ingested_at()).unwrap();

        assert_eq!(rows.len(), 31 * 4);
        assert_eq!(rows[0].time, TimeKey::Daily(NaiveDate::from_ymd_opt(2001, 1, 1).unwrap()));
        assert_eq!(rows[0].lat, -10.875);
        assert_eq!(rows[0].source, "NOAA_OISST_v2_1_via_ERDDAP");
        assert_eq!(rows[0].region_id, "NTT");
        assert_eq!(rows.last().unwrap().measurement, Measurement::Sst { sst_c: Some(50.0) });
    }

    #[test]
    fn test_fallback_fill_and_declared_fill() {
        let spec = SourceSpec::builtin(SourceKind::Sst);
        let var = sst_grid(1, &[-10.0], &[120.0, 121.0], |_, _, x| if x == 0 { -9.99 } else { 27.5 });
        let period = Period::month(2001, 1).unwrap();

        let rows = decode_grids(&spec, &ntt(), &period, &[vec![var.clone()]], ingested_at()).unwrap();
        assert_eq!(rows[0].measurement, Measurement::Sst { sst_c: None });
        assert_eq!(rows[1].measurement, Measurement::Sst { sst_c: Some(27.5) });

        // A declared fill attribute disables the fallback threshold.
        let declared = var.with_fill_value(Some(-999.0));
        let rows = decode_grids(&spec, &ntt(), &period, &[vec![declared]], ingested_at()).unwrap();
        assert_eq!(rows[0].measurement, Measurement::Sst { sst_c: Some(-9.99) });
    }

    #[test]
    fn test_cells_outside_region_and_period_dropped() {
        let spec = SourceSpec::builtin(SourceKind::Sst);
        // 40 days starting Jan 1, one column outside the box.
        let var = sst_grid(40, &[-10.0], &[120.0, 130.0], |_, _, _| 28.0);
        let rows = decode_grids(&spec, &ntt(), &Period::month(2001, 1).unwrap(), &[vec![var]], ingested_at()).unwrap();

        assert_eq!(rows.len(), 31);
        assert!(rows.iter().all(|r| r.lon == 120.0));
    }

    #[test]
    fn test_vertical_selected_by_value() {
        let spec = SourceSpec::builtin(SourceKind::Sst);
        let var = GridVariable::new(
            "sst",
            vec![
                time_axis(vec![JAN_1_2001]),
                Axis::new("zlev", vec![0.0, 10.0]),
                Axis::new("latitude", vec![-10.0]),
                Axis::new("longitude", vec![120.0]),
            ],
            vec![28.0, 20.0],
        )
        .unwrap();

        let rows = decode_grids(&spec, &ntt(), &Period::month(2001, 1).unwrap(), &[vec![var]], ingested_at()).unwrap();
        assert_eq!(rows[0].measurement, Measurement::Sst { sst_c: Some(28.0) });
    }

    #[test]
    fn test_unexpected_dimension() {
        let spec = SourceSpec::builtin(SourceKind::Sst);
        let var = GridVariable::new(
            "sst",
            vec![
                time_axis(vec![JAN_1_2001]),
                Axis::new("ensemble", vec![0.0, 1.0]),
                Axis::new("latitude", vec![-10.0]),
                Axis::new("longitude", vec![120.0]),
            ],
            vec![28.0, 20.0],
        )
        .unwrap();

        let err = decode_grids(&spec, &ntt(), &Period::month(2001, 1).unwrap(), &[vec![var]], ingested_at()).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedDimension { .. }));
    }

    #[test]
    fn test_missing_time_units() {
        let spec = SourceSpec::builtin(SourceKind::Sst);
        let var = GridVariable::new(
            "sst",
            vec![
                Axis::new("time", vec![0.0]),
                Axis::new("latitude", vec![-10.0]),
                Axis::new("longitude", vec![120.0]),
            ],
            vec![28.0],
        )
        .unwrap();

        let err = decode_grids(&spec, &ntt(), &Period::month(2001, 1).unwrap(), &[vec![var]], ingested_at()).unwrap_err();
        assert!(matches!(err, DecodeError::TimeAxis(_)));
    }

    #[test]
    fn test_out_of_range_time_value() {
        let spec = SourceSpec::builtin(SourceKind::Sst);
        let var = GridVariable::new(
            "sst",
            vec![
                time_axis(vec![1e16]),
                Axis::new("latitude", vec![-10.0]),
                Axis::new("longitude", vec![120.0]),
            ],
            vec![28.0],
        )
        .unwrap();

        let err = decode_grids(&spec, &ntt(), &Period::month(2001, 1).unwrap(), &[vec![var]], ingested_at()).unwrap_err();
        assert!(matches!(err, DecodeError::TimeAxis(_)));
    }

    #[test]
    fn test_oversized_composite_window() {
        let mut spec = SourceSpec::builtin(SourceKind::Chl);
        spec.time_mapping = TimeMapping::Composite {
            before_days: i64::MAX,
            after_days: 4,
        };
        let region = Region::new("GULF_OF_GUINEA", BoundingBox::new(-2.0, 2.0, -4.0, 4.0)).unwrap();
        let var = GridVariable::new(
            "chlorophyll",
            vec![
                time_axis(vec![JAN_1_2001]),
                Axis::new("altitude", vec![0.0]),
                Axis::new("latitude", vec![0.0]),
                Axis::new("longitude", vec![1.0]),
            ],
            vec![0.2],
        )
        .unwrap();

        let err = decode_grids(&spec, &region, &Period::month(2001, 1).unwrap(), &[vec![var]], ingested_at()).unwrap_err();
        assert!(matches!(err, DecodeError::TimeAxis(_)));
    }

    #[test]
    fn test_composite_windows_overlap_period() {
        let spec = SourceSpec::builtin(SourceKind::Chl);
        let region = Region::new("GULF_OF_GUINEA", BoundingBox::new(-2.0, 2.0, -4.0, 4.0)).unwrap();
        // Composite centers: Dec 29 2000 (window Dec 26..Jan 2) overlaps,
        // Dec 20 (Dec 17..Dec 24) does not, Feb 3 (Jan 31..Feb 7) overlaps.
        let centers = [
            JAN_1_2001 - 12.0 * DAY,
            JAN_1_2001 - 3.0 * DAY,
            JAN_1_2001 + 33.0 * DAY,
        ];
        let var = GridVariable::new(
            "chlorophyll",
            vec![
                time_axis(centers.to_vec()),
                Axis::new("altitude", vec![0.0]),
                Axis::new("latitude", vec![0.0]),
                Axis::new("longitude", vec![1.0]),
            ],
            vec![0.2, 0.3, 0.4],
        )
        .unwrap();

        let rows = decode_grids(&spec, &region, &Period::month(2001, 1).unwrap(), &[vec![var]], ingested_at()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].time,
            TimeKey::Composite {
                period_start_date: NaiveDate::from_ymd_opt(2000, 12, 26).unwrap(),
                period_end_date: NaiveDate::from_ymd_opt(2001, 1, 2).unwrap(),
            }
        );
        assert_eq!(rows[1].time.end(), NaiveDate::from_ymd_opt(2001, 2, 7).unwrap());
    }

    fn waves_part(lons: &[f64], heights: Vec<f64>, periods: Vec<f64>) -> Vec<GridVariable> {
        let axes = vec![
            time_axis(vec![JAN_1_2001, JAN_1_2001 + 3.0 * 3600.0, JAN_1_2001 + 6.0 * 3600.0]),
            Axis::new("depth", vec![0.0]),
            Axis::new("latitude", vec![0.0]),
            Axis::new("longitude", lons.to_vec()),
        ];
        vec![
            GridVariable::new("Thgt", axes.clone(), heights).unwrap(),
            GridVariable::new("Tper", axes, periods).unwrap(),
        ]
    }

    #[test]
    fn test_waves_daily_mean_across_split() {
        let spec = SourceSpec::builtin(SourceKind::Waves);
        let region = Region::new("GULF_OF_GUINEA", BoundingBox::new(-2.0, 2.0, -4.0, 4.0)).unwrap();
        let period = Period::new(
            NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(),
        )
        .unwrap();

        // West part in 0..360 (356.0), east part (2.0). Fill and out-of-range
        // values are skipped by the mean.
        let west = waves_part(&[356.0], vec![1.0, 2.0, 9.96921e36], vec![8.0, 10.0, 70.0]);
        let east = waves_part(&[2.0], vec![1.5, -1.0, 2.5], vec![9.0, 9.0, 9.0]);

        let rows = decode_grids(&spec, &region, &period, &[west, east], ingested_at()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].lon, -4.0);
        assert_eq!(
            rows[0].measurement,
            Measurement::Waves {
                swh_m: Some(1.5),
                peak_period_s: Some(9.0)
            }
        );
        assert_eq!(rows[1].lon, 2.0);
        assert_eq!(
            rows[1].measurement,
            Measurement::Waves {
                swh_m: Some(2.0),
                peak_period_s: Some(9.0)
            }
        );
    }

    #[test]
    fn test_mismatched_grids() {
        let spec = SourceSpec::builtin(SourceKind::Waves);
        let region = Region::new("GULF_OF_GUINEA", BoundingBox::new(-2.0, 2.0, -4.0, 4.0)).unwrap();
        let mut part = waves_part(&[2.0], vec![1.0; 3], vec![9.0; 3]);
        part[1] = GridVariable::new(
            "Tper",
            vec![time_axis(vec![JAN_1_2001]), Axis::new("latitude", vec![0.0]), Axis::new("longitude", vec![2.0])],
            vec![9.0],
        )
        .unwrap();

        let err = decode_grids(&spec, &region, &Period::month(2001, 1).unwrap(), &[part], ingested_at()).unwrap_err();
        assert!(matches!(err, DecodeError::MismatchedGrids { .. }));
    }
}
