//! Generators for synthetic coordinate axes and grid values.
//!
//! Values are predictable so tests can recompute the expected cell value
//! from its coordinates.

use chrono::{Duration, NaiveDate, TimeZone, Utc};

/// Seconds since 1970-01-01 for midnight UTC of each of `days` consecutive dates.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use test_utils::daily_epoch_seconds;
///
/// let t = daily_epoch_seconds(NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(), 2);
/// assert_eq!(t, vec![978_307_200.0, 978_393_600.0]);
/// ```
pub fn daily_epoch_seconds(start: NaiveDate, days: usize) -> Vec<f64> {
    (0..days)
        .map(|d| epoch_seconds(start + Duration::days(d as i64), 0))
        .collect()
}

/// Seconds since epoch, one entry per hour starting at midnight of `start`.
pub fn hourly_epoch_seconds(start: NaiveDate, hours: usize) -> Vec<f64> {
    let base = epoch_seconds(start, 0);
    (0..hours).map(|h| base + h as f64 * 3600.0).collect()
}

/// Seconds since epoch for `date` at `hour`:00 UTC.
pub fn epoch_seconds(date: NaiveDate, hour: u32) -> f64 {
    let naive = date.and_hms_opt(hour, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&naive).timestamp() as f64
}

/// Evenly spaced axis `start, start + step, ...` with `n` points.
pub fn linear_axis(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Row-major values over (time, lat, lon) computed by `f(t_index, lat, lon)`.
pub fn fill_grid<F>(times: usize, lats: &[f64], lons: &[f64], f: F) -> Vec<f64>
where
    F: Fn(usize, f64, f64) -> f64,
{
    let mut data = Vec::with_capacity(times * lats.len() * lons.len());
    for t in 0..times {
        for &lat in lats {
            for &lon in lons {
                data.push(f(t, lat, lon));
            }
        }
    }
    data
}

/// A smooth SST-like field in degrees Celsius, warmer toward the equator.
pub fn sst_like(t: usize, lat: f64, _lon: f64) -> f64 {
    29.0 - lat.abs() * 0.2 + (t % 7) as f64 * 0.05
}
