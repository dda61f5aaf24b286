//! CF time axis decoding (`<unit> since <epoch>`).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{NetCdfError, NetCdfResult};

/// A parsed CF `units` attribute for a time coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    /// Length of one unit in seconds
    pub seconds_per_unit: f64,
    pub epoch: DateTime<Utc>,
}

impl TimeUnits {
    /// Parse strings like `"seconds since 1970-01-01T00:00:00Z"` or
    /// `"days since 1800-1-1 00:00:00"`.
    pub fn parse(units: &str) -> NetCdfResult<Self> {
        let invalid = || NetCdfError::InvalidTimeUnits(units.to_string());

        let lower = units.trim().to_lowercase();
        let (unit, epoch) = lower.split_once(" since ").ok_or_else(invalid)?;

        let seconds_per_unit = match unit.trim() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
            "days" | "day" | "d" => 86400.0,
            _ => return Err(invalid()),
        };

        let epoch = parse_epoch(epoch.trim()).ok_or_else(invalid)?;
        Ok(Self {
            seconds_per_unit,
            epoch,
        })
    }

    /// Convert an axis offset to an instant, rounded to the millisecond.
    pub fn to_datetime(&self, offset: f64) -> NetCdfResult<DateTime<Utc>> {
        if !offset.is_finite() {
            return Err(NetCdfError::InvalidFormat(format!(
                "non-finite time value {}",
                offset
            )));
        }
        let out_of_range =
            || NetCdfError::InvalidFormat(format!("time value {} out of range", offset));
        // Float to int casts saturate, so huge offsets land on i64::MAX/MIN.
        let millis = (offset * self.seconds_per_unit * 1000.0).round() as i64;
        let delta = Duration::try_milliseconds(millis).ok_or_else(out_of_range)?;
        self.epoch.checked_add_signed(delta).ok_or_else(out_of_range)
    }
}

fn parse_epoch(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim_end_matches('z').trim_end_matches(" utc").trim();
    let normalized = s.replace('t', " ");

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    let date = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_erddap_seconds() {
        let units = TimeUnits::parse("seconds since 1970-01-01T00:00:00Z").unwrap();
        assert_eq!(units.seconds_per_unit, 1.0);
        let t = units.to_datetime(978_307_200.0).unwrap();
        assert_eq!(t.date_naive(), NaiveDate::from_ymd_opt(2001, 1, 1).unwrap());
    }

    #[test]
    fn test_parse_days_short_epoch() {
        let units = TimeUnits::parse("days since 1800-1-1 00:00:00").unwrap();
        assert_eq!(units.seconds_per_unit, 86400.0);
        assert_eq!(
            units.epoch.date_naive(),
            NaiveDate::from_ymd_opt(1800, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_parse_hours() {
        let units = TimeUnits::parse("hours since 2001-01-01").unwrap();
        let t = units.to_datetime(36.0).unwrap();
        assert_eq!(t.to_rfc3339(), "2001-01-02T12:00:00+00:00");
    }

    #[test]
    fn test_out_of_range_offset_is_an_error() {
        let units = TimeUnits::parse("seconds since 1970-01-01T00:00:00Z").unwrap();
        assert!(matches!(units.to_datetime(1e16), Err(NetCdfError::InvalidFormat(_))));
        assert!(matches!(units.to_datetime(-1e16), Err(NetCdfError::InvalidFormat(_))));
        assert!(matches!(units.to_datetime(f64::MAX), Err(NetCdfError::InvalidFormat(_))));
        assert!(matches!(units.to_datetime(f64::NAN), Err(NetCdfError::InvalidFormat(_))));
    }

    #[test]
    fn test_rejects_unknown_units() {
        assert!(TimeUnits::parse("fortnights since 2001-01-01").is_err());
        assert!(TimeUnits::parse("seconds").is_err());
        assert!(TimeUnits::parse("days since yesterday").is_err());
    }
}
