//! Inclusive date periods targeted by one ingestion run.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CommonError, CommonResult};

/// An inclusive `[start, end]` range of calendar dates (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> CommonResult<Self> {
        if start > end {
            return Err(CommonError::InvalidPeriod(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The full calendar month `year-month`.
    pub fn month(year: i32, month: u32) -> CommonResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            CommonError::InvalidPeriod(format!("invalid year/month {}-{:02}", year, month))
        })?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| CommonError::InvalidPeriod(format!("year {} out of range", year)))?;
        Ok(Self {
            start,
            end: next - Duration::days(1),
        })
    }

    /// Parse two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> CommonResult<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|e| CommonError::InvalidPeriod(format!("'{}': {}", s, e)))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// True when `[start, end]` shares at least one day with this period.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start <= self.end && end >= self.start
    }

    /// Number of days in the period, inclusive.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.num_days()).map(move |offset| start + Duration::days(offset))
    }

    /// The same period with `days` added to the end.
    pub fn pad_end(&self, days: i64) -> CommonResult<Self> {
        let end = Duration::try_days(days)
            .and_then(|pad| self.end.checked_add_signed(pad))
            .ok_or_else(|| {
                CommonError::InvalidPeriod(format!("padding {} by {} days is out of range", self, days))
            })?;
        Self::new(self.start, end)
    }

    /// Midnight UTC at the start date.
    pub fn start_instant(&self) -> DateTime<Utc> {
        midnight_utc(self.start)
    }

    /// Midnight UTC at the end date (inclusive day window).
    pub fn end_instant(&self) -> DateTime<Utc> {
        midnight_utc(self.end)
    }

    /// Midnight UTC of the day after the end date (end-exclusive window).
    pub fn end_exclusive_instant(&self) -> DateTime<Utc> {
        midnight_utc(self.end + Duration::days(1))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_range() {
        let jan = Period::month(2001, 1).unwrap();
        assert_eq!(jan.start, d(2001, 1, 1));
        assert_eq!(jan.end, d(2001, 1, 31));
        assert_eq!(jan.num_days(), 31);

        let dec = Period::month(2001, 12).unwrap();
        assert_eq!(dec.end, d(2001, 12, 31));

        let feb_leap = Period::month(2004, 2).unwrap();
        assert_eq!(feb_leap.end, d(2004, 2, 29));
    }

    #[test]
    fn test_invalid_month() {
        assert!(Period::month(2001, 13).is_err());
        assert!(Period::month(2001, 0).is_err());
    }

    #[test]
    fn test_overlap_rule() {
        let jan = Period::month(2001, 1).unwrap();
        // composite starting in December and ending in January overlaps
        assert!(jan.overlaps(d(2000, 12, 29), d(2001, 1, 5)));
        assert!(!jan.overlaps(d(2001, 2, 1), d(2001, 2, 8)));
    }

    #[test]
    fn test_parse_rejects_reversed() {
        assert!(Period::parse("2001-01-31", "2001-01-01").is_err());
        let p = Period::parse("2001-01-01", "2001-01-10").unwrap();
        assert_eq!(p.days().count(), 10);
        assert_eq!(p.to_string(), "2001-01-01..2001-01-10");
    }

    #[test]
    fn test_pad_end() {
        let feb = Period::month(2010, 2).unwrap();
        assert_eq!(feb.pad_end(7).unwrap().end, d(2010, 3, 7));
        assert!(feb.pad_end(-60).is_err());
        assert!(feb.pad_end(i64::MAX).is_err());
        assert!(feb.pad_end(1_000_000_000).is_err());
    }

    #[test]
    fn test_instants() {
        let p = Period::parse("2001-01-01", "2001-01-31").unwrap();
        assert_eq!(p.start_instant().to_rfc3339(), "2001-01-01T00:00:00+00:00");
        assert_eq!(
            p.end_exclusive_instant().to_rfc3339(),
            "2001-02-01T00:00:00+00:00"
        );
    }
}
