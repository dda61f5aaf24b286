//! Geographic bounding boxes and longitude convention helpers.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees.
///
/// Latitudes are -90..90, longitudes are -180..180 (degrees_east).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    /// Inclusive containment check on both axes.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon <= self.lon_max
    }

    /// Check that the box is well formed (finite, min < max, inside the globe).
    pub fn check(&self) -> Result<(), String> {
        let values = [self.lat_min, self.lat_max, self.lon_min, self.lon_max];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("coordinates must be finite".to_string());
        }
        if self.lat_min >= self.lat_max {
            return Err(format!(
                "lat_min ({}) must be < lat_max ({})",
                self.lat_min, self.lat_max
            ));
        }
        if self.lon_min >= self.lon_max {
            return Err(format!(
                "lon_min ({}) must be < lon_max ({})",
                self.lon_min, self.lon_max
            ));
        }
        if self.lat_min < -90.0 || self.lat_max > 90.0 {
            return Err("latitudes must be within -90..90".to_string());
        }
        if self.lon_min < -180.0 || self.lon_max > 180.0 {
            return Err("longitudes must be within -180..180".to_string());
        }
        Ok(())
    }
}

/// Longitude convention used by a remote dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LonConvention {
    /// -180..180 degrees_east
    Pm180,
    /// 0..360 degrees_east
    Zero360,
}

impl LonConvention {
    /// Convert a dataset longitude into -180..180.
    pub fn to_pm180(&self, lon: f64) -> f64 {
        match self {
            LonConvention::Pm180 => lon,
            LonConvention::Zero360 => lon_to_180(lon),
        }
    }
}

/// Map a -180..180 longitude into 0..360.
pub fn lon_to_360(lon: f64) -> f64 {
    (lon + 360.0).rem_euclid(360.0)
}

/// Map a 0..360 longitude into -180..180 (180 stays 180).
pub fn lon_to_180(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

/// A longitude interval in 0..360 space. `upper == None` means "to the last
/// grid column" of the dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lon360Interval {
    pub lower: f64,
    pub upper: Option<f64>,
}

/// Split a -180..180 longitude range into one or two 0..360 intervals.
///
/// A range that straddles the prime meridian (e.g. -10..10) wraps in 0..360
/// space and must be requested as `[350, last]` and `[0, 10]`. A full-circle
/// range such as -180..180 maps both ends onto 180 and is requested whole.
pub fn lon_intervals_360(lon_min: f64, lon_max: f64) -> Vec<Lon360Interval> {
    let lo = lon_to_360(lon_min);
    let hi = lon_to_360(lon_max);
    if lon_max - lon_min >= 360.0 || (lo == hi && lon_min != lon_max) {
        vec![Lon360Interval {
            lower: 0.0,
            upper: None,
        }]
    } else if lo <= hi {
        vec![Lon360Interval {
            lower: lo,
            upper: Some(hi),
        }]
    } else {
        vec![
            Lon360Interval {
                lower: lo,
                upper: None,
            },
            Lon360Interval {
                lower: 0.0,
                upper: Some(hi),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_inclusive() {
        let bbox = BoundingBox::new(-11.0, -8.0, 118.0, 125.0);
        assert!(bbox.contains(-11.0, 118.0));
        assert!(bbox.contains(-8.0, 125.0));
        assert!(!bbox.contains(-7.99, 120.0));
    }

    #[test]
    fn test_lon_conversions() {
        assert_eq!(lon_to_360(-10.0), 350.0);
        assert_eq!(lon_to_360(120.0), 120.0);
        assert_eq!(lon_to_180(350.0), -10.0);
        assert_eq!(lon_to_180(180.0), 180.0);
    }

    #[test]
    fn test_intervals_split_across_prime_meridian() {
        let intervals = lon_intervals_360(-10.0, 10.0);
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].lower, 350.0);
        assert_eq!(intervals[0].upper, None);
        assert_eq!(intervals[1].lower, 0.0);
        assert_eq!(intervals[1].upper, Some(10.0));

        let single = lon_intervals_360(118.0, 125.0);
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_intervals_full_circle() {
        let whole = vec![Lon360Interval {
            lower: 0.0,
            upper: None,
        }];
        assert_eq!(lon_intervals_360(-180.0, 180.0), whole);
        assert_eq!(lon_intervals_360(0.0, 360.0), whole);

        // one column at the antimeridian stays a single column
        assert_eq!(
            lon_intervals_360(180.0, 180.0),
            vec![Lon360Interval {
                lower: 180.0,
                upper: Some(180.0),
            }]
        );
        // half the globe west of Greenwich
        assert_eq!(
            lon_intervals_360(-180.0, 0.0),
            vec![
                Lon360Interval {
                    lower: 180.0,
                    upper: None,
                },
                Lon360Interval {
                    lower: 0.0,
                    upper: Some(0.0),
                },
            ]
        );
    }
}
