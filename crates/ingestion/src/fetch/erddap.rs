//! ERDDAP griddap request construction.
//!
//! A griddap `.nc` request selects each dimension with
//! `[(start):stride:(stop)]`, variables separated by commas:
//!
//! ```text
//! {base}/{dataset}.nc?sst[(2001-01-01T00:00:00Z):1:(2001-01-31T00:00:00Z)][(0.0):1:(0.0)][(-11.0):1:(-8.0)][(118.0):1:(125.0)]
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use ocean_common::{lon_intervals_360, CommonResult, LonConvention, Period, Region};

use crate::config::{SourceSpec, TimeWindow};

/// One dimension constraint. `stop == None` renders as ERDDAP's `last`.
#[derive(Debug, Clone, PartialEq)]
pub enum DimRange {
    Time {
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    },
    Value {
        start: f64,
        stop: Option<f64>,
    },
}

impl DimRange {
    fn render(&self) -> String {
        match self {
            DimRange::Time { start, stop } => format!(
                "[({}):1:({})]",
                start.to_rfc3339_opts(SecondsFormat::Secs, true),
                stop.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            DimRange::Value {
                start,
                stop: Some(stop),
            } => format!("[({:?}):1:({:?})]", start, stop),
            DimRange::Value { start, stop: None } => format!("[({:?}):1:last]", start),
        }
    }
}

/// A single griddap file request.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddapQuery {
    pub base_url: String,
    pub dataset_id: String,
    pub variables: Vec<String>,
    /// In dataset dimension order: time, optional vertical, lat, lon
    pub dims: Vec<DimRange>,
}

impl GriddapQuery {
    /// The request URL. Percent-encoding of the query happens in the HTTP client.
    pub fn to_url(&self) -> String {
        let dims: String = self.dims.iter().map(DimRange::render).collect();
        let selection = self
            .variables
            .iter()
            .map(|v| format!("{}{}", v, dims))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}/{}.nc?{}",
            self.base_url.trim_end_matches('/'),
            self.dataset_id,
            selection
        )
    }
}

/// Time bounds requested for `period`.
pub fn time_window(window: TimeWindow, period: &Period) -> CommonResult<(DateTime<Utc>, DateTime<Utc>)> {
    Ok(match window {
        TimeWindow::InclusiveDays => (period.start_instant(), period.end_instant()),
        TimeWindow::EndExclusive => (period.start_instant(), period.end_exclusive_instant()),
        TimeWindow::PaddedEnd { days } => (period.start_instant(), period.pad_end(days)?.end_instant()),
    })
}

/// Build the requests covering `region` over `period`.
///
/// Datasets published in 0..360 longitude get one request per wrapped
/// interval, so a region crossing the prime meridian yields two parts.
pub fn build_queries(spec: &SourceSpec, region: &Region, period: &Period) -> CommonResult<Vec<GriddapQuery>> {
    let bbox = region.bbox();
    let (t0, t1) = time_window(spec.time_window, period)?;

    let lon_ranges: Vec<DimRange> = match spec.lon_convention {
        LonConvention::Pm180 => vec![DimRange::Value {
            start: bbox.lon_min,
            stop: Some(bbox.lon_max),
        }],
        LonConvention::Zero360 => lon_intervals_360(bbox.lon_min, bbox.lon_max)
            .into_iter()
            .map(|interval| DimRange::Value {
                start: interval.lower,
                stop: interval.upper,
            })
            .collect(),
    };

    Ok(lon_ranges
        .into_iter()
        .map(|lon| {
            let mut dims = vec![DimRange::Time { start: t0, stop: t1 }];
            if let Some(vertical) = &spec.vertical {
                dims.push(DimRange::Value {
                    start: vertical.value,
                    stop: Some(vertical.value),
                });
            }
            dims.push(DimRange::Value {
                start: bbox.lat_min,
                stop: Some(bbox.lat_max),
            });
            dims.push(lon);

            GriddapQuery {
                base_url: spec.base_url.clone(),
                dataset_id: spec.dataset_id.clone(),
                variables: spec.variables.iter().map(|v| v.remote.clone()).collect(),
                dims,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocean_common::{BoundingBox, SourceKind};

    fn region(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Region {
        Region::new("R", BoundingBox::new(lat_min, lat_max, lon_min, lon_max)).unwrap()
    }

    #[test]
    fn test_sst_url() {
        let spec = SourceSpec::builtin(SourceKind::Sst);
        let queries = build_queries(
            &spec,
            &region(-11.0, -8.0, 118.0, 125.0),
            &Period::month(2001, 1).unwrap(),
        )
        .unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(
            queries[0].to_url(),
            "https://coastwatch.pfeg.noaa.gov/erddap/griddap/ncdcOisst21Agg.nc?\
             sst[(2001-01-01T00:00:00Z):1:(2001-01-31T00:00:00Z)][(0.0):1:(0.0)]\
             [(-11.0):1:(-8.0)][(118.0):1:(125.0)]"
        );
    }

    #[test]
    fn test_chl_window_is_padded() {
        let spec = SourceSpec::builtin(SourceKind::Chl);
        let queries = build_queries(
            &spec,
            &region(-2.0, 2.0, -4.0, 4.0),
            &Period::month(2010, 2).unwrap(),
        )
        .unwrap();
        assert_eq!(queries.len(), 1);
        let url = queries[0].to_url();
        assert!(url.contains("[(2010-02-01T00:00:00Z):1:(2010-03-07T00:00:00Z)]"));
        assert!(url.contains("[(-4.0):1:(4.0)]"));
    }

    #[test]
    fn test_waves_split_and_end_exclusive() {
        let spec = SourceSpec::builtin(SourceKind::Waves);
        let queries = build_queries(
            &spec,
            &region(-2.0, 2.0, -4.0, 4.0),
            &Period::month(2020, 6).unwrap(),
        )
        .unwrap();
        assert_eq!(queries.len(), 2);

        let first = queries[0].to_url();
        assert!(first.contains("Thgt[(2020-06-01T00:00:00Z):1:(2020-07-01T00:00:00Z)]"));
        assert!(first.contains(",Tper["));
        assert!(first.ends_with("[(356.0):1:last]"));
        assert!(queries[1].to_url().ends_with("[(0.0):1:(4.0)]"));
    }

    #[test]
    fn test_no_vertical_dimension() {
        let mut spec = SourceSpec::builtin(SourceKind::Waves);
        spec.vertical = None;
        let queries = build_queries(
            &spec,
            &region(-11.0, -8.0, 118.0, 125.0),
            &Period::month(2020, 6).unwrap(),
        )
        .unwrap();
        assert_eq!(queries[0].dims.len(), 3);
    }

    #[test]
    fn test_global_region_requests_every_longitude() {
        let spec = SourceSpec::builtin(SourceKind::Sst);
        let queries = build_queries(
            &spec,
            &region(-90.0, 90.0, -180.0, 180.0),
            &Period::month(2001, 1).unwrap(),
        )
        .unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].to_url().ends_with("[(-90.0):1:(90.0)][(0.0):1:last]"));
    }

    #[test]
    fn test_oversized_padding_is_rejected() {
        let mut spec = SourceSpec::builtin(SourceKind::Chl);
        spec.time_window = TimeWindow::PaddedEnd { days: i64::MAX };
        let result = build_queries(
            &spec,
            &region(-2.0, 2.0, -4.0, 4.0),
            &Period::month(2010, 2).unwrap(),
        );
        assert!(result.is_err());
    }
}
