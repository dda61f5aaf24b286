//! In-memory representation of one gridded variable.
//!
//! A [`GridVariable`] holds the decoded values of a variable in row-major
//! order together with the coordinate axes it is laid out on. Fill cells are
//! already `NaN` and packing (`scale_factor`/`add_offset`) is already applied.

use crate::error::{NetCdfError, NetCdfResult};

/// Role of an axis in a CF-style grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Time,
    Lat,
    Lon,
    /// Vertical or other auxiliary dimension (zlev, altitude, depth, ...)
    Other,
}

impl AxisKind {
    /// Classify a dimension name, accepting the common long/short spellings.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "time" | "t" => AxisKind::Time,
            "lat" | "latitude" => AxisKind::Lat,
            "lon" | "longitude" => AxisKind::Lon,
            _ => AxisKind::Other,
        }
    }
}

/// A coordinate axis (dimension plus its coordinate variable values).
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub name: String,
    pub values: Vec<f64>,
    pub units: Option<String>,
}

impl Axis {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            units: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn kind(&self) -> AxisKind {
        AxisKind::from_name(&self.name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A decoded multidimensional variable.
#[derive(Debug, Clone)]
pub struct GridVariable {
    pub name: String,
    pub axes: Vec<Axis>,
    /// Row-major values, `NaN` where the file holds a fill value.
    pub values: Vec<f64>,
    /// Raw `_FillValue` / `missing_value` attribute, if the file declared one.
    pub fill_value: Option<f64>,
}

impl GridVariable {
    /// Build a variable, checking that the value count matches the axes.
    pub fn new(name: impl Into<String>, axes: Vec<Axis>, values: Vec<f64>) -> NetCdfResult<Self> {
        let name = name.into();
        let expected: usize = axes.iter().map(Axis::len).product();
        if expected != values.len() {
            return Err(NetCdfError::ShapeMismatch {
                variable: name,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            name,
            axes,
            values,
            fill_value: None,
        })
    }

    pub fn with_fill_value(mut self, fill_value: Option<f64>) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(Axis::len).collect()
    }

    /// Find the first axis of the given kind and its position.
    pub fn axis(&self, kind: AxisKind) -> Option<(usize, &Axis)> {
        self.axes.iter().enumerate().find(|(_, a)| a.kind() == kind)
    }

    /// Row-major strides for each axis.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.axes.len()];
        for i in (0..self.axes.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.axes[i + 1].len();
        }
        strides
    }

    /// Value at a full multi-index. Returns `None` when out of range.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.axes.len() {
            return None;
        }
        let mut offset = 0;
        for ((i, stride), axis) in index.iter().zip(self.strides()).zip(&self.axes) {
            if *i >= axis.len() {
                return None;
            }
            offset += i * stride;
        }
        self.values.get(offset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GridVariable {
        GridVariable::new(
            "sst",
            vec![
                Axis::new("time", vec![0.0, 86400.0]),
                Axis::new("latitude", vec![-10.0, -9.75, -9.5]),
                Axis::new("longitude", vec![120.0, 120.25]),
            ],
            (0..12).map(|v| v as f64).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_axis_kinds() {
        assert_eq!(AxisKind::from_name("latitude"), AxisKind::Lat);
        assert_eq!(AxisKind::from_name("LON"), AxisKind::Lon);
        assert_eq!(AxisKind::from_name("zlev"), AxisKind::Other);
    }

    #[test]
    fn test_row_major_indexing() {
        let var = sample();
        assert_eq!(var.strides(), vec![6, 2, 1]);
        assert_eq!(var.get(&[0, 0, 0]), Some(0.0));
        assert_eq!(var.get(&[1, 2, 1]), Some(11.0));
        assert_eq!(var.get(&[0, 1, 1]), Some(3.0));
        assert_eq!(var.get(&[2, 0, 0]), None);
    }

    #[test]
    fn test_shape_mismatch() {
        let result = GridVariable::new("x", vec![Axis::new("lat", vec![1.0, 2.0])], vec![1.0]);
        assert!(matches!(result, Err(NetCdfError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_find_axis() {
        let var = sample();
        let (pos, axis) = var.axis(AxisKind::Lon).unwrap();
        assert_eq!(pos, 2);
        assert_eq!(axis.len(), 2);
        assert!(var.axis(AxisKind::Other).is_none());
    }
}
