//! Labelled n-dimensional arrays and the rate/population loaders
//!
//! A `LabelledArray` is an `ndarray::ArrayD<f64>` plus dimension names and
//! optional coordinate labels per dimension, enough to line up the
//! death-rate and population datasets by small-area code.

mod align;
pub mod netcdf;

pub use align::align_weights;

use crate::error::{AggregationError, Result};
use ndarray::{ArrayD, Axis};
use std::collections::BTreeMap;
use std::path::Path;

/// Canonical name of the death-rate variable
pub const RATE_VARIABLE: &str = "death_rates";

/// Name given to an unnamed DataArray when it is saved to disk
pub const ANONYMOUS_VARIABLE: &str = "__xarray_dataarray_variable__";

/// Name of the population variable
pub const POPULATION_VARIABLE: &str = "population";

/// Labels along one dimension
#[derive(Debug, Clone, PartialEq)]
pub enum Coordinate {
    /// Area codes and other string labels
    Text(Vec<String>),
    /// Ages, years and other numeric labels
    Numeric(Vec<f64>),
}

impl Coordinate {
    pub fn len(&self) -> usize {
        match self {
            Coordinate::Text(labels) => labels.len(),
            Coordinate::Numeric(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label at `index` as a join key
    pub fn key(&self, index: usize) -> String {
        match self {
            Coordinate::Text(labels) => labels[index].clone(),
            Coordinate::Numeric(values) => values[index].to_string(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        (0..self.len()).map(|i| self.key(i)).collect()
    }
}

/// An n-dimensional `f64` array with named dimensions
#[derive(Debug, Clone)]
pub struct LabelledArray {
    pub name: String,
    dims: Vec<String>,
    coords: BTreeMap<String, Coordinate>,
    data: ArrayD<f64>,
}

impl LabelledArray {
    /// Wrap `data`, naming its axes in order
    pub fn new(name: impl Into<String>, dims: Vec<String>, data: ArrayD<f64>) -> Result<Self> {
        let name = name.into();
        if dims.len() != data.ndim() {
            return Err(AggregationError::Alignment(format!(
                "'{}' has {} axes but {} dimension names",
                name,
                data.ndim(),
                dims.len()
            )));
        }
        Ok(Self {
            name,
            dims,
            coords: BTreeMap::new(),
            data,
        })
    }

    /// Attach coordinate labels to a dimension
    pub fn with_coord(mut self, dim: &str, coord: Coordinate) -> Result<Self> {
        let axis = self.axis_of(dim).ok_or_else(|| {
            AggregationError::Alignment(format!("'{}' has no dimension '{}'", self.name, dim))
        })?;
        let size = self.data.len_of(Axis(axis));
        if coord.len() != size {
            return Err(AggregationError::Alignment(format!(
                "coordinate '{}' has {} labels but dimension has size {}",
                dim,
                coord.len(),
                size
            )));
        }
        self.coords.insert(dim.to_string(), coord);
        Ok(self)
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn coord(&self, dim: &str) -> Option<&Coordinate> {
        self.coords.get(dim)
    }

    /// Join keys along `dim`: coordinate labels, or positions when unlabelled
    pub fn keys(&self, dim: &str) -> Option<Vec<String>> {
        let axis = self.axis_of(dim)?;
        Some(match self.coords.get(dim) {
            Some(coord) => coord.keys(),
            None => (0..self.data.len_of(Axis(axis))).map(|i| i.to_string()).collect(),
        })
    }

    /// Scalar value of a zero-dimensional array
    pub fn scalar(&self) -> Option<f64> {
        if self.data.ndim() == 0 {
            self.data.iter().next().copied()
        } else {
            None
        }
    }

    /// Value at a label position, one label key per dimension
    pub fn value_at(&self, keys: &[&str]) -> Option<f64> {
        if keys.len() != self.dims.len() {
            return None;
        }
        let mut index = Vec::with_capacity(keys.len());
        for (dim, key) in self.dims.iter().zip(keys) {
            let labels = self.keys(dim)?;
            index.push(labels.iter().position(|l| l == key)?);
        }
        self.data.get(index.as_slice()).copied()
    }
}

/// Load the death-rate array and give it its canonical name
///
/// Looks for `death_rates`, then the anonymous DataArray name, then falls back
/// to the only data variable in the file.
pub fn load_death_rates(path: &Path) -> Result<LabelledArray> {
    let array = netcdf::read_array(path, &[RATE_VARIABLE, ANONYMOUS_VARIABLE], true)?;
    if array.name != RATE_VARIABLE {
        log::debug!("Renaming '{}' to '{}'", array.name, RATE_VARIABLE);
    }
    Ok(array.renamed(RATE_VARIABLE))
}

/// Load the population array
pub fn load_population(path: &Path) -> Result<LabelledArray> {
    netcdf::read_array(path, &[POPULATION_VARIABLE], false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn text(labels: &[&str]) -> Coordinate {
        Coordinate::Text(labels.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_dimension_count_must_match() {
        let result = LabelledArray::new("x", vec!["MSOA".into()], arr2(&[[1.0, 2.0]]).into_dyn());
        assert!(matches!(result, Err(AggregationError::Alignment(_))));
    }

    #[test]
    fn test_coord_length_checked() {
        let array = LabelledArray::new("x", vec!["MSOA".into()], arr1(&[1.0, 2.0]).into_dyn()).unwrap();
        assert!(array.with_coord("MSOA", text(&["A"])).is_err());
    }

    #[test]
    fn test_value_at_labels() {
        let array = LabelledArray::new(
            "x",
            vec!["MSOA".into(), "age".into()],
            arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn(),
        )
        .unwrap()
        .with_coord("MSOA", text(&["A", "B"]))
        .unwrap()
        .with_coord("age", Coordinate::Numeric(vec![0.0, 5.0]))
        .unwrap();

        assert_eq!(array.value_at(&["B", "5"]), Some(4.0));
        assert_eq!(array.value_at(&["C", "0"]), None);
        assert_eq!(array.keys("age").unwrap(), vec!["0", "5"]);
    }

    #[test]
    fn test_unlabelled_keys_are_positions() {
        let array = LabelledArray::new("x", vec!["year".into()], arr1(&[1.0, 2.0, 3.0]).into_dyn()).unwrap();
        assert_eq!(array.keys("year").unwrap(), vec!["0", "1", "2"]);
        assert!(array.keys("MSOA").is_none());
    }
}
