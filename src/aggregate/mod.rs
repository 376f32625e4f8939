//! Population-weighted means along the small-area dimension
//!
//! Both reductions use the same kernel:
//!
//! ```text
//! mean = sum(rate_i * population_i) / sum(population_i)
//! ```
//!
//! NaN terms are skipped in each sum. A zero total weight gives NaN.

mod grouping;

pub use grouping::{group_areas, Grouping, UnmappedPolicy, UNKNOWN_GROUP};

use crate::dataset::{Coordinate, LabelledArray};
use crate::error::{AggregationError, Result};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Zip};

/// Weighted mean over the `members` positions of `axis`
///
/// The result has the shape of `rates` with `axis` removed.
pub fn weighted_mean(rates: ArrayViewD<f64>, weights: ArrayViewD<f64>, axis: usize, members: &[usize]) -> ArrayD<f64> {
    let mut shape = rates.shape().to_vec();
    shape.remove(axis);
    let mut numerator = ArrayD::<f64>::zeros(IxDyn(&shape));
    let mut denominator = ArrayD::<f64>::zeros(IxDyn(&shape));

    for &i in members {
        let rate = rates.index_axis(Axis(axis), i);
        let weight = weights.index_axis(Axis(axis), i);
        Zip::from(&mut numerator)
            .and(&mut denominator)
            .and(&rate)
            .and(&weight)
            .for_each(|num, den, &r, &w| {
                let product = r * w;
                if !product.is_nan() {
                    *num += product;
                }
                if !w.is_nan() {
                    *den += w;
                }
            });
    }

    Zip::from(&numerator)
        .and(&denominator)
        .map_collect(|&num, &den| if den == 0.0 { f64::NAN } else { num / den })
}

fn area_axis(rates: &LabelledArray, weights: &ArrayD<f64>, area_dim: &str) -> Result<usize> {
    if rates.shape() != weights.shape() {
        return Err(AggregationError::Alignment(format!(
            "weights have shape {:?} but rates have shape {:?}",
            weights.shape(),
            rates.shape()
        )));
    }
    rates
        .axis_of(area_dim)
        .ok_or_else(|| AggregationError::Alignment(format!("'{}' has no '{}' dimension", rates.name, area_dim)))
}

/// Copy coordinates for every dimension except `skip` onto `array`
fn carry_coords(mut array: LabelledArray, source: &LabelledArray, skip: &str) -> Result<LabelledArray> {
    for dim in source.dims().iter().filter(|d| d.as_str() != skip) {
        if let Some(coord) = source.coord(dim) {
            array = array.with_coord(dim, coord.clone())?;
        }
    }
    Ok(array)
}

/// Weighted mean per group, stacked along a new leading `group_dim`
///
/// `weights` must already be aligned to the shape of `rates`.
pub fn aggregate_by_group(
    rates: &LabelledArray,
    weights: &ArrayD<f64>,
    area_dim: &str,
    grouping: &Grouping,
    group_dim: &str,
) -> Result<LabelledArray> {
    let axis = area_axis(rates, weights, area_dim)?;

    let mut rest: Vec<usize> = rates.shape().to_vec();
    rest.remove(axis);
    let mut flat = Vec::with_capacity(grouping.len() * rest.iter().product::<usize>());
    for members in grouping.members() {
        let mean = weighted_mean(rates.data().view(), weights.view(), axis, members);
        flat.extend(mean.iter().copied());
    }

    let mut shape = Vec::with_capacity(rest.len() + 1);
    shape.push(grouping.len());
    shape.extend_from_slice(&rest);
    let data = ArrayD::from_shape_vec(IxDyn(&shape), flat)
        .map_err(|e| AggregationError::Alignment(e.to_string()))?;

    let mut dims = vec![group_dim.to_string()];
    dims.extend(rates.dims().iter().filter(|d| d.as_str() != area_dim).cloned());

    let grouped = LabelledArray::new(rates.name.clone(), dims, data)?
        .with_coord(group_dim, Coordinate::Text(grouping.labels().to_vec()))?;
    carry_coords(grouped, rates, area_dim)
}

/// Weighted mean over every small area
pub fn aggregate_global(rates: &LabelledArray, weights: &ArrayD<f64>, area_dim: &str) -> Result<LabelledArray> {
    let axis = area_axis(rates, weights, area_dim)?;
    let all: Vec<usize> = (0..rates.shape()[axis]).collect();
    let data = weighted_mean(rates.data().view(), weights.view(), axis, &all);

    let dims = rates
        .dims()
        .iter()
        .filter(|d| d.as_str() != area_dim)
        .cloned()
        .collect();
    let global = LabelledArray::new(rates.name.clone(), dims, data)?;
    carry_coords(global, rates, area_dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::GeoLookup;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    fn msoa_rates(areas: &[&str], values: &[f64]) -> LabelledArray {
        LabelledArray::new("death_rates", vec!["MSOA".into()], arr1(values).into_dyn())
            .unwrap()
            .with_coord("MSOA", Coordinate::Text(areas.iter().map(|s| s.to_string()).collect()))
            .unwrap()
    }

    fn lookup(pairs: &[(&str, &str)]) -> GeoLookup {
        GeoLookup::from_rows(pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())), true).unwrap()
    }

    fn run(rates: &LabelledArray, population: &[f64], pairs: &[(&str, &str)]) -> (LabelledArray, LabelledArray) {
        let weights = arr1(population).into_dyn();
        let keys = rates.keys("MSOA").unwrap();
        let grouping = group_areas(&keys, &lookup(pairs), UnmappedPolicy::Exclude).unwrap();
        let grouped = aggregate_by_group(rates, &weights, "MSOA", &grouping, "LAD").unwrap();
        let global = aggregate_global(rates, &weights, "MSOA").unwrap();
        (grouped, global)
    }

    #[test]
    fn test_single_group_example() {
        let rates = msoa_rates(&["A", "B"], &[2.0, 4.0]);
        let (grouped, global) = run(&rates, &[10.0, 30.0], &[("A", "X"), ("B", "X")]);

        assert_eq!(grouped.dims(), &["LAD".to_string()]);
        assert_relative_eq!(grouped.value_at(&["X"]).unwrap(), 3.5);
        assert_relative_eq!(global.scalar().unwrap(), 3.5);
    }

    #[test]
    fn test_identical_rates_ignore_population() {
        let rates = msoa_rates(&["A", "B", "C"], &[0.07, 0.07, 0.07]);
        let (grouped, _) = run(&rates, &[1.0, 250.0, 9_000.0], &[("A", "X"), ("B", "X"), ("C", "X")]);

        assert_relative_eq!(grouped.value_at(&["X"]).unwrap(), 0.07, epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_population_is_plain_mean() {
        let rates = msoa_rates(&["A", "B", "C", "D"], &[0.01, 0.02, 0.06, 0.5]);
        let (grouped, _) = run(&rates, &[500.0; 4], &[("A", "X"), ("B", "X"), ("C", "X"), ("D", "Y")]);

        assert_relative_eq!(grouped.value_at(&["X"]).unwrap(), 0.03, epsilon = 1e-12);
        assert_relative_eq!(grouped.value_at(&["Y"]).unwrap(), 0.5);
    }

    #[test]
    fn test_groups_reweighted_match_global() {
        let rates = msoa_rates(&["A", "B", "C", "D", "E"], &[0.012, 0.034, 0.021, 0.05, 0.009]);
        let population = [1200.0, 800.0, 3100.0, 450.0, 2000.0];
        let pairs = [("A", "X"), ("B", "Y"), ("C", "X"), ("D", "Z"), ("E", "Y")];
        let (grouped, global) = run(&rates, &population, &pairs);

        let group_population = |lad: &str| -> f64 {
            pairs
                .iter()
                .zip(population.iter())
                .filter(|((_, l), _)| *l == lad)
                .map(|(_, p)| p)
                .sum()
        };
        let total: f64 = population.iter().sum();
        let reweighted: f64 = ["X", "Y", "Z"]
            .iter()
            .map(|&lad| grouped.value_at(&[lad]).unwrap() * group_population(lad))
            .sum::<f64>()
            / total;

        assert_relative_eq!(reweighted, global.scalar().unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_population_group_is_nan() {
        let rates = msoa_rates(&["A", "B", "C"], &[0.1, 0.2, 0.3]);
        let (grouped, global) = run(&rates, &[0.0, 0.0, 5.0], &[("A", "X"), ("B", "X"), ("C", "Y")]);

        assert!(grouped.value_at(&["X"]).unwrap().is_nan());
        assert_relative_eq!(grouped.value_at(&["Y"]).unwrap(), 0.3);
        assert_relative_eq!(global.scalar().unwrap(), 0.3);
    }

    #[test]
    fn test_nan_terms_skipped() {
        let rates = msoa_rates(&["A", "B"], &[f64::NAN, 0.2]);
        let (_, global) = run(&rates, &[10.0, 10.0], &[("A", "X"), ("B", "X")]);

        // The NaN rate drops out of the numerator but its population stays in the denominator
        assert_relative_eq!(global.scalar().unwrap(), 0.1);
    }

    #[test]
    fn test_extra_dimensions_kept() {
        let rates = LabelledArray::new(
            "death_rates",
            vec!["age".into(), "MSOA".into()],
            arr2(&[[0.01, 0.03], [0.1, 0.2]]).into_dyn(),
        )
        .unwrap()
        .with_coord("age", Coordinate::Numeric(vec![60.0, 85.0]))
        .unwrap()
        .with_coord("MSOA", Coordinate::Text(vec!["A".into(), "B".into()]))
        .unwrap();
        let weights = arr2(&[[100.0, 300.0], [10.0, 10.0]]).into_dyn();

        let grouping = group_areas(
            &rates.keys("MSOA").unwrap(),
            &lookup(&[("A", "X"), ("B", "X")]),
            UnmappedPolicy::Exclude,
        )
        .unwrap();
        let grouped = aggregate_by_group(&rates, &weights, "MSOA", &grouping, "LAD").unwrap();
        let global = aggregate_global(&rates, &weights, "MSOA").unwrap();

        assert_eq!(grouped.dims(), &["LAD".to_string(), "age".to_string()]);
        assert_eq!(grouped.coord("age"), rates.coord("age"));
        assert_relative_eq!(grouped.value_at(&["X", "60"]).unwrap(), 0.025);
        assert_relative_eq!(grouped.value_at(&["X", "85"]).unwrap(), 0.15);
        assert_eq!(global.dims(), &["age".to_string()]);
        assert_relative_eq!(global.value_at(&["85"]).unwrap(), 0.15);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let rates = msoa_rates(&["A", "B"], &[0.1, 0.2]);
        let weights = arr1(&[1.0, 2.0, 3.0]).into_dyn();
        assert!(matches!(
            aggregate_global(&rates, &weights, "MSOA"),
            Err(AggregationError::Alignment(_))
        ));
    }
}
