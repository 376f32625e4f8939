//! Line population weights up against the death-rate array

use super::LabelledArray;
use crate::error::{AggregationError, Result};
use ndarray::{ArrayD, Axis, IxDyn};
use std::collections::HashMap;

/// Broadcast and reindex `weights` onto the shape and labels of `target`
///
/// Every weight dimension must exist in `target`. Dimensions the weights lack
/// are broadcast. Along labelled dimensions the weights are reindexed onto the
/// target's labels; a target label with no weight gets NaN. Returns the
/// aligned weights and the number of target labels that found no weight.
pub fn align_weights(target: &LabelledArray, weights: &LabelledArray) -> Result<(ArrayD<f64>, usize)> {
    // For each weight axis: the target axis it maps to, and per target position
    // the weight position (None when the label is missing).
    let mut axis_maps: Vec<(usize, Vec<Option<usize>>)> = Vec::with_capacity(weights.dims().len());
    let mut missing = 0;

    for (weight_axis, dim) in weights.dims().iter().enumerate() {
        let target_axis = target.axis_of(dim).ok_or_else(|| {
            AggregationError::Alignment(format!(
                "'{}' has dimension '{}' which '{}' lacks (dimensions {:?})",
                weights.name,
                dim,
                target.name,
                target.dims()
            ))
        })?;
        let target_len = target.data().len_of(Axis(target_axis));
        let weight_len = weights.data().len_of(Axis(weight_axis));

        let positions = match (target.coord(dim), weights.coord(dim)) {
            (Some(target_coord), Some(weight_coord)) => {
                let index: HashMap<String, usize> = weight_coord
                    .keys()
                    .into_iter()
                    .enumerate()
                    .map(|(i, key)| (key, i))
                    .collect();
                let positions: Vec<Option<usize>> = target_coord
                    .keys()
                    .iter()
                    .map(|key| index.get(key).copied())
                    .collect();
                let unmatched = positions.iter().filter(|p| p.is_none()).count();
                if unmatched > 0 {
                    log::warn!(
                        "{} of {} '{}' labels have no '{}' value",
                        unmatched,
                        target_len,
                        dim,
                        weights.name
                    );
                }
                missing += unmatched;
                positions
            }
            _ if target_len == weight_len => (0..target_len).map(Some).collect(),
            _ => {
                return Err(AggregationError::Alignment(format!(
                    "dimension '{}' has size {} in '{}' but {} in '{}'",
                    dim, target_len, target.name, weight_len, weights.name
                )))
            }
        };
        axis_maps.push((target_axis, positions));
    }

    let mut weight_index = vec![0usize; axis_maps.len()];
    let aligned = ArrayD::from_shape_fn(IxDyn(target.shape()), |index: IxDyn| {
        for (slot, (target_axis, positions)) in weight_index.iter_mut().zip(&axis_maps) {
            match positions[index[*target_axis]] {
                Some(position) => *slot = position,
                None => return f64::NAN,
            }
        }
        weights
            .data()
            .get(weight_index.as_slice())
            .copied()
            .unwrap_or(f64::NAN)
    });

    Ok((aligned, missing))
}
