//! NetCDF classic reader and writer for labelled arrays
//!
//! Text coordinates are stored the classic way: a char variable with a
//! trailing string-length dimension. NetCDF-4/HDF5 files are recognised by
//! their signature and rejected with a conversion hint.

use super::{Coordinate, LabelledArray};
use crate::error::{AggregationError, Result};
use ndarray::{ArrayD, IxDyn};
use netcdf3::{DataSet, DataVector, FileReader, FileWriter, Version};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// First bytes of every NetCDF classic and 64-bit offset file
const CLASSIC_SIGNATURE: &[u8] = b"CDF";

/// First bytes of an HDF5 (and so NetCDF-4) file
const HDF5_SIGNATURE: &[u8] = b"\x89HDF\r\n\x1a\n";

/// Longest library error text carried into a `Format` message
const ERROR_TEXT_LIMIT: usize = 160;

/// Read one data variable and the coordinate variables of its dimensions
///
/// `candidates` are tried in order. With `any_single` set, a file holding a
/// single data variable is accepted whatever that variable is called.
pub fn read_array(path: &Path, candidates: &[&str], any_single: bool) -> Result<LabelledArray> {
    check_signature(path)?;

    let mut reader = FileReader::open(path).map_err(format_error(path))?;

    let (name, dims, shape) = {
        let data_set = reader.data_set();
        let name = select_variable(data_set, candidates, any_single).ok_or_else(|| {
            AggregationError::MissingVariable {
                path: path.to_path_buf(),
                variable: candidates.join(" or "),
            }
        })?;
        let dims = data_set
            .get_var(&name)
            .map(|var| var.dim_names())
            .unwrap_or_default();
        let shape = dims
            .iter()
            .map(|dim| data_set.dim_size(dim).unwrap_or(0))
            .collect::<Vec<usize>>();
        (name, dims, shape)
    };
    log::debug!("Reading '{}' {:?} {:?} from {}", name, dims, shape, path.display());

    let mut values = read_numeric(&mut reader, path, &name)?;
    decode_values(reader.data_set(), &name, &mut values);
    let data = ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| AggregationError::format(path, format!("variable '{}': {}", name, e)))?;
    let mut array = LabelledArray::new(name, dims.clone(), data)?;

    for dim in &dims {
        let has_coord = reader.data_set().get_var(dim).is_some();
        if has_coord {
            let coord = read_coordinate(&mut reader, path, dim)?;
            array = array.with_coord(dim, coord)?;
        }
    }

    Ok(array)
}

/// Fail early on anything that is not a NetCDF classic file
///
/// A missing file surfaces as an I/O error.
fn check_signature(path: &Path) -> Result<()> {
    let mut head = Vec::with_capacity(HDF5_SIGNATURE.len());
    File::open(path)?
        .take(HDF5_SIGNATURE.len() as u64)
        .read_to_end(&mut head)?;

    if head.starts_with(HDF5_SIGNATURE) {
        return Err(AggregationError::format(
            path,
            "NetCDF-4/HDF5 file; only NetCDF classic is supported. \
             Convert it with xarray: ds.to_netcdf(path, format=\"NETCDF3_64BIT\")",
        ));
    }
    if !head.starts_with(CLASSIC_SIGNATURE) {
        return Err(AggregationError::format(path, "not a NetCDF classic file"));
    }
    Ok(())
}

/// Pick the data variable to read: named candidates first, then a lone variable
fn select_variable(data_set: &DataSet, candidates: &[&str], any_single: bool) -> Option<String> {
    if let Some(name) = candidates.iter().find(|name| data_set.has_var(name)) {
        return Some(name.to_string());
    }
    if !any_single {
        return None;
    }
    let dim_names = data_set.dim_names();
    let mut data_vars = data_set
        .get_var_names()
        .into_iter()
        .filter(|name| !dim_names.contains(name));
    match (data_vars.next(), data_vars.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

fn read_numeric(reader: &mut FileReader, path: &Path, name: &str) -> Result<Vec<f64>> {
    let vector = reader
        .read_var(name)
        .map_err(|e| AggregationError::format(path, format!("variable '{}': {}", name, error_text(&e))))?;
    numeric_values(vector).ok_or_else(|| {
        AggregationError::format(path, format!("variable '{}' is not numeric", name))
    })
}

fn numeric_values(vector: DataVector) -> Option<Vec<f64>> {
    match vector {
        DataVector::I8(v) => Some(v.into_iter().map(f64::from).collect()),
        DataVector::U8(_) => None,
        DataVector::I16(v) => Some(v.into_iter().map(f64::from).collect()),
        DataVector::I32(v) => Some(v.into_iter().map(f64::from).collect()),
        DataVector::F32(v) => Some(v.into_iter().map(f64::from).collect()),
        DataVector::F64(v) => Some(v),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Mask fill values to NaN, then apply `scale_factor` and `add_offset`
///
/// Fill values are compared against the raw stored values, before scaling.
fn decode_values(data_set: &DataSet, name: &str, values: &mut [f64]) {
    let mut missing = attr_values(data_set, name, "_FillValue");
    missing.extend(attr_values(data_set, name, "missing_value"));
    let scale = attr_values(data_set, name, "scale_factor").first().copied();
    let offset = attr_values(data_set, name, "add_offset").first().copied();

    if missing.is_empty() && scale.is_none() && offset.is_none() {
        return;
    }
    let mut masked = 0;
    for value in values.iter_mut() {
        if missing.contains(value) {
            *value = f64::NAN;
            masked += 1;
            continue;
        }
        if let Some(scale) = scale {
            *value *= scale;
        }
        if let Some(offset) = offset {
            *value += offset;
        }
    }
    if masked > 0 {
        log::debug!("Masked {} fill values in '{}'", masked, name);
    }
}

fn attr_values(data_set: &DataSet, var: &str, attr: &str) -> Vec<f64> {
    let Some(attribute) = data_set.get_var_attr(var, attr) else {
        return Vec::new();
    };
    if let Some(v) = attribute.get_f64() {
        v.to_vec()
    } else if let Some(v) = attribute.get_f32() {
        v.iter().map(|&x| f64::from(x)).collect()
    } else if let Some(v) = attribute.get_i32() {
        v.iter().map(|&x| f64::from(x)).collect()
    } else if let Some(v) = attribute.get_i16() {
        v.iter().map(|&x| f64::from(x)).collect()
    } else if let Some(v) = attribute.get_i8() {
        v.iter().map(|&x| f64::from(x)).collect()
    } else {
        Vec::new()
    }
}

fn read_coordinate(reader: &mut FileReader, path: &Path, dim: &str) -> Result<Coordinate> {
    let vector = reader
        .read_var(dim)
        .map_err(|e| AggregationError::format(path, format!("coordinate '{}': {}", dim, error_text(&e))))?;
    match vector {
        DataVector::U8(bytes) => {
            let size = reader.data_set().dim_size(dim).unwrap_or(0);
            Ok(Coordinate::Text(split_labels(&bytes, size)))
        }
        other => numeric_values(other)
            .map(Coordinate::Numeric)
            .ok_or_else(|| AggregationError::format(path, format!("coordinate '{}' is unreadable", dim))),
    }
}

/// Split a `[count, width]` char block into trimmed labels
fn split_labels(bytes: &[u8], count: usize) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }
    let width = bytes.len() / count;
    if width == 0 {
        return vec![String::new(); count];
    }
    bytes
        .chunks(width)
        .map(|chunk| {
            String::from_utf8_lossy(chunk)
                .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string()
        })
        .collect()
}

/// Write `array` (with its coordinates) to a new NetCDF classic file
///
/// An existing file at `path` is replaced.
pub fn write_array(path: &Path, array: &LabelledArray, history: &str) -> Result<()> {
    let mut data_set = DataSet::new();
    for (dim, &size) in array.dims().iter().zip(array.shape()) {
        if size == 0 {
            return Err(AggregationError::format(
                path,
                format!("dimension '{}' is empty, nothing to write", dim),
            ));
        }
        data_set.add_fixed_dim(dim, size).map_err(format_error(path))?;
    }

    let mut text_coords: Vec<(&str, Vec<u8>)> = Vec::new();
    let mut numeric_coords: Vec<(&str, &[f64])> = Vec::new();
    for dim in array.dims() {
        match array.coord(dim) {
            Some(Coordinate::Text(labels)) => {
                let width = labels.iter().map(|l| l.len()).max().unwrap_or(0).max(1);
                let width_dim = format!("{}_strlen", dim);
                data_set.add_fixed_dim(&width_dim, width).map_err(format_error(path))?;
                data_set
                    .add_var_u8(dim, &[dim.as_str(), width_dim.as_str()])
                    .map_err(format_error(path))?;
                text_coords.push((dim.as_str(), pack_labels(labels, width)));
            }
            Some(Coordinate::Numeric(values)) => {
                data_set.add_var_f64(dim, &[dim.as_str()]).map_err(format_error(path))?;
                numeric_coords.push((dim.as_str(), values.as_slice()));
            }
            None => {}
        }
    }

    let var_dims: Vec<&str> = array.dims().iter().map(String::as_str).collect();
    data_set.add_var_f64(&array.name, &var_dims[..]).map_err(format_error(path))?;
    data_set.add_global_attr_string("history", history).map_err(format_error(path))?;

    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let mut writer = FileWriter::open(path).map_err(format_error(path))?;
    writer.set_def(&data_set, Version::Classic, 0).map_err(format_error(path))?;
    for (dim, bytes) in &text_coords {
        writer.write_var_u8(dim, bytes).map_err(format_error(path))?;
    }
    for (dim, values) in &numeric_coords {
        writer.write_var_f64(dim, values).map_err(format_error(path))?;
    }
    let values: Vec<f64> = array.data().iter().copied().collect();
    writer.write_var_f64(&array.name, &values).map_err(format_error(path))?;
    writer.close().map_err(format_error(path))?;

    log::debug!("Wrote '{}' {:?} to {}", array.name, array.dims(), path.display());
    Ok(())
}

fn format_error<E: std::fmt::Debug>(path: &Path) -> impl Fn(E) -> AggregationError + '_ {
    move |e| AggregationError::format(path, error_text(&e))
}

/// Library error text, cut short: header errors carry the raw header bytes
fn error_text<E: std::fmt::Debug>(error: &E) -> String {
    let text = format!("{:?}", error);
    match text.char_indices().nth(ERROR_TEXT_LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

fn pack_labels(labels: &[String], width: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(labels.len() * width);
    for label in labels {
        let raw = label.as_bytes();
        let take = raw.len().min(width);
        bytes.extend_from_slice(&raw[..take]);
        bytes.resize(bytes.len() + (width - take), 0);
    }
    bytes
}
