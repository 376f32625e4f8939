//! Load the LSOA/MSOA/LAD/GOR/CTRY lookup CSV

use super::GeoLookup;
use crate::error::{AggregationError, Result};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Lookup location relative to the data root
pub const DEFAULT_LOOKUP_PATH: &str = "data/covariates/LSOA_MSOA_LAD_GOR_CTRY_lookup.csv";

/// Which CSV columns hold the small-area and local-authority codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupColumns {
    pub area: String,
    pub authority: String,
}

impl Default for LookupColumns {
    fn default() -> Self {
        Self {
            area: "MSOA2011".to_string(),
            authority: "LAD2020".to_string(),
        }
    }
}

/// Load the lookup table from a CSV file
pub fn load_lookup(path: &Path, columns: &LookupColumns, strict: bool) -> Result<GeoLookup> {
    let file = File::open(path)?;
    load_lookup_from_reader(file, columns, strict)
}

/// Load the lookup table from any reader
///
/// Only the two configured columns are read; every other column is ignored.
pub fn load_lookup_from_reader<R: Read>(reader: R, columns: &LookupColumns, strict: bool) -> Result<GeoLookup> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| AggregationError::MissingColumn(name.to_string()))
    };
    let area_idx = column(&columns.area)?;
    let authority_idx = column(&columns.authority)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let area = record.get(area_idx).unwrap_or_default();
        let authority = record.get(authority_idx).unwrap_or_default();
        if area.is_empty() || authority.is_empty() {
            continue;
        }
        rows.push((area.to_string(), authority.to_string()));
    }

    let total = rows.len();
    let lookup = GeoLookup::from_rows(rows, strict)?;
    log::info!(
        "Lookup: {} rows, {} small areas, {} duplicates dropped, {} conflicts",
        total,
        lookup.len(),
        lookup.duplicates(),
        lookup.conflicts()
    );
    Ok(lookup)
}
