//! Small-area to local-authority lookup

pub mod loader;

pub use loader::{load_lookup, load_lookup_from_reader, LookupColumns, DEFAULT_LOOKUP_PATH};

use crate::error::{AggregationError, Result};
use std::collections::{HashMap, HashSet};

/// Mapping from small-area code to local-authority code
#[derive(Debug, Clone, Default)]
pub struct GeoLookup {
    authorities: HashMap<String, String>,
    duplicates: usize,
    conflicts: usize,
}

impl GeoLookup {
    /// Build from `(area, authority)` rows in file order
    ///
    /// Exact duplicate rows collapse to one. When an area appears with two
    /// different authorities the first one wins and the conflict is logged;
    /// with `strict` the conflict is an error instead.
    pub fn from_rows<I>(rows: I, strict: bool) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut lookup = Self::default();

        for (area, authority) in rows {
            if !seen.insert((area.clone(), authority.clone())) {
                lookup.duplicates += 1;
                continue;
            }
            match lookup.authorities.get(&area) {
                None => {
                    lookup.authorities.insert(area, authority);
                }
                Some(first) => {
                    if strict {
                        return Err(AggregationError::LookupConflict {
                            area,
                            first: first.clone(),
                            second: authority,
                        });
                    }
                    log::warn!(
                        "Small area {} maps to both {} and {}; keeping {}",
                        area,
                        first,
                        authority,
                        first
                    );
                    lookup.conflicts += 1;
                }
            }
        }

        Ok(lookup)
    }

    pub fn authority(&self, area: &str) -> Option<&str> {
        self.authorities.get(area).map(String::as_str)
    }

    /// Number of distinct small areas
    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }

    /// Rows dropped as exact duplicates
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Areas that appeared with more than one authority
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }
}
