//! Partition small areas into local-authority groups

use crate::error::{AggregationError, Result};
use crate::lookup::GeoLookup;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Group label used for unmapped areas under `UnmappedPolicy::Unknown`
pub const UNKNOWN_GROUP: &str = "UNKNOWN";

/// How many unmapped area codes to quote in errors and logs
const EXAMPLE_LIMIT: usize = 5;

/// What to do with small areas that have no lookup entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedPolicy {
    /// Leave them out of the grouped result (they still count globally)
    #[default]
    Exclude,
    /// Collect them in an `UNKNOWN` group
    Unknown,
    /// Fail the run
    Error,
}

impl fmt::Display for UnmappedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmappedPolicy::Exclude => write!(f, "exclude"),
            UnmappedPolicy::Unknown => write!(f, "unknown"),
            UnmappedPolicy::Error => write!(f, "error"),
        }
    }
}

impl FromStr for UnmappedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exclude" => Ok(UnmappedPolicy::Exclude),
            "unknown" => Ok(UnmappedPolicy::Unknown),
            "error" => Ok(UnmappedPolicy::Error),
            other => Err(format!(
                "unknown unmapped policy '{}' (expected exclude, unknown or error)",
                other
            )),
        }
    }
}

/// Positions along the small-area axis, grouped by authority
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    labels: Vec<String>,
    members: Vec<Vec<usize>>,
    unmapped: Vec<String>,
}

impl Grouping {
    /// Group labels, sorted ascending with `UNKNOWN` last
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Member positions, parallel to `labels`
    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Area codes with no lookup entry
    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }

    fn push(&mut self, index: &mut HashMap<String, usize>, label: &str, position: usize) {
        let slot = *index.entry(label.to_string()).or_insert_with(|| {
            self.labels.push(label.to_string());
            self.members.push(Vec::new());
            self.labels.len() - 1
        });
        self.members[slot].push(position);
    }

    /// Sort groups by label, keeping the `UNKNOWN` bucket at the end
    fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.labels.len()).collect();
        order.sort_by(|&a, &b| {
            let (left, right) = (&self.labels[a], &self.labels[b]);
            (left == UNKNOWN_GROUP)
                .cmp(&(right == UNKNOWN_GROUP))
                .then_with(|| left.cmp(right))
        });

        let mut labels = std::mem::take(&mut self.labels);
        let mut members = std::mem::take(&mut self.members);
        self.labels = order.iter().map(|&i| std::mem::take(&mut labels[i])).collect();
        self.members = order.iter().map(|&i| std::mem::take(&mut members[i])).collect();
    }
}

/// Group `areas` (the small-area coordinate, in axis order) by authority
pub fn group_areas(areas: &[String], lookup: &GeoLookup, policy: UnmappedPolicy) -> Result<Grouping> {
    let mut grouping = Grouping::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (position, area) in areas.iter().enumerate() {
        match lookup.authority(area) {
            Some(authority) => grouping.push(&mut index, authority, position),
            None => {
                grouping.unmapped.push(area.clone());
                if policy == UnmappedPolicy::Unknown {
                    grouping.push(&mut index, UNKNOWN_GROUP, position);
                }
            }
        }
    }

    grouping.sort();

    if !grouping.unmapped.is_empty() {
        let examples: Vec<String> = grouping.unmapped.iter().take(EXAMPLE_LIMIT).cloned().collect();
        if policy == UnmappedPolicy::Error {
            return Err(AggregationError::UnmappedArea {
                count: grouping.unmapped.len(),
                examples,
            });
        }
        log::warn!(
            "{} small areas have no lookup entry ({}), e.g. {}",
            grouping.unmapped.len(),
            policy,
            examples.join(", ")
        );
    }

    log::info!("Formed {} groups from {} small areas", grouping.len(), areas.len());
    Ok(grouping)
}
