//! Mortality Aggregation - population-weighted death rates across geographies
//!
//! This library provides:
//! - Labelled n-dimensional arrays read from and written to NetCDF classic files
//! - Small-area to local-authority lookup loading with duplicate and conflict handling
//! - Population-weighted means per local authority and over all small areas
//! - A single-pass pipeline tying the three together

pub mod error;
pub mod dataset;
pub mod lookup;
pub mod aggregate;
pub mod pipeline;

// Re-export commonly used types
pub use error::{AggregationError, Result};
pub use dataset::{Coordinate, LabelledArray};
pub use lookup::{GeoLookup, LookupColumns};
pub use aggregate::{Grouping, UnmappedPolicy};
pub use pipeline::{run, RunConfig, RunSummary};
