//! Error type shared by the loader, lookup join, aggregator and writer

use std::path::PathBuf;

/// Anything that can stop an aggregation run
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Array file could not be parsed or written
    #[error("array file {path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("variable '{variable}' not found in {path}")]
    MissingVariable { path: PathBuf, variable: String },

    #[error("lookup table is missing column '{0}'")]
    MissingColumn(String),

    /// Rates and population cannot be combined
    #[error("cannot align arrays: {0}")]
    Alignment(String),

    #[error("small area '{area}' maps to both '{first}' and '{second}'")]
    LookupConflict {
        area: String,
        first: String,
        second: String,
    },

    #[error("{count} small areas have no lookup entry (first: {})", .examples.join(", "))]
    UnmappedArea { count: usize, examples: Vec<String> },
}

impl AggregationError {
    pub(crate) fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregationError>;
