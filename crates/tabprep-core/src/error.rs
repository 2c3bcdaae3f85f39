//! Error types for tabprep-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tabprep-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse CSV
    #[error("failed to parse CSV '{path}': {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The operation needs rows but the dataset has none
    #[error("no data available for {0}")]
    DataUnavailable(String),

    /// Column is not part of the dataset
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    /// Value is not part of the column's catalog
    #[error("value '{value}' not found in column '{column}'")]
    ValueNotFound { column: String, value: String },

    /// A selected value cannot be read as a number
    #[error("cannot set '{column}' as continuous: '{value}' is not numeric")]
    NotNumeric { column: String, value: String },

    /// Combining labels needs at least two selected values
    #[error("select at least 2 values in '{column}' to combine (found {selected})")]
    TooFewSelected { column: String, selected: usize },

    /// A label must contain at least one non-blank character
    #[error("label must not be empty")]
    EmptyLabel,

    /// A column with the requested name already exists
    #[error("a column named '{0}' already exists")]
    DuplicateColumn(String),

    /// Feature threshold is not a number
    #[error("invalid numeric threshold '{0}'")]
    InvalidThreshold(String),

    /// Rule-based feature would be the same for every valid row
    #[error("rule on '{variable}' sets all {valid} valid values to {outcome}")]
    ConstantFeature {
        variable: String,
        valid: usize,
        outcome: u8,
    },

    /// Source column has no numeric values to compare
    #[error("no valid numeric values found in '{0}'")]
    NoValidValues(String),

    /// Combined feature sources must differ
    #[error("cannot combine column '{0}' with itself")]
    SameColumn(String),

    /// Both source columns hold different present values on some rows
    #[error("cannot combine '{column_a}' and '{column_b}': {conflicts} row(s) have different values")]
    CombineConflict {
        column_a: String,
        column_b: String,
        conflicts: usize,
    },

    /// No engineered feature with this name
    #[error("feature '{0}' not found")]
    FeatureNotFound(String),

    /// Another feature is derived from this one
    #[error("feature '{name}' is used by feature '{dependent}'")]
    FeatureInUse { name: String, dependent: String },

    /// Find pattern failed to compile
    #[error("invalid find pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Export format is not one we can write
    #[error("unknown export format '{0}', expected csv or json")]
    UnknownFormat(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is a precondition failure caused by user input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::ColumnNotFound(_)
                | Error::ValueNotFound { .. }
                | Error::NotNumeric { .. }
                | Error::TooFewSelected { .. }
                | Error::EmptyLabel
                | Error::DuplicateColumn(_)
                | Error::InvalidThreshold(_)
                | Error::ConstantFeature { .. }
                | Error::NoValidValues(_)
                | Error::SameColumn(_)
                | Error::CombineConflict { .. }
                | Error::FeatureNotFound(_)
                | Error::FeatureInUse { .. }
                | Error::UnknownFormat(_)
        )
    }
}
