//! tabprep-core: Core library for preparing tabular EHR datasets
//!
//! This library provides functionality to:
//! - Parse CSV files into a dataset of stable-id rows
//! - Build per-column catalogs of distinct values with counts
//! - Rename, combine, exclude and NaN-mark values, and strip leading zeros
//! - Coerce columns between categorical and continuous representation
//! - Derive rule-based and combined features
//! - Undo and redo committed edits through full-state snapshots

pub mod catalog;
pub mod cleaning;
pub mod coercion;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod features;
pub mod history;
pub mod labels;
pub mod parser;
pub mod state;
pub mod table;

pub use catalog::{CatalogStats, ValueCatalog, ValueEntry, MISSING_LABEL};
pub use cleaning::{ExclusionLedger, NanOutcome, NullLedger, NullRecord};
pub use coercion::{CoercionReport, VariableType};
pub use config::EngineConfig;
pub use engine::{Engine, SaveReport};
pub use error::{Error, Result};
pub use events::EngineEvent;
pub use features::{Comparison, FeatureDefinition, RecalcProgress, RecalcTask};
pub use history::{History, Snapshot};
pub use labels::{FindReplace, Replacement};
pub use parser::{parse_csv, parse_csv_str};
pub use state::{EngineState, ExportFormat, ExportedDataset, SessionFile};
pub use table::{CellValue, Column, Dataset, Row};
