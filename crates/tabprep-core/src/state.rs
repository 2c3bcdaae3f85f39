//! Engine state, session files and dataset export
//!
//! `EngineState` is everything needed to resume editing: the dataset, edit
//! state of every catalog, variable types, both ledgers and feature
//! definitions. A `SessionFile` adds the configuration and undo history.

use crate::catalog::ValueCatalog;
use crate::cleaning::{ExclusionLedger, NullLedger};
use crate::coercion::VariableType;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::features::FeatureDefinition;
use crate::history::History;
use crate::table::{CellValue, Dataset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Complete resumable state of an engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub dataset: Dataset,
    /// Catalogs of the columns that have been inspected, by column
    #[serde(default)]
    pub catalogs: BTreeMap<String, ValueCatalog>,
    /// Variable types that differ from the default, by column
    #[serde(default)]
    pub types: BTreeMap<String, VariableType>,
    #[serde(default)]
    pub excluded: ExclusionLedger,
    #[serde(default)]
    pub nulled: NullLedger,
    /// Feature definitions in creation order
    #[serde(default)]
    pub features: Vec<FeatureDefinition>,
}

impl EngineState {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            ..Self::default()
        }
    }

    pub fn variable_type(&self, column: &str) -> VariableType {
        self.types.get(column).copied().unwrap_or_default()
    }

    /// Load state from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path.as_ref())
    }

    /// Save state to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_json(self, path.as_ref())
    }
}

/// State plus configuration and undo history, as kept between CLI runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    #[serde(default)]
    pub config: EngineConfig,
    pub state: EngineState,
    pub history: History<EngineState>,
}

impl SessionFile {
    /// Load a session from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path.as_ref())
    }

    /// Save the session to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_json(self, path.as_ref())
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(Error::Json)
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}

/// File format of an export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

/// Copy of the dataset handed to downstream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedDataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Variable type of every column
    pub types: BTreeMap<String, VariableType>,
}

impl ExportedDataset {
    pub fn from_state(state: &EngineState) -> Self {
        let columns: Vec<String> = state.dataset.columns.iter().map(|c| c.name.clone()).collect();
        let types = columns
            .iter()
            .map(|c| (c.clone(), state.variable_type(c)))
            .collect();
        Self {
            rows: state.dataset.rows.iter().map(|r| r.cells.clone()).collect(),
            columns,
            types,
        }
    }

    /// Write the rows as CSV with a header line; nulls become empty fields
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let file = fs::File::create(path)?;
        self.write_csv(file).map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_csv<W: Write>(&self, writer: W) -> std::result::Result<usize, csv::Error> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(CellValue::to_text))?;
        }
        writer.flush()?;
        Ok(self.rows.len())
    }

    /// Write the export in `format`, returning the row count
    pub fn save<P: AsRef<Path>>(&self, path: P, format: ExportFormat) -> Result<usize> {
        match format {
            ExportFormat::Csv => self.save_csv(path),
            ExportFormat::Json => {
                save_json(self, path.as_ref())?;
                Ok(self.rows.len())
            }
        }
    }

    /// Write the column types as a JSON object
    pub fn save_types<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_json(&self.types, path.as_ref())
    }
}
