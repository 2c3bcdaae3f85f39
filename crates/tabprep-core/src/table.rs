//! Core table types for representing the dataset being prepared

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

static NULL_CELL: CellValue = CellValue::Null;

/// A dataset: ordered rows sharing one column set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Column definitions
    pub columns: Vec<Column>,
    /// Row data, in insertion order
    pub rows: Vec<Row>,
    /// Id handed to the next inserted row
    next_row_id: u64,
}

impl Dataset {
    /// Create an empty dataset with the given column names
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(i, name)| Column::new(name.into(), i))
            .collect();
        Self {
            columns,
            rows: Vec::new(),
            next_row_id: 0,
        }
    }

    /// Create a dataset from column names and row cells
    ///
    /// Rows shorter than the header are padded with nulls, longer rows are truncated.
    pub fn from_records<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        records: impl IntoIterator<Item = Vec<CellValue>>,
    ) -> Self {
        let mut dataset = Self::new(columns);
        for cells in records {
            dataset.push_row(cells);
        }
        dataset
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Index of a column, or `ColumnNotFound`
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.find_column(name)
            .map(|c| c.index)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Find a row by its stable ID
    pub fn find_row(&self, id: u64) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }

    /// Append a row, returning its ID
    pub fn push_row(&mut self, mut cells: Vec<CellValue>) -> u64 {
        cells.resize(self.columns.len(), CellValue::Null);
        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.push(Row::new(id, cells));
        id
    }

    /// Append a row that already carries an ID (restored rows)
    pub fn push_existing(&mut self, mut row: Row) {
        row.cells.resize(self.columns.len(), CellValue::Null);
        self.next_row_id = self.next_row_id.max(row.id + 1);
        self.rows.push(row);
    }

    /// Add a column filled with nulls, returning its index
    pub fn add_column(&mut self, name: impl Into<String>) -> Result<usize> {
        let name = name.into();
        if self.find_column(&name).is_some() {
            return Err(Error::DuplicateColumn(name));
        }
        let index = self.columns.len();
        self.columns.push(Column::new(name, index));
        for row in &mut self.rows {
            row.cells.push(CellValue::Null);
        }
        Ok(index)
    }

    /// Remove a column and its cells, returning the removed index
    pub fn remove_column(&mut self, name: &str) -> Result<usize> {
        let index = self.column_index(name)?;
        self.columns.remove(index);
        for (i, col) in self.columns.iter_mut().enumerate() {
            col.index = i;
        }
        for row in &mut self.rows {
            if index < row.cells.len() {
                row.cells.remove(index);
            }
        }
        Ok(index)
    }

    /// Iterate the cells of one column
    pub fn column_cells(&self, index: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().map(move |r| r.get(index).unwrap_or(&NULL_CELL))
    }
}

/// A column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column index (0-based)
    pub index: usize,
}

impl Column {
    /// Create a new column
    pub fn new(name: String, index: usize) -> Self {
        Self { name, index }
    }
}

/// A row of data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Stable row ID, kept across exclusion and restore
    pub id: u64,
    /// Cell values for each column
    pub cells: Vec<CellValue>,
}

impl Row {
    /// Create a new row
    pub fn new(id: u64, cells: Vec<CellValue>) -> Self {
        Self { id, cells }
    }

    /// Get a cell value by column index
    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.cells.get(index)
    }

    /// Get a mutable cell value by column index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut CellValue> {
        self.cells.get_mut(index)
    }
}

/// A single cell
///
/// Serialized untagged so exports read as plain JSON strings, numbers and nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Numeric value; integral numbers display without a fraction
    Number(f64),
    /// Text value
    String(String),
    /// Missing value
    Null,
}

impl CellValue {
    /// Build a cell from a raw text field; blank fields become `Null`
    pub fn from_field(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            CellValue::Null
        } else {
            CellValue::String(trimmed.to_string())
        }
    }

    /// Build a text cell
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::String(s.into())
    }

    /// Parse text as a finite number
    pub fn parse_number(s: &str) -> Option<f64> {
        s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
    }

    /// Check if the cell is null
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Null or blank text
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::String(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Read the cell as a finite number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Number(_) | CellValue::Null => None,
            CellValue::String(s) => Self::parse_number(s),
        }
    }

    /// Whether the number (if any) has no fractional part
    pub fn is_integer(&self) -> bool {
        matches!(self, CellValue::Number(n) if n.is_finite() && n.fract() == 0.0)
    }

    /// Normalized textual form used for grouping and matching
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Number(n) => n.to_string(),
            CellValue::String(s) => s.clone(),
            CellValue::Null => String::new(),
        }
    }

    /// Label equality: numeric when both sides are numbers, textual otherwise
    ///
    /// Null only matches null.
    pub fn matches(&self, other: &CellValue) -> bool {
        match (self, other) {
            (CellValue::Number(a), CellValue::Number(b)) => a == b,
            (CellValue::Null, CellValue::Null) => true,
            (CellValue::Null, _) | (_, CellValue::Null) => false,
            (a, b) => a.to_text() == b.to_text(),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::String(s) => write!(f, "{}", s),
            CellValue::Null => write!(f, ""),
        }
    }
}
