//! CSV ingestion into a dataset
//!
//! Cells are kept as text: the engine starts every column as categorical and
//! only converts to numbers when a column is coerced to continuous.

use crate::error::{Error, Result};
use crate::table::{CellValue, Dataset};
use log::{debug, warn};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Parse a CSV file into a Dataset
pub fn parse_csv<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    read_records(BufReader::new(file), path.to_path_buf())
}

/// Parse CSV from a string (useful for testing)
pub fn parse_csv_str(content: &str, source_name: &str) -> Result<Dataset> {
    read_records(content.as_bytes(), PathBuf::from(source_name))
}

fn read_records<R: Read>(reader: R, path: PathBuf) -> Result<Dataset> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // Allow varying number of fields
        .from_reader(reader);

    let headers = csv_reader.headers().map_err(|e| Error::Csv {
        path: path.clone(),
        source: e,
    })?;

    let columns: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
    if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
        return Err(Error::CsvParse {
            path,
            message: "no columns found in CSV".to_string(),
        });
    }

    let mut dataset = Dataset::new(columns);
    for (row_idx, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| Error::Csv {
            path: path.clone(),
            source: e,
        })?;

        let mut cells: Vec<CellValue> = record.iter().map(CellValue::from_field).collect();
        if cells.len() > dataset.column_count() {
            warn!(
                "row {} in {} has more cells than columns, truncating",
                row_idx + 1,
                path.display()
            );
            cells.truncate(dataset.column_count());
        }
        dataset.push_row(cells);
    }

    debug!(
        "parsed {} rows x {} columns from {}",
        dataset.row_count(),
        dataset.column_count(),
        path.display()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_csv() {
        let csv = "ID,Name,Value\n1,foo,100\n2,bar,200\n";
        let ds = parse_csv_str(csv, "test.csv").unwrap();

        assert_eq!(ds.column_names(), vec!["ID", "Name", "Value"]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows[0].id, 0);
        assert_eq!(ds.rows[1].id, 1);
    }

    #[test]
    fn test_parse_keeps_text() {
        let csv = "code,age\n007,42\n";
        let ds = parse_csv_str(csv, "test.csv").unwrap();

        assert_eq!(ds.rows[0].cells[0], CellValue::text("007"));
        assert_eq!(ds.rows[0].cells[1], CellValue::text("42"));
    }

    #[test]
    fn test_parse_with_empty_cells() {
        let csv = "ID,Name,Value\n1,,100\n2,bar\n";
        let ds = parse_csv_str(csv, "test.csv").unwrap();

        assert_eq!(ds.rows[0].cells[1], CellValue::Null);
        assert_eq!(ds.rows[1].cells[2], CellValue::Null);
    }

    #[test]
    fn test_parse_truncates_long_rows() {
        let csv = "a,b\n1,2,3\n";
        let ds = parse_csv_str(csv, "test.csv").unwrap();
        assert_eq!(ds.rows[0].cells.len(), 2);
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "sex\nM\nF\n").unwrap();

        let ds = parse_csv(&path).unwrap();
        assert_eq!(ds.row_count(), 2);

        let missing = parse_csv(dir.path().join("nope.csv"));
        assert!(matches!(missing, Err(Error::FileRead { .. })));
    }
}
