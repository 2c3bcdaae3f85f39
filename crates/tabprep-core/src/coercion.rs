//! Conversion of a column between categorical and continuous representation

use crate::catalog::ValueCatalog;
use crate::cleaning::{apply_nan, apply_renames, rewrite_cells, ExclusionLedger, NullLedger};
use crate::error::{Error, Result};
use crate::table::{CellValue, Dataset};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a column's values are interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// Values are labels
    #[default]
    Categorical,
    /// Values are numbers
    Continuous,
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableType::Categorical => write!(f, "categorical"),
            VariableType::Continuous => write!(f, "continuous"),
        }
    }
}

impl FromStr for VariableType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "categorical" => Ok(VariableType::Categorical),
            "continuous" => Ok(VariableType::Continuous),
            other => Err(format!("unknown variable type '{}'", other)),
        }
    }
}

/// Outcome of a coercion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionReport {
    pub column: String,
    pub to: VariableType,
    /// Cells whose representation changed
    pub converted: usize,
    /// Cells left as text because they do not parse as numbers
    pub invalid_count: usize,
}

/// Check that every selected, non-NaN label parses as a finite number
///
/// Blank labels pass since they end up null.
pub fn can_be_continuous(catalog: &ValueCatalog) -> Result<()> {
    let offending = catalog
        .selected()
        .filter(|e| !e.is_nan && !e.current_value.is_missing())
        .find(|e| e.current_value.as_number().is_none());

    match offending {
        Some(entry) => Err(Error::NotNumeric {
            column: catalog.column.clone(),
            value: entry.current_value.to_text(),
        }),
        None => Ok(()),
    }
}

/// Convert a column, applying pending renames and NaN marking first
///
/// Converting to continuous is refused with `NotNumeric` before anything is
/// touched. Parse failures during the conversion itself are only counted.
/// Rows held by an exclusion are converted as well.
pub fn coerce_column(
    dataset: &mut Dataset,
    catalog: &mut ValueCatalog,
    nulls: &mut NullLedger,
    held: &mut ExclusionLedger,
    to: VariableType,
) -> Result<CoercionReport> {
    let index = dataset.column_index(&catalog.column)?;
    if to == VariableType::Continuous {
        can_be_continuous(catalog)?;
        apply_renames(dataset, catalog, held)?;
        apply_nan(dataset, catalog, nulls)?;
    }

    let converted = rewrite_cells(dataset, held, index, |cell| match convert_cell(cell, to) {
        Some(value) => {
            *cell = value;
            true
        }
        None => false,
    });
    let invalid_count = match to {
        VariableType::Continuous => dataset
            .column_cells(index)
            .filter(|cell| matches!(cell, CellValue::String(s) if !s.trim().is_empty()))
            .count(),
        VariableType::Categorical => 0,
    };

    let report = CoercionReport {
        column: catalog.column.clone(),
        to,
        converted,
        invalid_count,
    };

    retype_labels(catalog, to);
    catalog.refresh(dataset)?;

    if report.invalid_count > 0 {
        warn!(
            "{} cells in '{}' could not be parsed as numbers and were left as text",
            report.invalid_count, catalog.column
        );
    }
    debug!(
        "coerced '{}' to {}: {} cells converted",
        catalog.column, to, report.converted
    );
    Ok(report)
}

/// New representation of a cell, or `None` if it stays as it is
fn convert_cell(cell: &CellValue, to: VariableType) -> Option<CellValue> {
    match (to, cell) {
        (_, CellValue::Null) => None,
        (VariableType::Continuous, CellValue::String(s)) if s.trim().is_empty() => {
            Some(CellValue::Null)
        }
        (VariableType::Continuous, CellValue::String(s)) => {
            CellValue::parse_number(s).map(CellValue::Number)
        }
        (VariableType::Continuous, CellValue::Number(_)) => None,
        (VariableType::Categorical, CellValue::Number(n)) => Some(CellValue::text(n.to_string())),
        (VariableType::Categorical, CellValue::String(_)) => None,
    }
}

/// Bring current and applied labels in line with the new representation
fn retype_labels(catalog: &mut ValueCatalog, to: VariableType) {
    let convert = |value: &CellValue| match (to, value) {
        (VariableType::Continuous, CellValue::String(s)) => {
            CellValue::parse_number(s).map(CellValue::Number)
        }
        (VariableType::Categorical, CellValue::Number(n)) => Some(CellValue::text(n.to_string())),
        _ => None,
    };

    for entry in &mut catalog.entries {
        if let Some(value) = convert(&entry.current_value) {
            entry.current_value = value;
        }
        if let Some(value) = convert(&entry.applied_value) {
            entry.applied_value = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv_str;

    fn setup(csv: &str) -> (Dataset, ValueCatalog) {
        let ds = parse_csv_str(csv, "t.csv").unwrap();
        let column = ds.columns[0].name.clone();
        let catalog = ValueCatalog::scan(&ds, &column).unwrap();
        (ds, catalog)
    }

    fn coerce(
        ds: &mut Dataset,
        catalog: &mut ValueCatalog,
        nulls: &mut NullLedger,
        to: VariableType,
    ) -> Result<CoercionReport> {
        coerce_column(ds, catalog, nulls, &mut ExclusionLedger::new(), to)
    }

    #[test]
    fn test_variable_type_parse_and_display() {
        assert_eq!("Continuous".parse::<VariableType>().unwrap(), VariableType::Continuous);
        assert_eq!(VariableType::default().to_string(), "categorical");
        assert!("ordinal".parse::<VariableType>().is_err());
        assert_eq!(
            serde_json::to_string(&VariableType::Continuous).unwrap(),
            r#""continuous""#
        );
    }

    #[test]
    fn test_can_be_continuous_names_offender() {
        let (_, catalog) = setup("age\n1\n2\nthree\n");
        match can_be_continuous(&catalog) {
            Err(Error::NotNumeric { value, .. }) => assert_eq!(value, "three"),
            other => panic!("expected NotNumeric, got {:?}", other),
        }
    }

    #[test]
    fn test_can_be_continuous_ignores_nan_and_unselected() {
        let (_, mut catalog) = setup("age\n1\nunknown\nn/a\n");
        catalog.entry_mut("unknown").unwrap().is_nan = true;
        catalog.entry_mut("n/a").unwrap().selected = false;
        assert!(can_be_continuous(&catalog).is_ok());
    }

    #[test]
    fn test_coerce_to_continuous_nulls_nan_first() {
        let (mut ds, mut catalog) = setup("age,id\n41,1\n7.5,2\nunknown,3\n,4\n");
        let mut nulls = NullLedger::new();
        catalog.entry_mut("unknown").unwrap().is_nan = true;

        let report = coerce(&mut ds, &mut catalog, &mut nulls, VariableType::Continuous).unwrap();

        assert_eq!(report.converted, 2);
        assert_eq!(report.invalid_count, 0);
        let cells: Vec<CellValue> = ds.column_cells(0).cloned().collect();
        assert_eq!(
            cells,
            vec![CellValue::Number(41.0), CellValue::Number(7.5), CellValue::Null, CellValue::Null]
        );
        assert!(cells[0].is_integer());
        assert_eq!(catalog.missing_count, 2);
        assert_eq!(catalog.find("41").unwrap().applied_value, CellValue::Number(41.0));
    }

    #[test]
    fn test_coerce_counts_unparseable_unselected_cells() {
        let (mut ds, mut catalog) = setup("age\n1\n2\nthree\n");
        let mut nulls = NullLedger::new();
        catalog.entry_mut("three").unwrap().selected = false;

        let report = coerce(&mut ds, &mut catalog, &mut nulls, VariableType::Continuous).unwrap();

        assert_eq!(report.converted, 2);
        assert_eq!(report.invalid_count, 1);
        assert_eq!(ds.rows[2].cells[0], CellValue::text("three"));
    }

    #[test]
    fn test_coerce_rejects_before_mutating() {
        let (mut ds, mut catalog) = setup("age\n1\nthree\n");
        let mut nulls = NullLedger::new();
        let before = ds.clone();

        let result = coerce(&mut ds, &mut catalog, &mut nulls, VariableType::Continuous);

        assert!(matches!(result, Err(Error::NotNumeric { .. })));
        assert_eq!(ds, before);
    }

    #[test]
    fn test_coerce_back_to_categorical() {
        let (mut ds, mut catalog) = setup("age,id\n3,1\n4.5,2\n,3\n");
        let mut nulls = NullLedger::new();
        coerce(&mut ds, &mut catalog, &mut nulls, VariableType::Continuous).unwrap();

        let report = coerce(&mut ds, &mut catalog, &mut nulls, VariableType::Categorical).unwrap();

        assert_eq!(report.converted, 2);
        let cells: Vec<CellValue> = ds.column_cells(0).cloned().collect();
        assert_eq!(cells, vec![CellValue::text("3"), CellValue::text("4.5"), CellValue::Null]);
        assert_eq!(catalog.find("3").unwrap().count, 1);
    }

    #[test]
    fn test_coerce_converts_held_rows() {
        let (mut ds, mut catalog) = setup("age,id\n41,1\n7.5,2\n12,3\n");
        let mut nulls = NullLedger::new();
        let mut held = ExclusionLedger::new();
        held.insert("id".to_string(), vec![ds.rows.remove(2)]);

        let report =
            coerce_column(&mut ds, &mut catalog, &mut nulls, &mut held, VariableType::Continuous)
                .unwrap();

        assert_eq!(report.converted, 2);
        assert_eq!(held["id"][0].cells[0], CellValue::Number(12.0));
    }
}
