//! Row-level cleaning driven by a column's catalog
//!
//! This module provides:
//! - Rename propagation from catalog labels to dataset cells
//! - Exclusion of rows holding unselected values, with a ledger for restoring them
//! - NaN marking, which nulls cells but keeps their rows
//!
//! Exclusion is not cumulative: every exclusion pass first restores the rows
//! the previous pass removed for that column. Restored rows are appended at the
//! end of the dataset, not at their original positions.

use crate::catalog::ValueCatalog;
use crate::error::Result;
use crate::table::{CellValue, Dataset, Row};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Rows removed by exclusion, per column
pub type ExclusionLedger = BTreeMap<String, Vec<Row>>;

/// Cells nulled by NaN marking: column -> entry (original label) -> records
pub type NullLedger = BTreeMap<String, BTreeMap<String, Vec<NullRecord>>>;

/// A cell nulled by NaN marking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullRecord {
    /// Row the cell belongs to
    pub row_id: u64,
    /// Value the cell held before it was nulled
    pub previous: CellValue,
}

/// Result of a NaN marking pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NanOutcome {
    /// Cells set to null
    pub nulled: usize,
    /// Cells given back their previous value
    pub restored: usize,
}

/// Run `rewrite` on the `index` cell of every live row and every held row
///
/// Rows held by an exclusion are rewritten too, so they agree with the
/// dataset when they come back. Returns how many live cells changed.
pub fn rewrite_cells(
    dataset: &mut Dataset,
    held: &mut ExclusionLedger,
    index: usize,
    mut rewrite: impl FnMut(&mut CellValue) -> bool,
) -> usize {
    let mut changed = 0;
    for row in &mut dataset.rows {
        if let Some(cell) = row.get_mut(index) {
            if rewrite(cell) {
                changed += 1;
            }
        }
    }
    for row in held.values_mut().flatten() {
        if let Some(cell) = row.get_mut(index) {
            rewrite(cell);
        }
    }
    changed
}

/// Write pending catalog renames into the dataset and held rows
///
/// Only selected entries that are not marked NaN are propagated. The whole
/// mapping is applied in one pass so swapped labels do not chain.
pub fn apply_renames(
    dataset: &mut Dataset,
    catalog: &mut ValueCatalog,
    held: &mut ExclusionLedger,
) -> Result<usize> {
    let index = dataset.column_index(&catalog.column)?;

    let renames = |e: &&mut crate::catalog::ValueEntry| {
        e.selected && !e.is_nan && e.has_pending_rename()
    };

    let mapping: HashMap<String, CellValue> = catalog
        .entries
        .iter_mut()
        .filter(renames)
        .map(|e| (e.applied_value.to_text(), e.current_value.clone()))
        .collect();
    if mapping.is_empty() {
        return Ok(0);
    }

    let updated = rewrite_cells(dataset, held, index, |cell| {
        if cell.is_missing() {
            return false;
        }
        match mapping.get(&cell.to_text()) {
            Some(new_value) => {
                *cell = new_value.clone();
                true
            }
            None => false,
        }
    });

    for entry in catalog.entries.iter_mut().filter(renames) {
        entry.applied_value = entry.current_value.clone();
    }

    debug!(
        "renamed {} cells across {} labels in '{}'",
        updated,
        mapping.len(),
        catalog.column
    );
    Ok(updated)
}

/// Put back every row previously excluded for `column`, appended at the end
pub fn restore_excluded(dataset: &mut Dataset, ledger: &mut ExclusionLedger, column: &str) -> usize {
    let Some(rows) = ledger.remove(column) else {
        return 0;
    };

    let restored = rows.len();
    for row in rows {
        dataset.push_existing(row);
    }
    if restored > 0 {
        debug!("restored {} excluded rows for '{}'", restored, column);
    }
    restored
}

/// Remove rows whose cell matches an unselected entry and record them
///
/// Rows excluded by the previous pass for this column are restored first, so
/// the excluded set always reflects the current selection.
pub fn exclude_rows(
    dataset: &mut Dataset,
    catalog: &ValueCatalog,
    ledger: &mut ExclusionLedger,
) -> Result<usize> {
    let index = dataset.column_index(&catalog.column)?;
    restore_excluded(dataset, ledger, &catalog.column);

    let unselected: Vec<_> = catalog.unselected().collect();
    if unselected.is_empty() {
        return Ok(0);
    }

    let positions: Vec<usize> = dataset
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            row.get(index)
                .is_some_and(|cell| unselected.iter().any(|e| e.matches_cell(cell)))
        })
        .map(|(i, _)| i)
        .collect();

    // Remove back to front so earlier positions stay valid
    let mut removed: Vec<Row> = Vec::with_capacity(positions.len());
    for &pos in positions.iter().rev() {
        removed.push(dataset.rows.remove(pos));
    }
    removed.reverse();

    let excluded = removed.len();
    if excluded > 0 {
        ledger.insert(catalog.column.clone(), removed);
    }
    debug!(
        "excluded {} rows from '{}', {} rows remain",
        excluded,
        catalog.column,
        dataset.row_count()
    );
    Ok(excluded)
}

/// Null the cells of selected NaN entries and undo nulling for the rest
///
/// Records are looked up under every key of an entry, so nulling survives
/// entries being merged. A cell is only restored if it is still null, so later
/// edits win, and it gets the entry's current label back. Records for rows
/// that are currently excluded stay in the ledger.
pub fn apply_nan(
    dataset: &mut Dataset,
    catalog: &ValueCatalog,
    ledger: &mut NullLedger,
) -> Result<NanOutcome> {
    let index = dataset.column_index(&catalog.column)?;
    let positions: HashMap<u64, usize> = dataset
        .rows
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id, i))
        .collect();

    let column_ledger = ledger.entry(catalog.column.clone()).or_default();
    let mut outcome = NanOutcome::default();

    for entry in &catalog.entries {
        let key = entry.key();

        if entry.is_nan && entry.selected {
            let records = column_ledger.entry(key).or_default();
            for row in &mut dataset.rows {
                let row_id = row.id;
                let Some(cell) = row.get_mut(index) else {
                    continue;
                };
                if !cell.is_null() && entry.matches_cell(cell) {
                    let previous = std::mem::replace(cell, CellValue::Null);
                    records.push(NullRecord { row_id, previous });
                    outcome.nulled += 1;
                }
            }
            continue;
        }

        for key in entry.keys() {
            let Some(records) = column_ledger.get_mut(&key) else {
                continue;
            };
            records.retain(|record| {
                let Some(&pos) = positions.get(&record.row_id) else {
                    return true;
                };
                if let Some(cell) = dataset.rows[pos].get_mut(index) {
                    if cell.is_null() {
                        *cell = if record.previous.is_missing() {
                            record.previous.clone()
                        } else {
                            entry.applied_value.clone()
                        };
                        outcome.restored += 1;
                    }
                }
                false
            });
        }
    }

    column_ledger.retain(|_, records| !records.is_empty());
    if column_ledger.is_empty() {
        ledger.remove(&catalog.column);
    }

    debug!(
        "NaN marking on '{}': {} nulled, {} restored",
        catalog.column, outcome.nulled, outcome.restored
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv_str;

    fn sample() -> (Dataset, ValueCatalog) {
        let ds = parse_csv_str(
            "id,status\n1,ok\n2,Unknown\n3,ok\n4,bad\n5,Unknown\n6,ok\n",
            "test.csv",
        )
        .unwrap();
        let catalog = ValueCatalog::scan(&ds, "status").unwrap();
        (ds, catalog)
    }

    fn status_values(ds: &Dataset) -> Vec<String> {
        ds.column_cells(1).map(|c| c.to_text()).collect()
    }

    #[test]
    fn test_apply_renames() {
        let (mut ds, mut catalog) = sample();
        catalog.entry_mut("ok").unwrap().current_value = CellValue::text("fine");

        let updated = apply_renames(&mut ds, &mut catalog, &mut ExclusionLedger::new()).unwrap();

        assert_eq!(updated, 3);
        assert_eq!(status_values(&ds)[0], "fine");
        assert!(!catalog.find("ok").unwrap().has_pending_rename());
        assert_eq!(apply_renames(&mut ds, &mut catalog, &mut ExclusionLedger::new()).unwrap(), 0);
    }

    #[test]
    fn test_apply_renames_swaps_without_chaining() {
        let (mut ds, mut catalog) = sample();
        catalog.entry_mut("ok").unwrap().current_value = CellValue::text("bad");
        catalog.entry_mut("bad").unwrap().current_value = CellValue::text("ok");

        apply_renames(&mut ds, &mut catalog, &mut ExclusionLedger::new()).unwrap();

        assert_eq!(
            status_values(&ds),
            vec!["bad", "Unknown", "bad", "ok", "Unknown", "bad"]
        );
    }

    #[test]
    fn test_renames_skip_unselected_and_nan() {
        let (mut ds, mut catalog) = sample();
        let entry = catalog.entry_mut("bad").unwrap();
        entry.current_value = CellValue::text("worse");
        entry.selected = false;
        let entry = catalog.entry_mut("Unknown").unwrap();
        entry.current_value = CellValue::text("?");
        entry.is_nan = true;

        assert_eq!(apply_renames(&mut ds, &mut catalog, &mut ExclusionLedger::new()).unwrap(), 0);
    }

    #[test]
    fn test_renames_reach_held_rows() {
        let (mut ds, mut catalog) = sample();
        let mut held = ExclusionLedger::new();
        held.insert("id".to_string(), vec![ds.rows.remove(0)]);
        catalog.entry_mut("ok").unwrap().current_value = CellValue::text("fine");

        let updated = apply_renames(&mut ds, &mut catalog, &mut held).unwrap();

        assert_eq!(updated, 2);
        assert_eq!(held["id"][0].cells[1], CellValue::text("fine"));
    }

    #[test]
    fn test_exclude_and_restore() {
        let (mut ds, mut catalog) = sample();
        let mut ledger = ExclusionLedger::new();
        catalog.entry_mut("Unknown").unwrap().selected = false;

        let excluded = exclude_rows(&mut ds, &catalog, &mut ledger).unwrap();
        assert_eq!(excluded, 2);
        assert_eq!(ds.row_count(), 4);
        assert_eq!(ledger["status"].len(), 2);
        assert_eq!(ledger["status"][0].id, 1);

        let restored = restore_excluded(&mut ds, &mut ledger, "status");
        assert_eq!(restored, 2);
        assert_eq!(ds.row_count(), 6);
        assert!(ledger.is_empty());

        // Restored rows land at the end
        let ids: Vec<u64> = ds.rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 2, 3, 5, 1, 4]);
    }

    #[test]
    fn test_exclusion_is_not_cumulative() {
        let (mut ds, mut catalog) = sample();
        let mut ledger = ExclusionLedger::new();

        catalog.entry_mut("Unknown").unwrap().selected = false;
        exclude_rows(&mut ds, &catalog, &mut ledger).unwrap();

        catalog.entry_mut("Unknown").unwrap().selected = true;
        catalog.entry_mut("bad").unwrap().selected = false;
        let excluded = exclude_rows(&mut ds, &catalog, &mut ledger).unwrap();

        assert_eq!(excluded, 1);
        assert_eq!(ds.row_count(), 5);
        assert_eq!(ledger["status"].len(), 1);
        assert!(status_values(&ds).iter().filter(|v| *v == "Unknown").count() == 2);
    }

    #[test]
    fn test_apply_nan_keeps_rows() {
        let (mut ds, mut catalog) = sample();
        let mut ledger = NullLedger::new();
        catalog.entry_mut("Unknown").unwrap().is_nan = true;

        let outcome = apply_nan(&mut ds, &catalog, &mut ledger).unwrap();

        assert_eq!(outcome.nulled, 2);
        assert_eq!(ds.row_count(), 6);
        assert!(ds.rows[1].cells[1].is_null());
        assert_eq!(ledger["status"]["Unknown"].len(), 2);

        catalog.refresh(&ds).unwrap();
        assert_eq!(catalog.missing_count, 2);
    }

    #[test]
    fn test_unmarking_nan_restores_only_nulled_cells() {
        let mut ds = parse_csv_str("id,status\n1,Unknown\n2,\n3,ok\n", "t.csv").unwrap();
        let mut catalog = ValueCatalog::scan(&ds, "status").unwrap();
        let mut ledger = NullLedger::new();

        catalog.entry_mut("Unknown").unwrap().is_nan = true;
        apply_nan(&mut ds, &catalog, &mut ledger).unwrap();
        assert!(ds.rows[0].cells[1].is_null());

        catalog.entry_mut("Unknown").unwrap().is_nan = false;
        let outcome = apply_nan(&mut ds, &catalog, &mut ledger).unwrap();

        assert_eq!(outcome.restored, 1);
        assert_eq!(ds.rows[0].cells[1], CellValue::text("Unknown"));
        // The originally blank cell stays missing
        assert!(ds.rows[1].cells[1].is_null());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_unmarking_nan_after_merge_restores_cells() {
        let (mut ds, mut catalog) = sample();
        let mut ledger = NullLedger::new();
        catalog.entry_mut("Unknown").unwrap().is_nan = true;
        apply_nan(&mut ds, &catalog, &mut ledger).unwrap();

        // Fold the nulled entry into "bad" the way a combine does
        let pos = catalog.entries.iter().position(|e| e.key() == "Unknown").unwrap();
        let unknown = catalog.entries.remove(pos);
        catalog.entry_mut("bad").unwrap().absorb(unknown);

        let outcome = apply_nan(&mut ds, &catalog, &mut ledger).unwrap();

        assert_eq!(outcome.restored, 2);
        assert_eq!(status_values(&ds), vec!["ok", "bad", "ok", "bad", "bad", "ok"]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_nan_records_survive_exclusion() {
        let (mut ds, mut catalog) = sample();
        let mut nulls = NullLedger::new();
        let mut excluded = ExclusionLedger::new();

        catalog.entry_mut("Unknown").unwrap().is_nan = true;
        apply_nan(&mut ds, &catalog, &mut nulls).unwrap();

        // Exclude one of the nulled rows by hand, then unmark
        let row = ds.rows.remove(1);
        excluded.insert("other".to_string(), vec![row]);
        catalog.entry_mut("Unknown").unwrap().is_nan = false;
        let outcome = apply_nan(&mut ds, &catalog, &mut nulls).unwrap();

        assert_eq!(outcome.restored, 1);
        assert_eq!(nulls["status"]["Unknown"].len(), 1);

        restore_excluded(&mut ds, &mut excluded, "other");
        let outcome = apply_nan(&mut ds, &catalog, &mut nulls).unwrap();
        assert_eq!(outcome.restored, 1);
        assert!(nulls.is_empty());
    }
}
