//! Per-column catalogs of distinct values
//!
//! A catalog is re-derivable from the dataset at any time, but it also carries
//! the user's pending edits (renames, selection, NaN flags). Refreshing takes
//! counts from a fresh scan and edit state from the existing catalog.

use crate::error::{Error, Result};
use crate::table::{CellValue, Dataset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label of an explicit catalog entry that absorbs the missing-cell count
pub const MISSING_LABEL: &str = "Missing/NaN";

/// One distinct value of a column with its edit state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueEntry {
    /// Value as first captured for this column; never changes afterwards
    pub original_value: CellValue,
    /// Label shown to the user, reflecting renames
    pub current_value: CellValue,
    /// Label the dataset cells currently hold for this entry
    pub applied_value: CellValue,
    /// Number of live rows holding this entry
    pub count: usize,
    /// Whether rows with this value are kept
    pub selected: bool,
    /// Whether this value is marked as missing
    pub is_nan: bool,
    /// Original labels of entries folded into this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged: Vec<String>,
}

impl ValueEntry {
    /// Create a selected entry for a freshly scanned value
    pub fn new(value: CellValue, count: usize) -> Self {
        Self {
            original_value: value.clone(),
            current_value: value.clone(),
            applied_value: value,
            count,
            selected: true,
            is_nan: false,
            merged: Vec::new(),
        }
    }

    /// Entries with no live rows are logically excluded
    pub fn is_excluded(&self) -> bool {
        self.count == 0
    }

    /// Whether the label differs from what the dataset holds
    pub fn has_pending_rename(&self) -> bool {
        !self.current_value.matches(&self.applied_value)
    }

    /// Whether this entry is the explicit Missing/NaN label, which also owns
    /// the column's missing cells
    pub fn absorbs_missing(&self) -> bool {
        self.applied_value.to_text() == MISSING_LABEL
    }

    /// Whether a cell belongs to this entry
    ///
    /// Pending renames are ignored: they may collide with another entry's label.
    pub fn matches_cell(&self, cell: &CellValue) -> bool {
        if cell.is_missing() {
            return self.absorbs_missing();
        }
        cell.matches(&self.applied_value) || cell.matches(&self.original_value)
    }

    /// Whether a cell holds any label this entry has carried, pending or not
    pub fn matches_any_label(&self, cell: &CellValue) -> bool {
        self.matches_cell(cell) || (!cell.is_missing() && cell.matches(&self.current_value))
    }

    /// Key used to look an entry up from the outside
    pub fn key(&self) -> String {
        self.original_value.to_text()
    }

    /// Keys of this entry and of every entry folded into it
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.key()).chain(self.merged.iter().cloned())
    }

    /// Fold another entry into this one
    ///
    /// Counts add up and the result is selected if either side was.
    pub fn absorb(&mut self, other: ValueEntry) {
        self.count += other.count;
        self.selected |= other.selected;
        self.merged.push(other.key());
        self.merged.extend(other.merged);
    }
}

/// Display summary of a catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    /// Rows scanned
    pub total: usize,
    /// Entries with live rows
    pub unique: usize,
    /// Null or blank cells
    pub missing: usize,
}

/// Distinct values of one column, sorted by count descending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCatalog {
    /// Column this catalog describes
    pub column: String,
    /// Entries, count descending, ties in first-encountered order
    pub entries: Vec<ValueEntry>,
    /// Null or blank cells in the column
    pub missing_count: usize,
    /// Rows scanned
    pub total: usize,
}

impl ValueCatalog {
    /// Scan a column once and group its non-missing cells by textual form
    pub fn scan(dataset: &Dataset, column: &str) -> Result<Self> {
        let index = dataset.column_index(column)?;

        let mut order: Vec<ValueEntry> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut missing_count = 0;

        for cell in dataset.column_cells(index) {
            if cell.is_missing() {
                missing_count += 1;
                continue;
            }
            let key = cell.to_text();
            match positions.get(&key) {
                Some(&pos) => order[pos].count += 1,
                None => {
                    positions.insert(key, order.len());
                    order.push(ValueEntry::new(cell.clone(), 1));
                }
            }
        }
        if let Some(&pos) = positions.get(MISSING_LABEL) {
            order[pos].count += missing_count;
        }

        let mut catalog = Self {
            column: column.to_string(),
            entries: order,
            missing_count,
            total: dataset.row_count(),
        };
        catalog.sort_entries();
        Ok(catalog)
    }

    /// Rescan the dataset and merge the result onto this catalog
    pub fn refresh(&mut self, dataset: &Dataset) -> Result<()> {
        let fresh = Self::scan(dataset, &self.column)?;
        self.merge_scan(fresh);
        Ok(())
    }

    /// Merge a fresh scan: counts come from the scan, edit state from `self`
    ///
    /// Entries are matched on the label the dataset holds for them, and entries
    /// holding the same label are folded together first. Entries missing from
    /// the scan drop to a count of zero; new values are appended.
    pub fn merge_scan(&mut self, fresh: ValueCatalog) {
        self.fold_duplicates();

        let mut counts: HashMap<String, (usize, CellValue)> = fresh
            .entries
            .into_iter()
            .map(|e| (e.applied_value.to_text(), (e.count, e.applied_value)))
            .collect();

        for entry in &mut self.entries {
            entry.count = match counts.remove(&entry.applied_value.to_text()) {
                Some((count, _)) => count,
                None if entry.absorbs_missing() => fresh.missing_count,
                None => 0,
            };
        }

        // Values that appeared since the last refresh, e.g. restored rows
        let mut added: Vec<(String, (usize, CellValue))> = counts.into_iter().collect();
        added.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, (count, value)) in added {
            self.entries.push(ValueEntry::new(value, count));
        }

        self.missing_count = fresh.missing_count;
        self.total = fresh.total;
        self.sort_entries();
    }

    /// Fold entries that hold the same applied label into the first of them
    fn fold_duplicates(&mut self) {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut kept: Vec<ValueEntry> = Vec::with_capacity(self.entries.len());
        for entry in std::mem::take(&mut self.entries) {
            let label = entry.applied_value.to_text();
            match positions.get(&label) {
                Some(&pos) => kept[pos].absorb(entry),
                None => {
                    positions.insert(label, kept.len());
                    kept.push(entry);
                }
            }
        }
        self.entries = kept;
    }

    /// Stable sort by count descending
    pub fn sort_entries(&mut self) {
        self.entries.sort_by(|a, b| b.count.cmp(&a.count));
    }

    /// Find an entry by its original label
    pub fn find(&self, original: &str) -> Option<&ValueEntry> {
        self.entries.iter().find(|e| e.key() == original)
    }

    /// Find an entry by its original label, or `ValueNotFound`
    pub fn entry_mut(&mut self, original: &str) -> Result<&mut ValueEntry> {
        let column = self.column.clone();
        self.entries
            .iter_mut()
            .find(|e| e.key() == original)
            .ok_or_else(|| Error::ValueNotFound {
                column,
                value: original.to_string(),
            })
    }

    /// Selected entries
    pub fn selected(&self) -> impl Iterator<Item = &ValueEntry> + '_ {
        self.entries.iter().filter(|e| e.selected)
    }

    /// Unselected entries
    pub fn unselected(&self) -> impl Iterator<Item = &ValueEntry> + '_ {
        self.entries.iter().filter(|e| !e.selected)
    }

    /// Sum of counts over selected entries
    pub fn selected_total(&self) -> usize {
        self.selected().map(|e| e.count).sum()
    }

    /// Case-insensitive substring search over current and original labels
    pub fn search(&self, term: &str) -> Vec<&ValueEntry> {
        let term = term.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                e.current_value.to_text().to_lowercase().contains(&term)
                    || e.original_value.to_text().to_lowercase().contains(&term)
            })
            .collect()
    }

    /// Summary counts for display
    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            total: self.total,
            unique: self.entries.iter().filter(|e| !e.is_excluded()).count(),
            missing: self.missing_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv_str;

    fn sample() -> Dataset {
        parse_csv_str("id,sex\n1,M\n2,F\n3,M\n4,\n5,F\n6,M\n7,U\n", "test.csv").unwrap()
    }

    #[test]
    fn test_scan_counts_and_order() {
        let catalog = ValueCatalog::scan(&sample(), "sex").unwrap();

        let labels: Vec<String> = catalog.entries.iter().map(|e| e.key()).collect();
        assert_eq!(labels, vec!["M", "F", "U"]);
        assert_eq!(catalog.entries[0].count, 3);
        assert_eq!(catalog.missing_count, 1);
        assert_eq!(catalog.total, 7);
        assert!(catalog.entries.iter().all(|e| e.selected && !e.is_nan));
    }

    #[test]
    fn test_scan_ties_keep_first_encountered() {
        let ds = parse_csv_str("code\nb\na\nc\n", "t.csv").unwrap();
        let catalog = ValueCatalog::scan(&ds, "code").unwrap();
        let labels: Vec<String> = catalog.entries.iter().map(|e| e.key()).collect();
        assert_eq!(labels, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_scan_unknown_column() {
        assert!(matches!(
            ValueCatalog::scan(&sample(), "age"),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_refresh_keeps_edit_state() {
        let mut ds = sample();
        let mut catalog = ValueCatalog::scan(&ds, "sex").unwrap();
        catalog.entry_mut("M").unwrap().current_value = CellValue::text("Male");
        catalog.entry_mut("U").unwrap().selected = false;

        // Drop the U row and one M row
        ds.rows.retain(|r| r.id != 6 && r.id != 0);
        catalog.refresh(&ds).unwrap();

        let m = catalog.find("M").unwrap();
        assert_eq!(m.count, 2);
        assert_eq!(m.current_value, CellValue::text("Male"));
        let u = catalog.find("U").unwrap();
        assert!(u.is_excluded());
        assert!(!u.selected);
    }

    #[test]
    fn test_refresh_appends_new_values() {
        let mut ds = sample();
        let mut catalog = ValueCatalog::scan(&ds, "sex").unwrap();
        ds.push_row(vec![CellValue::text("8"), CellValue::text("X")]);
        catalog.refresh(&ds).unwrap();
        assert_eq!(catalog.find("X").unwrap().count, 1);
        assert_eq!(catalog.total, 8);
    }

    #[test]
    fn test_missing_label_absorbs_missing_count() {
        let ds = sample();
        let mut catalog = ValueCatalog::scan(&ds, "sex").unwrap();
        catalog
            .entries
            .push(ValueEntry::new(CellValue::text(MISSING_LABEL), 0));
        catalog.refresh(&ds).unwrap();
        assert_eq!(catalog.find(MISSING_LABEL).unwrap().count, 1);
    }

    #[test]
    fn test_literal_missing_label_is_stable_across_refreshes() {
        let ds = parse_csv_str(
            "id,c\n1,Missing/NaN\n2,Missing/NaN\n3,Missing/NaN\n4,\n5,x\n",
            "t.csv",
        )
        .unwrap();
        let mut catalog = ValueCatalog::scan(&ds, "c").unwrap();
        assert_eq!(catalog.find(MISSING_LABEL).unwrap().count, 4);

        for _ in 0..4 {
            catalog.refresh(&ds).unwrap();
            assert_eq!(catalog.entries.len(), 2);
            assert_eq!(catalog.selected_total(), 5);
        }
        assert_eq!(catalog.find(MISSING_LABEL).unwrap().count, 4);
        assert_eq!(catalog.missing_count, 1);
        assert!(catalog.find(MISSING_LABEL).unwrap().matches_cell(&CellValue::Null));
        assert!(!catalog.find("x").unwrap().matches_cell(&CellValue::Null));
    }

    #[test]
    fn test_refresh_folds_entries_sharing_a_label() {
        let mut ds = sample();
        let mut catalog = ValueCatalog::scan(&ds, "sex").unwrap();
        catalog.entry_mut("M").unwrap().selected = false;

        // U cells renamed onto the M label
        for row in &mut ds.rows {
            if row.cells[1] == CellValue::text("U") {
                row.cells[1] = CellValue::text("M");
            }
        }
        catalog.entry_mut("U").unwrap().applied_value = CellValue::text("M");
        catalog.refresh(&ds).unwrap();

        assert_eq!(catalog.entries.len(), 2);
        let m = catalog.find("M").unwrap();
        assert_eq!(m.count, 4);
        assert!(m.selected);
        assert_eq!(m.merged, vec!["U".to_string()]);
        assert_eq!(catalog.selected_total(), 6);
    }

    #[test]
    fn test_search_and_stats() {
        let mut catalog = ValueCatalog::scan(&sample(), "sex").unwrap();
        catalog.entry_mut("F").unwrap().current_value = CellValue::text("Female");

        let hits: Vec<String> = catalog.search("fem").iter().map(|e| e.key()).collect();
        assert_eq!(hits, vec!["F"]);

        let stats = catalog.stats();
        assert_eq!(stats.unique, 3);
        assert_eq!(stats.missing, 1);
        assert_eq!(catalog.selected_total(), 6);
    }
}
