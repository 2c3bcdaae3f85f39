//! Label rewriting: combining entries, leading-zero normalization, find/replace

use crate::catalog::{ValueCatalog, ValueEntry};
use crate::cleaning::{rewrite_cells, ExclusionLedger};
use crate::error::{Error, Result};
use crate::table::{CellValue, Dataset};
use log::debug;
use regex::{NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Check that the selected entries can be combined under `label`
pub fn check_combinable(catalog: &ValueCatalog, label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(Error::EmptyLabel);
    }
    let selected = catalog.selected().count();
    if selected < 2 {
        return Err(Error::TooFewSelected {
            column: catalog.column.clone(),
            selected,
        });
    }
    Ok(())
}

/// Merge every selected entry into one entry labelled `label`
///
/// Rows holding any label of a combined entry are rewritten, including rows
/// held out by exclusions. An unselected entry that already holds `label` is
/// folded in as well. The new entry keeps the first combined entry's original
/// value. Returns the rewritten live cell count.
pub fn combine_labels(
    dataset: &mut Dataset,
    catalog: &mut ValueCatalog,
    held: &mut ExclusionLedger,
    label: &str,
) -> Result<usize> {
    check_combinable(catalog, label)?;
    let label = label.trim();
    let index = dataset.column_index(&catalog.column)?;

    let (combined, kept): (Vec<ValueEntry>, Vec<ValueEntry>) =
        std::mem::take(&mut catalog.entries)
            .into_iter()
            .partition(|e| {
                e.selected || e.applied_value.to_text() == label || e.current_value.to_text() == label
            });

    let new_value = CellValue::text(label);
    let rewritten = rewrite_cells(dataset, held, index, |cell| {
        if combined.iter().any(|e| e.matches_any_label(cell)) {
            *cell = new_value.clone();
            true
        } else {
            false
        }
    });

    let folded = combined.len();
    let mut members = combined.into_iter();
    let mut entry = ValueEntry::new(new_value, 0);
    if let Some(first) = members.next() {
        entry.count = first.count;
        entry.original_value = first.original_value;
        entry.merged = first.merged;
    }
    for member in members {
        entry.absorb(member);
    }
    entry.selected = true;

    catalog.entries = kept;
    catalog.entries.push(entry);
    catalog.sort_entries();
    catalog.refresh(dataset)?;

    debug!(
        "combined {} labels into '{}' in '{}', {} cells rewritten",
        folded,
        label,
        catalog.column,
        rewritten
    );
    Ok(rewritten)
}

/// Label with its leading zeros removed, or `None` if it has none to strip
///
/// Any label of two or more characters starting with `0` is stripped: `"0"`
/// stays as is, `"000"` becomes `"0"` and `"0.5"` becomes `".5"`.
pub fn strip_zeros(label: &str) -> Option<String> {
    if label.chars().count() < 2 || !label.starts_with('0') {
        return None;
    }
    let rest = label.trim_start_matches('0');
    if rest.is_empty() {
        Some("0".to_string())
    } else {
        Some(rest.to_string())
    }
}

fn stripped_label(entry: &ValueEntry) -> Option<String> {
    match &entry.current_value {
        CellValue::String(s) => strip_zeros(s),
        _ => None,
    }
}

/// Whether any textual label has leading zeros to strip
pub fn has_leading_zeros(catalog: &ValueCatalog) -> bool {
    catalog.entries.iter().any(|e| stripped_label(e).is_some())
}

/// Strip leading zeros from textual labels and merge the resulting duplicates
///
/// Returns `None` without touching anything when no label has leading zeros,
/// otherwise the number of rewritten cells.
pub fn strip_leading_zeros(
    dataset: &mut Dataset,
    catalog: &mut ValueCatalog,
    held: &mut ExclusionLedger,
) -> Result<Option<usize>> {
    let stripped: Vec<Option<String>> = catalog.entries.iter().map(stripped_label).collect();
    if stripped.iter().all(Option::is_none) {
        return Ok(None);
    }
    let index = dataset.column_index(&catalog.column)?;

    // Group entries by their final label, in catalog order
    let mut groups: Vec<(CellValue, Vec<usize>, bool)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (i, entry) in catalog.entries.iter().enumerate() {
        let is_stripped = stripped[i].is_some();
        let label = match &stripped[i] {
            Some(s) => CellValue::text(s.clone()),
            None => entry.current_value.clone(),
        };
        match positions.get(&label.to_text()) {
            Some(&pos) => {
                groups[pos].1.push(i);
                groups[pos].2 |= is_stripped;
            }
            None => {
                positions.insert(label.to_text(), groups.len());
                groups.push((label, vec![i], is_stripped));
            }
        }
    }

    let mut mapping: HashMap<String, CellValue> = HashMap::new();
    let mut merged: Vec<ValueEntry> = Vec::with_capacity(groups.len());
    for (label, members, touched) in groups {
        let first = &catalog.entries[members[0]];
        if !touched && members.len() == 1 {
            merged.push(first.clone());
            continue;
        }

        let mut entry = ValueEntry::new(label.clone(), first.count);
        entry.original_value = first.original_value.clone();
        entry.is_nan = first.is_nan;
        entry.selected = first.selected;
        entry.merged = first.merged.clone();
        for &m in &members {
            let member = &catalog.entries[m];
            if !member.applied_value.matches(&label) {
                mapping.insert(member.applied_value.to_text(), label.clone());
            }
            if m != members[0] {
                entry.absorb(member.clone());
            }
        }
        merged.push(entry);
    }

    let rewritten = rewrite_cells(dataset, held, index, |cell| {
        if cell.is_missing() {
            return false;
        }
        match mapping.get(&cell.to_text()) {
            Some(label) => {
                *cell = label.clone();
                true
            }
            None => false,
        }
    });

    catalog.entries = merged;
    catalog.sort_entries();
    catalog.refresh(dataset)?;

    debug!(
        "stripped leading zeros in '{}': {} cells rewritten, {} entries remain",
        catalog.column,
        rewritten,
        catalog.entries.len()
    );
    Ok(Some(rewritten))
}

/// A literal find/replace over catalog labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindReplace {
    pub find: String,
    pub replace: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
}

impl FindReplace {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
            case_sensitive: false,
            whole_word: false,
        }
    }

    /// Compile the pattern; `None` when there is nothing to find
    pub fn regex(&self) -> Result<Option<Regex>> {
        if self.find.is_empty() {
            return Ok(None);
        }
        let mut pattern = regex::escape(&self.find);
        if self.whole_word {
            pattern = format!(r"\b{}\b", pattern);
        }
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(!self.case_sensitive)
            .build()?;
        Ok(Some(re))
    }
}

/// One label change a find/replace would make
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    /// Original label of the affected entry
    pub original: String,
    pub from: String,
    pub to: String,
    /// Rows holding the entry
    pub count: usize,
}

/// Dry run: which labels would change and to what
pub fn preview_find_replace(catalog: &ValueCatalog, find: &FindReplace) -> Result<Vec<Replacement>> {
    let Some(re) = find.regex()? else {
        return Ok(Vec::new());
    };

    let changes = catalog
        .entries
        .iter()
        .filter(|e| !e.current_value.is_null())
        .filter_map(|e| {
            let from = e.current_value.to_text();
            let to = re.replace_all(&from, NoExpand(&find.replace)).into_owned();
            (to != from).then(|| Replacement {
                original: e.key(),
                from,
                to,
                count: e.count,
            })
        })
        .collect();
    Ok(changes)
}

/// Set the previewed labels as pending renames on the catalog
pub fn stage_replacements(catalog: &mut ValueCatalog, changes: &[Replacement]) -> Result<usize> {
    for change in changes {
        catalog.entry_mut(&change.original)?.current_value = CellValue::text(change.to.clone());
    }
    Ok(changes.len())
}
