//! The dataset-preparation engine
//!
//! `Engine` owns the dataset and everything derived from it. Every mutation
//! goes through a named method. Catalog edits (selection, renames, NaN flags)
//! only change catalog state; committed operations rewrite the dataset and
//! take exactly one history checkpoint before mutating, after all validation
//! has passed. A failed operation leaves state and history untouched.

use crate::catalog::{CatalogStats, ValueCatalog, ValueEntry};
use crate::cleaning::{self, NanOutcome};
use crate::coercion::{can_be_continuous, coerce_column, CoercionReport, VariableType};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventQueue};
use crate::features::{combined, rule_based, write_feature, Comparison, FeatureDefinition, RecalcProgress, RecalcTask};
use crate::history::History;
use crate::labels::{self, FindReplace, Replacement};
use crate::parser::parse_csv;
use crate::state::{EngineState, ExportedDataset, SessionFile};
use crate::table::{CellValue, Dataset};
use log::{debug, info};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

/// Outcome of saving a column's catalog edits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub column: String,
    /// Cells rewritten by renames
    pub renamed: usize,
    /// Cells nulled by NaN marking
    pub nulled: usize,
    /// Cells given back their value after NaN unmarking
    pub unnulled: usize,
    /// Rows currently excluded for this column
    pub excluded: usize,
    /// Rows put back from the previous exclusion
    pub restored: usize,
}

/// Interactive dataset-preparation engine
#[derive(Debug)]
pub struct Engine {
    state: EngineState,
    history: History<EngineState>,
    config: EngineConfig,
    events: EventQueue,
}

impl Engine {
    /// Create an engine over the given columns and rows
    pub fn load<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = Vec<CellValue>>,
        config: EngineConfig,
    ) -> Self {
        Self::from_dataset(Dataset::from_records(columns, rows), config)
    }

    /// Create an engine from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        Ok(Self::from_dataset(parse_csv(path)?, config))
    }

    /// Create an engine over a dataset
    ///
    /// A non-empty dataset gets an initial snapshot so the first undo has a
    /// state to return to.
    pub fn from_dataset(dataset: Dataset, config: EngineConfig) -> Self {
        let config = config.normalized();
        let mut engine = Self {
            state: EngineState::new(dataset),
            history: History::new(config.history_limit),
            config,
            events: EventQueue::new(),
        };
        if !engine.state.dataset.is_empty() {
            engine.history.checkpoint(&engine.state);
        }
        info!(
            "loaded {} rows x {} columns",
            engine.state.dataset.row_count(),
            engine.state.dataset.column_count()
        );
        engine.events.emit(EngineEvent::DatasetChanged);
        engine.events.emit(EngineEvent::HistoryChanged);
        engine
    }

    /// Resume from a saved session
    pub fn from_session(session: SessionFile) -> Self {
        let config = session.config.normalized();
        let mut history = session.history;
        history.set_limit(config.history_limit);
        let mut engine = Self {
            state: session.state,
            history,
            config,
            events: EventQueue::new(),
        };
        engine.events.emit(EngineEvent::DatasetChanged);
        engine.events.emit(EngineEvent::HistoryChanged);
        engine
    }

    /// Copy of the complete session
    pub fn to_session(&self) -> SessionFile {
        SessionFile {
            config: self.config.clone(),
            state: self.state.clone(),
            history: self.history.clone(),
        }
    }

    pub fn into_session(self) -> SessionFile {
        SessionFile {
            config: self.config,
            state: self.state,
            history: self.history,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.state.dataset
    }

    /// Complete resumable state
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &History<EngineState> {
        &self.history
    }

    pub fn features(&self) -> &[FeatureDefinition] {
        &self.state.features
    }

    pub fn variable_type(&self, column: &str) -> VariableType {
        self.state.variable_type(column)
    }

    /// Copy of the dataset with every column's type
    pub fn export(&self) -> ExportedDataset {
        ExportedDataset::from_state(&self.state)
    }

    /// Take the events queued since the last call
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain()
    }

    // --- catalogs -------------------------------------------------------

    /// Catalog of a column with counts refreshed from the dataset
    pub fn catalog(&mut self, column: &str) -> Result<&ValueCatalog> {
        let EngineState {
            dataset, catalogs, ..
        } = &mut self.state;
        let catalog = catalog_entry(catalogs, dataset, column)?;
        catalog.refresh(dataset)?;
        Ok(catalog)
    }

    pub fn catalog_stats(&mut self, column: &str) -> Result<CatalogStats> {
        Ok(self.catalog(column)?.stats())
    }

    /// Entries whose current or original label contains `term`, ignoring case
    pub fn search_catalog(&mut self, column: &str, term: &str) -> Result<Vec<&ValueEntry>> {
        Ok(self.catalog(column)?.search(term))
    }

    pub fn set_selection(&mut self, column: &str, original: &str, selected: bool) -> Result<()> {
        self.edit_entry(column, original, |entry| entry.selected = selected)
    }

    pub fn select_all(&mut self, column: &str) -> Result<()> {
        self.edit_catalog(column, |catalog| {
            catalog.entries.iter_mut().for_each(|e| e.selected = true);
            Ok(())
        })
    }

    pub fn deselect_all(&mut self, column: &str) -> Result<()> {
        self.edit_catalog(column, |catalog| {
            catalog.entries.iter_mut().for_each(|e| e.selected = false);
            Ok(())
        })
    }

    /// Set the label of an entry; the dataset changes when the column is saved
    pub fn rename_value(&mut self, column: &str, original: &str, label: &str) -> Result<()> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::EmptyLabel);
        }
        let value = match (self.variable_type(column), CellValue::parse_number(label)) {
            (VariableType::Continuous, Some(n)) => CellValue::Number(n),
            _ => CellValue::text(label),
        };
        self.edit_entry(column, original, |entry| entry.current_value = value)
    }

    pub fn set_nan_flag(&mut self, column: &str, original: &str, is_nan: bool) -> Result<()> {
        self.edit_entry(column, original, |entry| entry.is_nan = is_nan)
    }

    /// Put every label of a column back to its original value
    pub fn reset_names(&mut self, column: &str) -> Result<()> {
        self.edit_catalog(column, |catalog| {
            for entry in &mut catalog.entries {
                entry.current_value = entry.original_value.clone();
            }
            Ok(())
        })
    }

    /// Labels a find/replace would change, without changing anything
    pub fn preview_find_replace(&mut self, column: &str, find: &FindReplace) -> Result<Vec<Replacement>> {
        labels::preview_find_replace(self.catalog(column)?, find)
    }

    /// Whether the column may become continuous; names the first offending label
    pub fn can_be_continuous(&mut self, column: &str) -> Result<()> {
        can_be_continuous(self.catalog(column)?)
    }

    fn edit_entry(&mut self, column: &str, original: &str, edit: impl FnOnce(&mut ValueEntry)) -> Result<()> {
        self.edit_catalog(column, |catalog| {
            edit(catalog.entry_mut(original)?);
            Ok(())
        })
    }

    fn edit_catalog(&mut self, column: &str, edit: impl FnOnce(&mut ValueCatalog) -> Result<()>) -> Result<()> {
        let EngineState {
            dataset, catalogs, ..
        } = &mut self.state;
        edit(catalog_entry(catalogs, dataset, column)?)?;

        self.history.mark_dirty();
        self.events.emit(EngineEvent::CatalogChanged {
            column: column.to_string(),
        });
        self.events.emit(EngineEvent::HistoryChanged);
        Ok(())
    }

    // --- committed operations ---------------------------------------------

    /// Commit a column's catalog edits to the dataset
    ///
    /// Restores the rows of the previous exclusion, applies renames, applies
    /// NaN marking, then excludes rows of unselected entries.
    pub fn save_column(&mut self, column: &str) -> Result<SaveReport> {
        self.require_column("save", column)?;
        self.history.checkpoint(&self.state);

        let EngineState {
            dataset,
            catalogs,
            excluded,
            nulled,
            ..
        } = &mut self.state;
        let catalog = catalog_entry(catalogs, dataset, column)?;

        let restored = cleaning::restore_excluded(dataset, excluded, column);
        let renamed = cleaning::apply_renames(dataset, catalog, excluded)?;
        let nan = cleaning::apply_nan(dataset, catalog, nulled)?;
        let excluded_rows = cleaning::exclude_rows(dataset, catalog, excluded)?;
        catalog.refresh(dataset)?;

        let report = SaveReport {
            column: column.to_string(),
            renamed,
            nulled: nan.nulled,
            unnulled: nan.restored,
            excluded: excluded_rows,
            restored,
        };
        info!(
            "saved '{}': {} renamed, {} nulled, {} excluded, {} rows remain",
            column,
            renamed,
            nan.nulled,
            excluded_rows,
            self.state.dataset.row_count()
        );
        self.committed(column, restored > 0 || excluded_rows > 0)?;
        Ok(report)
    }

    /// Apply the column's NaN flags without touching renames or exclusion
    pub fn apply_nan(&mut self, column: &str) -> Result<NanOutcome> {
        self.require_column("NaN marking", column)?;
        self.history.checkpoint(&self.state);

        let outcome = self.run_nan(column)?;
        info!("applied NaN marking to '{}': {} cells nulled", column, outcome.nulled);
        self.committed(column, false)?;
        Ok(outcome)
    }

    /// Flag every selected entry as NaN and apply the marking
    pub fn mark_selected_as_nan(&mut self, column: &str) -> Result<NanOutcome> {
        self.require_column("NaN marking", column)?;
        self.history.checkpoint(&self.state);

        {
            let EngineState {
                dataset, catalogs, ..
            } = &mut self.state;
            let catalog = catalog_entry(catalogs, dataset, column)?;
            catalog
                .entries
                .iter_mut()
                .filter(|e| e.selected)
                .for_each(|e| e.is_nan = true);
        }
        let outcome = self.run_nan(column)?;
        info!("marked selected values of '{}' as NaN: {} cells nulled", column, outcome.nulled);
        self.committed(column, false)?;
        Ok(outcome)
    }

    /// Put back every row excluded for a column and select all its entries
    ///
    /// Restored rows are appended after the current rows.
    pub fn restore_excluded(&mut self, column: &str) -> Result<usize> {
        self.require_column("restore", column)?;
        if self.state.excluded.get(column).map_or(true, Vec::is_empty) {
            return Ok(0);
        }
        self.history.checkpoint(&self.state);

        let EngineState {
            dataset,
            catalogs,
            excluded,
            ..
        } = &mut self.state;
        let restored = cleaning::restore_excluded(dataset, excluded, column);
        let catalog = catalog_entry(catalogs, dataset, column)?;
        catalog.entries.iter_mut().for_each(|e| e.selected = true);
        catalog.refresh(dataset)?;

        info!("restored {} excluded rows for '{}'", restored, column);
        self.committed(column, true)?;
        Ok(restored)
    }

    /// Merge the selected entries of a column into one label
    pub fn combine_labels(&mut self, column: &str, label: &str) -> Result<usize> {
        self.require_column("combine", column)?;
        labels::check_combinable(self.catalog(column)?, label)?;
        self.history.checkpoint(&self.state);

        let EngineState {
            dataset,
            catalogs,
            excluded,
            ..
        } = &mut self.state;
        let catalog = catalog_entry(catalogs, dataset, column)?;
        let rewritten = labels::combine_labels(dataset, catalog, excluded, label)?;

        info!("combined labels of '{}' into '{}'", column, label.trim());
        self.committed(column, false)?;
        Ok(rewritten)
    }

    /// Strip leading zeros from the column's labels; `None` if nothing matched
    pub fn strip_leading_zeros(&mut self, column: &str) -> Result<Option<usize>> {
        self.require_column("leading-zero strip", column)?;
        if !labels::has_leading_zeros(self.catalog(column)?) {
            debug!("no leading zeros in '{}'", column);
            return Ok(None);
        }
        self.history.checkpoint(&self.state);

        let EngineState {
            dataset,
            catalogs,
            excluded,
            ..
        } = &mut self.state;
        let catalog = catalog_entry(catalogs, dataset, column)?;
        let rewritten = labels::strip_leading_zeros(dataset, catalog, excluded)?;

        info!("stripped leading zeros in '{}'", column);
        self.committed(column, false)?;
        Ok(rewritten)
    }

    /// Apply a find/replace to the column's labels and commit the renames
    ///
    /// Returns the changes made; no match is a no-op.
    pub fn apply_find_replace(&mut self, column: &str, find: &FindReplace) -> Result<Vec<Replacement>> {
        self.require_column("find/replace", column)?;
        let changes = self.preview_find_replace(column, find)?;
        if changes.is_empty() {
            return Ok(changes);
        }
        self.history.checkpoint(&self.state);

        let EngineState {
            dataset,
            catalogs,
            excluded,
            ..
        } = &mut self.state;
        let catalog = catalog_entry(catalogs, dataset, column)?;
        labels::stage_replacements(catalog, &changes)?;
        let renamed = cleaning::apply_renames(dataset, catalog, excluded)?;
        catalog.refresh(dataset)?;

        info!(
            "find/replace on '{}': {} labels changed, {} cells rewritten",
            column,
            changes.len(),
            renamed
        );
        self.committed(column, false)?;
        Ok(changes)
    }

    /// Convert a column between categorical and continuous
    ///
    /// Converting to continuous applies pending renames and NaN marking first
    /// and is refused if a selected, non-NaN label is not numeric.
    pub fn set_variable_type(&mut self, column: &str, to: VariableType) -> Result<CoercionReport> {
        self.require_column("type change", column)?;
        if to == VariableType::Continuous {
            self.can_be_continuous(column)?;
        }
        self.history.checkpoint(&self.state);

        let EngineState {
            dataset,
            catalogs,
            types,
            excluded,
            nulled,
            ..
        } = &mut self.state;
        let catalog = catalog_entry(catalogs, dataset, column)?;
        let report = coerce_column(dataset, catalog, nulled, excluded, to)?;
        types.insert(column.to_string(), to);

        info!(
            "set '{}' to {}: {} converted, {} invalid",
            column, to, report.converted, report.invalid_count
        );
        self.events.emit(EngineEvent::TypeChanged {
            column: column.to_string(),
        });
        self.committed(column, false)?;
        Ok(report)
    }

    // --- features -----------------------------------------------------------

    /// Create a threshold feature; `threshold` is the raw user input
    pub fn add_rule_feature(
        &mut self,
        variable: &str,
        operator: Comparison,
        threshold: &str,
        name: &str,
    ) -> Result<&FeatureDefinition> {
        self.require_rows("feature creation")?;
        let feature = rule_based(&self.state.dataset, variable, operator, threshold, name)?;
        self.add_feature(feature)
    }

    /// Create a feature coalescing two columns
    pub fn add_combined_feature(&mut self, column_a: &str, column_b: &str, name: &str) -> Result<&FeatureDefinition> {
        self.require_rows("feature creation")?;
        let feature = combined(&self.state.dataset, column_a, column_b, name)?;
        self.add_feature(feature)
    }

    fn add_feature(&mut self, feature: FeatureDefinition) -> Result<&FeatureDefinition> {
        self.history.checkpoint(&self.state);
        write_feature(&mut self.state.dataset, &feature)?;
        info!("created feature '{}' ({})", feature.name(), feature.describe());
        self.state.features.push(feature);

        self.history.mark_dirty();
        self.emit_data_events();
        self.events.emit(EngineEvent::FeaturesChanged);

        let index = self.state.features.len() - 1;
        Ok(&self.state.features[index])
    }

    /// Drop a feature and its derived column
    pub fn remove_feature(&mut self, name: &str) -> Result<()> {
        let position = self
            .state
            .features
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| Error::FeatureNotFound(name.to_string()))?;
        if let Some(dependent) = self.state.features.iter().find(|f| f.depends_on(name)) {
            return Err(Error::FeatureInUse {
                name: name.to_string(),
                dependent: dependent.name().to_string(),
            });
        }
        self.history.checkpoint(&self.state);

        let EngineState {
            dataset,
            catalogs,
            types,
            excluded,
            nulled,
            features,
        } = &mut self.state;
        features.remove(position);
        cleaning::restore_excluded(dataset, excluded, name);
        let index = dataset.remove_column(name)?;
        for row in excluded.values_mut().flatten() {
            if index < row.cells.len() {
                row.cells.remove(index);
            }
        }
        nulled.remove(name);
        catalogs.remove(name);
        types.remove(name);

        info!("removed feature '{}'", name);
        self.history.mark_dirty();
        self.emit_data_events();
        self.events.emit(EngineEvent::FeaturesChanged);
        Ok(())
    }

    /// A task recomputing every feature, one batch per step
    pub fn recalc_task(&self) -> RecalcTask {
        RecalcTask::new(self.config.feature_batch_size)
    }

    /// Run the next batch of a recalculation task
    pub fn recalc_step(&mut self, task: &mut RecalcTask) -> Result<RecalcProgress> {
        let before = task.changed();
        let EngineState {
            dataset, features, ..
        } = &mut self.state;
        let progress = task.step(dataset, features)?;

        if task.changed() > before {
            self.history.mark_dirty();
            self.emit_data_events();
        }
        if let RecalcProgress::Complete { total } = progress {
            debug!("recalculated {} features, {} cells changed", total, task.changed());
            self.events.emit(EngineEvent::FeaturesChanged);
        }
        Ok(progress)
    }

    /// Recompute every feature in one go
    pub fn recalculate_features(&mut self) -> Result<usize> {
        let mut task = self.recalc_task();
        loop {
            if let RecalcProgress::Complete { .. } = self.recalc_step(&mut task)? {
                return Ok(task.changed());
            }
        }
    }

    // --- history ------------------------------------------------------------

    /// Return to the previous snapshot; false at the oldest one
    pub fn undo(&mut self) -> bool {
        match self.history.undo(&self.state) {
            Some(state) => {
                self.restore(state);
                info!("undo: at snapshot {} of {}", self.history.pointer() + 1, self.history.len());
                true
            }
            None => false,
        }
    }

    /// Return to the next snapshot; false at the newest one
    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(state) => {
                self.restore(state);
                info!("redo: at snapshot {} of {}", self.history.pointer() + 1, self.history.len());
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn restore(&mut self, state: EngineState) {
        self.state = state;
        self.emit_data_events();
        self.events.emit(EngineEvent::FeaturesChanged);
        let columns: Vec<String> = self.state.catalogs.keys().cloned().collect();
        for column in columns {
            self.events.emit(EngineEvent::TypeChanged { column: column.clone() });
            self.events.emit(EngineEvent::CatalogChanged { column });
        }
    }

    // --- helpers ------------------------------------------------------------

    fn require_rows(&self, operation: &str) -> Result<()> {
        if self.state.dataset.is_empty() {
            return Err(Error::DataUnavailable(operation.to_string()));
        }
        Ok(())
    }

    fn require_column(&self, operation: &str, column: &str) -> Result<()> {
        self.require_rows(operation)?;
        self.state.dataset.column_index(column).map(|_| ())
    }

    fn run_nan(&mut self, column: &str) -> Result<NanOutcome> {
        let EngineState {
            dataset,
            catalogs,
            nulled,
            ..
        } = &mut self.state;
        let catalog = catalog_entry(catalogs, dataset, column)?;
        let outcome = cleaning::apply_nan(dataset, catalog, nulled)?;
        catalog.refresh(dataset)?;
        Ok(outcome)
    }

    /// Bookkeeping after a committed edit of `column`
    ///
    /// Features derived from the column are recomputed, transitively. When rows
    /// were added or removed every feature is recomputed.
    fn committed(&mut self, column: &str, rows_moved: bool) -> Result<()> {
        let EngineState {
            dataset, features, ..
        } = &mut self.state;
        let mut changed = vec![column.to_string()];
        let mut recomputed = 0;
        for feature in features.iter() {
            if rows_moved || feature.sources().iter().any(|s| changed.iter().any(|c| c == s)) {
                write_feature(dataset, feature)?;
                changed.push(feature.name().to_string());
                recomputed += 1;
            }
        }
        if recomputed > 0 {
            debug!("recomputed {} features after editing '{}'", recomputed, column);
            self.events.emit(EngineEvent::FeaturesChanged);
        }

        self.history.mark_dirty();
        self.emit_data_events();
        self.events.emit(EngineEvent::CatalogChanged {
            column: column.to_string(),
        });
        Ok(())
    }

    fn emit_data_events(&mut self) {
        self.events.emit(EngineEvent::DatasetChanged);
        self.events.emit(EngineEvent::HistoryChanged);
    }
}

/// Catalog of `column`, scanning the dataset the first time it is asked for
fn catalog_entry<'a>(
    catalogs: &'a mut BTreeMap<String, ValueCatalog>,
    dataset: &Dataset,
    column: &str,
) -> Result<&'a mut ValueCatalog> {
    match catalogs.entry(column.to_string()) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => Ok(entry.insert(ValueCatalog::scan(dataset, column)?)),
    }
}
