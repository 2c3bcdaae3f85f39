//! Engineered features derived from dataset columns
//!
//! Two kinds of feature exist:
//! - Rule-based: a binary column from comparing a numeric column to a threshold
//! - Combined: a column coalescing two source columns that never disagree
//!
//! A missing source value never becomes a comparison outcome: rule-based
//! features are null wherever the source is missing or not a number.

use crate::error::{Error, Result};
use crate::table::{CellValue, Dataset};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Threshold comparison of a rule-based feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparison {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }

    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Ge => value >= threshold,
            Comparison::Lt => value < threshold,
            Comparison::Le => value <= threshold,
            Comparison::Eq => value == threshold,
            Comparison::Ne => value != threshold,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Comparison::Gt),
            ">=" => Ok(Comparison::Ge),
            "<" => Ok(Comparison::Lt),
            "<=" => Ok(Comparison::Le),
            "==" | "=" => Ok(Comparison::Eq),
            "!=" => Ok(Comparison::Ne),
            other => Err(format!("unknown comparison operator '{}'", other)),
        }
    }
}

/// Definition of an engineered feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureDefinition {
    RuleBased {
        name: String,
        variable: String,
        operator: Comparison,
        threshold: f64,
        created_at: DateTime<Utc>,
    },
    Combined {
        name: String,
        column_a: String,
        column_b: String,
        created_at: DateTime<Utc>,
    },
}

impl FeatureDefinition {
    /// Name of the derived column
    pub fn name(&self) -> &str {
        match self {
            FeatureDefinition::RuleBased { name, .. } | FeatureDefinition::Combined { name, .. } => name,
        }
    }

    /// Columns the feature is computed from
    pub fn sources(&self) -> Vec<&str> {
        match self {
            FeatureDefinition::RuleBased { variable, .. } => vec![variable.as_str()],
            FeatureDefinition::Combined {
                column_a, column_b, ..
            } => vec![column_a.as_str(), column_b.as_str()],
        }
    }

    pub fn depends_on(&self, column: &str) -> bool {
        self.sources().contains(&column)
    }

    /// Compute the derived value of every row, in row order
    pub fn evaluate(&self, dataset: &Dataset) -> Result<Vec<CellValue>> {
        match self {
            FeatureDefinition::RuleBased {
                variable,
                operator,
                threshold,
                ..
            } => {
                let index = dataset.column_index(variable)?;
                Ok(dataset
                    .column_cells(index)
                    .map(|cell| rule_outcome(cell, *operator, *threshold))
                    .collect())
            }
            FeatureDefinition::Combined {
                column_a, column_b, ..
            } => {
                let a = dataset.column_index(column_a)?;
                let b = dataset.column_index(column_b)?;
                Ok(dataset
                    .column_cells(a)
                    .zip(dataset.column_cells(b))
                    .map(|(a, b)| coalesce(a, b))
                    .collect())
            }
        }
    }

    /// Short human-readable form, e.g. `age > 30`
    pub fn describe(&self) -> String {
        match self {
            FeatureDefinition::RuleBased {
                variable,
                operator,
                threshold,
                ..
            } => format!("{} {} {}", variable, operator, threshold),
            FeatureDefinition::Combined {
                column_a, column_b, ..
            } => format!("{} + {}", column_a, column_b),
        }
    }
}

/// Null, blank, or the text "nan"
pub fn is_missing_value(cell: &CellValue) -> bool {
    match cell {
        CellValue::String(s) => s.trim().is_empty() || s.trim().eq_ignore_ascii_case("nan"),
        other => other.is_missing(),
    }
}

fn source_number(cell: &CellValue) -> Option<f64> {
    if is_missing_value(cell) {
        None
    } else {
        cell.as_number()
    }
}

fn rule_outcome(cell: &CellValue, operator: Comparison, threshold: f64) -> CellValue {
    match source_number(cell) {
        Some(value) if operator.holds(value, threshold) => CellValue::Number(1.0),
        Some(_) => CellValue::Number(0.0),
        None => CellValue::Null,
    }
}

fn coalesce(a: &CellValue, b: &CellValue) -> CellValue {
    match (is_missing_value(a), is_missing_value(b)) {
        (false, _) => a.clone(),
        (true, false) => b.clone(),
        (true, true) => CellValue::Null,
    }
}

fn check_name(dataset: &Dataset, name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::EmptyLabel);
    }
    if dataset.find_column(name).is_some() {
        return Err(Error::DuplicateColumn(name.to_string()));
    }
    Ok(name.to_string())
}

/// Validate a threshold rule and build its definition
///
/// Rejects a threshold that is not a number, a source column with no numeric
/// values, and a rule that gives the same outcome for every valid row.
pub fn rule_based(
    dataset: &Dataset,
    variable: &str,
    operator: Comparison,
    threshold: &str,
    name: &str,
) -> Result<FeatureDefinition> {
    let threshold_value = CellValue::parse_number(threshold)
        .ok_or_else(|| Error::InvalidThreshold(threshold.trim().to_string()))?;
    let name = check_name(dataset, name)?;
    let index = dataset.column_index(variable)?;

    let (valid, passing) = dataset
        .column_cells(index)
        .filter_map(source_number)
        .fold((0usize, 0usize), |(valid, passing), value| {
            let hit = operator.holds(value, threshold_value) as usize;
            (valid + 1, passing + hit)
        });

    if valid == 0 {
        return Err(Error::NoValidValues(variable.to_string()));
    }
    if passing == 0 || passing == valid {
        return Err(Error::ConstantFeature {
            variable: variable.to_string(),
            valid,
            outcome: u8::from(passing == valid),
        });
    }

    debug!(
        "rule {} {} {} holds for {} of {} valid rows",
        variable, operator, threshold_value, passing, valid
    );
    Ok(FeatureDefinition::RuleBased {
        name,
        variable: variable.to_string(),
        operator,
        threshold: threshold_value,
        created_at: Utc::now(),
    })
}

/// Validate a column combination and build its definition
///
/// Any row where both sources hold different present values rejects it.
pub fn combined(dataset: &Dataset, column_a: &str, column_b: &str, name: &str) -> Result<FeatureDefinition> {
    if column_a == column_b {
        return Err(Error::SameColumn(column_a.to_string()));
    }
    let name = check_name(dataset, name)?;
    let a = dataset.column_index(column_a)?;
    let b = dataset.column_index(column_b)?;

    let conflicts = dataset
        .column_cells(a)
        .zip(dataset.column_cells(b))
        .filter(|(a, b)| !is_missing_value(a) && !is_missing_value(b) && a.to_text() != b.to_text())
        .count();
    if conflicts > 0 {
        return Err(Error::CombineConflict {
            column_a: column_a.to_string(),
            column_b: column_b.to_string(),
            conflicts,
        });
    }

    Ok(FeatureDefinition::Combined {
        name,
        column_a: column_a.to_string(),
        column_b: column_b.to_string(),
        created_at: Utc::now(),
    })
}

/// Evaluate a feature and write it into its column, adding the column if needed
///
/// Returns the number of cells whose value changed.
pub fn write_feature(dataset: &mut Dataset, feature: &FeatureDefinition) -> Result<usize> {
    let values = feature.evaluate(dataset)?;
    let index = match dataset.find_column(feature.name()) {
        Some(column) => column.index,
        None => dataset.add_column(feature.name())?,
    };

    let mut changed = 0;
    for (row, value) in dataset.rows.iter_mut().zip(values) {
        if let Some(cell) = row.get_mut(index) {
            if *cell != value {
                *cell = value;
                changed += 1;
            }
        }
    }
    Ok(changed)
}

/// Progress of a cooperative recalculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalcProgress {
    /// More batches remain
    Pending { done: usize, total: usize },
    /// Every feature has been recomputed
    Complete { total: usize },
}

/// Recomputes features a bounded batch at a time
///
/// Each call to `step` recomputes the next batch and returns, so a host can
/// interleave other work between batches. Stopping early leaves every feature
/// either fully recomputed or untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecalcTask {
    next: usize,
    batch_size: usize,
    changed: usize,
}

impl RecalcTask {
    pub fn new(batch_size: usize) -> Self {
        Self {
            next: 0,
            batch_size: batch_size.max(1),
            changed: 0,
        }
    }

    /// Cells changed by the batches run so far
    pub fn changed(&self) -> usize {
        self.changed
    }

    /// Recompute the next batch of `features`
    pub fn step(&mut self, dataset: &mut Dataset, features: &[FeatureDefinition]) -> Result<RecalcProgress> {
        let total = features.len();
        let end = (self.next + self.batch_size).min(total);
        for feature in &features[self.next.min(end)..end] {
            self.changed += write_feature(dataset, feature)?;
        }
        self.next = end;

        if end >= total {
            Ok(RecalcProgress::Complete { total })
        } else {
            Ok(RecalcProgress::Pending { done: end, total })
        }
    }

    /// Run every remaining batch
    pub fn run(&mut self, dataset: &mut Dataset, features: &[FeatureDefinition]) -> Result<usize> {
        loop {
            if let RecalcProgress::Complete { total } = self.step(dataset, features)? {
                return Ok(total);
            }
        }
    }
}
