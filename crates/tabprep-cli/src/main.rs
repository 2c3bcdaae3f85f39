//! tabprep CLI
//!
//! Command-line tool for profiling, cleaning and exporting tabular datasets.
//! Engine state and undo history live in a session file between invocations.

use clap::{Parser, Subcommand};
use log::debug;
use std::path::{Path, PathBuf};
use tabprep_core::{
    Comparison, Engine, EngineConfig, ExportFormat, FindReplace, RecalcProgress, SessionFile,
    VariableType,
};

#[derive(Parser)]
#[command(name = "tabprep")]
#[command(about = "Tabular dataset preparation", long_about = None)]
#[command(version)]
struct Cli {
    /// Session file holding the dataset, edits and history
    #[arg(short, long, global = true, default_value = "tabprep-session.json")]
    session: PathBuf,

    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a session from a CSV file
    Init {
        /// Path to CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Engine config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum undo snapshots
        #[arg(long)]
        history_limit: Option<usize>,
    },

    /// Show columns, or the value catalog of one column
    Profile {
        /// Column to profile
        #[arg(short, long)]
        column: Option<String>,

        /// Only show values containing this text
        #[arg(long)]
        search: Option<String>,

        /// Maximum number of values to display
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Select or deselect values of a column
    Select {
        column: String,

        /// Values (original labels) to change
        #[arg(long = "value")]
        values: Vec<String>,

        /// Deselect instead of select
        #[arg(long)]
        off: bool,

        /// Select every value
        #[arg(long, conflicts_with_all = ["none", "values"])]
        all: bool,

        /// Deselect every value
        #[arg(long, conflicts_with = "values")]
        none: bool,
    },

    /// Rename a value (applied on save)
    Rename {
        column: String,

        /// Original label
        value: String,

        /// New label
        #[arg(long)]
        to: String,
    },

    /// Reset every label of a column to its original value
    ResetNames { column: String },

    /// Flag values as missing (applied on save)
    MarkNan {
        column: String,

        /// Values (original labels) to flag
        values: Vec<String>,

        /// Remove the flag instead
        #[arg(long)]
        clear: bool,

        /// Flag every selected value and apply immediately
        #[arg(long, conflicts_with = "values")]
        selected: bool,
    },

    /// Apply renames, NaN flags and exclusions of a column
    Save { column: String },

    /// Put back rows excluded for a column
    Restore { column: String },

    /// Combine the selected values of a column into one label
    Combine {
        column: String,

        /// New label
        #[arg(long)]
        label: String,
    },

    /// Strip leading zeros from a column's labels
    StripZeros { column: String },

    /// Find and replace text in a column's labels
    FindReplace {
        column: String,

        #[arg(long)]
        find: String,

        #[arg(long, default_value = "")]
        replace: String,

        #[arg(long)]
        case_sensitive: bool,

        #[arg(long)]
        whole_word: bool,

        /// Show the changes without applying them
        #[arg(long)]
        preview: bool,
    },

    /// Convert a column between categorical and continuous
    SetType {
        column: String,

        /// categorical or continuous
        #[arg(value_name = "TYPE")]
        to: VariableType,
    },

    /// Create a binary feature from a threshold rule
    AddRule {
        variable: String,

        /// One of > >= < <= == !=
        #[arg(allow_hyphen_values = true)]
        operator: Comparison,

        #[arg(allow_hyphen_values = true)]
        threshold: String,

        /// Feature column name
        #[arg(long)]
        name: String,
    },

    /// Create a feature coalescing two columns
    AddCombined {
        column_a: String,
        column_b: String,

        /// Feature column name
        #[arg(long)]
        name: String,
    },

    /// Remove a feature and its column
    RemoveFeature { name: String },

    /// List engineered features
    Features,

    /// Recompute every engineered feature
    Recalc,

    /// Undo the last edit
    Undo,

    /// Redo the last undone edit
    Redo,

    /// Show undo history
    History,

    /// Export the dataset
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Output format (csv or json)
        #[arg(long, default_value = "csv")]
        format: String,

        /// Also write column types as JSON to this path
        #[arg(long)]
        types: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> tabprep_core::Result<()> {
    let session = cli.session;

    match cli.command {
        Commands::Init {
            file,
            config,
            history_limit,
        } => cmd_init(&session, &file, config.as_deref(), history_limit),
        Commands::Profile {
            column,
            search,
            limit,
        } => with_engine(&session, false, |engine| {
            cmd_profile(engine, column.as_deref(), search.as_deref(), limit)
        }),
        Commands::Select {
            column,
            values,
            off,
            all,
            none,
        } => with_engine(&session, true, |engine| cmd_select(engine, &column, &values, off, all, none)),
        Commands::Rename { column, value, to } => with_engine(&session, true, |engine| {
            engine.rename_value(&column, &value, &to)?;
            println!("'{}' in '{}' will be saved as '{}'", value, column, to.trim());
            Ok(())
        }),
        Commands::ResetNames { column } => with_engine(&session, true, |engine| {
            engine.reset_names(&column)?;
            println!("Labels of '{}' reset", column);
            Ok(())
        }),
        Commands::MarkNan {
            column,
            values,
            clear,
            selected,
        } => with_engine(&session, true, |engine| cmd_mark_nan(engine, &column, &values, clear, selected)),
        Commands::Save { column } => with_engine(&session, true, |engine| cmd_save(engine, &column)),
        Commands::Restore { column } => with_engine(&session, true, |engine| {
            let restored = engine.restore_excluded(&column)?;
            println!("Restored {} rows for '{}'", restored, column);
            Ok(())
        }),
        Commands::Combine { column, label } => with_engine(&session, true, |engine| {
            let rewritten = engine.combine_labels(&column, &label)?;
            println!("Combined into '{}': {} cells rewritten", label.trim(), rewritten);
            Ok(())
        }),
        Commands::StripZeros { column } => with_engine(&session, true, |engine| {
            match engine.strip_leading_zeros(&column)? {
                Some(rewritten) => println!("Stripped leading zeros: {} cells rewritten", rewritten),
                None => println!("No labels with leading zeros in '{}'", column),
            }
            Ok(())
        }),
        Commands::FindReplace {
            column,
            find,
            replace,
            case_sensitive,
            whole_word,
            preview,
        } => {
            let find = FindReplace {
                find,
                replace,
                case_sensitive,
                whole_word,
            };
            with_engine(&session, !preview, |engine| cmd_find_replace(engine, &column, &find, preview))
        }
        Commands::SetType { column, to } => with_engine(&session, true, |engine| {
            let report = engine.set_variable_type(&column, to)?;
            println!("'{}' is now {}: {} cells converted", column, to, report.converted);
            if report.invalid_count > 0 {
                println!("  {} cells could not be parsed and were kept as text", report.invalid_count);
            }
            Ok(())
        }),
        Commands::AddRule {
            variable,
            operator,
            threshold,
            name,
        } => with_engine(&session, true, |engine| {
            let feature = engine.add_rule_feature(&variable, operator, &threshold, &name)?;
            println!("Created feature '{}': {}", feature.name(), feature.describe());
            Ok(())
        }),
        Commands::AddCombined {
            column_a,
            column_b,
            name,
        } => with_engine(&session, true, |engine| {
            let feature = engine.add_combined_feature(&column_a, &column_b, &name)?;
            println!("Created feature '{}': {}", feature.name(), feature.describe());
            Ok(())
        }),
        Commands::RemoveFeature { name } => with_engine(&session, true, |engine| {
            engine.remove_feature(&name)?;
            println!("Removed feature '{}'", name);
            Ok(())
        }),
        Commands::Features => with_engine(&session, false, |engine| {
            println!("Features ({}):", engine.features().len());
            for feature in engine.features() {
                println!("  {}: {}", feature.name(), feature.describe());
            }
            Ok(())
        }),
        Commands::Recalc => with_engine(&session, true, cmd_recalc),
        Commands::Undo => with_engine(&session, true, |engine| {
            if engine.undo() {
                println!("Undone");
            } else {
                println!("Nothing to undo");
            }
            Ok(())
        }),
        Commands::Redo => with_engine(&session, true, |engine| {
            if engine.redo() {
                println!("Redone");
            } else {
                println!("Nothing to redo");
            }
            Ok(())
        }),
        Commands::History => with_engine(&session, false, cmd_history),
        Commands::Export {
            output,
            format,
            types,
        } => with_engine(&session, false, |engine| cmd_export(engine, &output, &format, types.as_deref())),
    }
}

/// Load the session, run `f`, and write the session back if `save` is set
fn with_engine<F>(session: &Path, save: bool, f: F) -> tabprep_core::Result<()>
where
    F: FnOnce(&mut Engine) -> tabprep_core::Result<()>,
{
    let mut engine = Engine::from_session(SessionFile::load(session)?);
    engine.drain_events();

    f(&mut engine)?;

    for event in engine.drain_events() {
        debug!("{:?}", event);
    }
    if save {
        engine.into_session().save(session)?;
    }
    Ok(())
}

fn cmd_init(
    session: &Path,
    file: &Path,
    config: Option<&Path>,
    history_limit: Option<usize>,
) -> tabprep_core::Result<()> {
    let mut config = match config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(limit) = history_limit {
        config.history_limit = limit;
    }

    let engine = Engine::from_csv(file, config)?;
    println!("File: {}", file.display());
    println!("Columns: {}", engine.dataset().column_count());
    println!("Rows: {}", engine.dataset().row_count());

    engine.into_session().save(session)?;
    println!("Session written to {}", session.display());
    Ok(())
}

fn cmd_profile(
    engine: &mut Engine,
    column: Option<&str>,
    search: Option<&str>,
    limit: Option<usize>,
) -> tabprep_core::Result<()> {
    let Some(column) = column else {
        println!("Rows: {}", engine.dataset().row_count());
        println!();
        let names: Vec<String> = engine.dataset().column_names().iter().map(|s| s.to_string()).collect();
        for name in names {
            let stats = engine.catalog_stats(&name)?;
            println!(
                "  {} [{}] {} unique, {} missing",
                name,
                engine.variable_type(&name),
                stats.unique,
                stats.missing
            );
        }
        return Ok(());
    };

    let stats = engine.catalog_stats(column)?;
    println!("Column: {} [{}]", column, engine.variable_type(column));
    println!("Rows: {}  Unique: {}  Missing: {}", stats.total, stats.unique, stats.missing);
    println!();
    println!("sel\tnan\tcount\tvalue");
    println!("{}", "-".repeat(40));

    let entries = match search {
        Some(term) => engine.search_catalog(column, term)?,
        None => engine.catalog(column)?.entries.iter().collect(),
    };
    let row_limit = limit.unwrap_or(entries.len());
    for entry in entries.iter().take(row_limit) {
        let label = if entry.has_pending_rename() {
            format!("{} -> {}", entry.original_value, entry.current_value)
        } else {
            entry.current_value.to_string()
        };
        println!(
            "{}\t{}\t{}\t{}",
            if entry.selected { "x" } else { "" },
            if entry.is_nan { "x" } else { "" },
            entry.count,
            label
        );
    }
    if entries.len() > row_limit {
        println!("... ({} more values)", entries.len() - row_limit);
    }
    Ok(())
}

fn cmd_select(
    engine: &mut Engine,
    column: &str,
    values: &[String],
    off: bool,
    all: bool,
    none: bool,
) -> tabprep_core::Result<()> {
    if all {
        engine.select_all(column)?;
        println!("Selected every value of '{}'", column);
    } else if none {
        engine.deselect_all(column)?;
        println!("Deselected every value of '{}'", column);
    } else {
        for value in values {
            engine.set_selection(column, value, !off)?;
        }
        println!("{} {} value(s) of '{}'", if off { "Deselected" } else { "Selected" }, values.len(), column);
    }
    Ok(())
}

fn cmd_mark_nan(
    engine: &mut Engine,
    column: &str,
    values: &[String],
    clear: bool,
    selected: bool,
) -> tabprep_core::Result<()> {
    if selected {
        let outcome = engine.mark_selected_as_nan(column)?;
        println!("Marked selected values of '{}' as NaN: {} cells nulled", column, outcome.nulled);
        return Ok(());
    }
    for value in values {
        engine.set_nan_flag(column, value, !clear)?;
    }
    println!(
        "{} NaN flag on {} value(s) of '{}'; run save to apply",
        if clear { "Cleared" } else { "Set" },
        values.len(),
        column
    );
    Ok(())
}

fn cmd_save(engine: &mut Engine, column: &str) -> tabprep_core::Result<()> {
    let report = engine.save_column(column)?;
    println!("Saved '{}':", column);
    println!("  {} cells renamed", report.renamed);
    println!("  {} cells set to NaN, {} restored", report.nulled, report.unnulled);
    println!("  {} rows excluded, {} restored", report.excluded, report.restored);
    println!("  {} rows remain", engine.dataset().row_count());
    Ok(())
}

fn cmd_find_replace(
    engine: &mut Engine,
    column: &str,
    find: &FindReplace,
    preview: bool,
) -> tabprep_core::Result<()> {
    let changes = if preview {
        engine.preview_find_replace(column, find)?
    } else {
        engine.apply_find_replace(column, find)?
    };

    if changes.is_empty() {
        println!("No labels match '{}'", find.find);
        return Ok(());
    }
    println!("{} label(s) {}:", changes.len(), if preview { "would change" } else { "changed" });
    for change in &changes {
        println!("  {} -> {} ({} rows)", change.from, change.to, change.count);
    }
    Ok(())
}

fn cmd_recalc(engine: &mut Engine) -> tabprep_core::Result<()> {
    let mut task = engine.recalc_task();
    loop {
        match engine.recalc_step(&mut task)? {
            RecalcProgress::Pending { done, total } => println!("  {}/{} features", done, total),
            RecalcProgress::Complete { total } => {
                println!("Recalculated {} features, {} cells changed", total, task.changed());
                return Ok(());
            }
        }
    }
}

fn cmd_history(engine: &mut Engine) -> tabprep_core::Result<()> {
    let history = engine.history();
    println!("Snapshots ({} of at most {}):", history.len(), history.limit());
    for (i, snapshot) in history.snapshots().iter().enumerate() {
        let marker = if i == history.pointer() { " <-- current" } else { "" };
        println!(
            "  {}. {} ({} rows){}",
            i + 1,
            snapshot.timestamp.format("%Y-%m-%d %H:%M:%S"),
            snapshot.state.dataset.row_count(),
            marker
        );
    }
    if history.is_dirty() {
        println!("  (unsaved edits since the current snapshot)");
    }
    println!();
    println!("Undo: {}  Redo: {}", engine.can_undo(), engine.can_redo());
    Ok(())
}

fn cmd_export(engine: &mut Engine, output: &Path, format: &str, types: Option<&Path>) -> tabprep_core::Result<()> {
    let format: ExportFormat = format.parse()?;
    let export = engine.export();
    export.save(output, format)?;

    if let Some(path) = types {
        export.save_types(path)?;
        println!("Wrote column types to {}", path.display());
    }

    println!("Exported {} rows to {}", export.rows.len(), output.display());
    Ok(())
}
