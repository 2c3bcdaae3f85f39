use tabprep_core::{CellValue, Comparison, Engine, EngineConfig, Row};

const VISITS: &str = "id,sex,code,age
1,M,007,41
2,F,07,
3,Male,7,35
4,U,7,nan
5,M,010,22
6,F,10,67
7,,7,30
8,M,001,19
";

fn engine() -> Engine {
    let dataset = tabprep_core::parse_csv_str(VISITS, "visits.csv").unwrap();
    Engine::from_dataset(dataset, EngineConfig::default())
}

fn cells(engine: &Engine, name: &str) -> Vec<CellValue> {
    let index = engine.dataset().column_index(name).unwrap();
    engine.dataset().column_cells(index).cloned().collect()
}

fn sorted_rows(engine: &Engine) -> Vec<Row> {
    let mut rows = engine.dataset().rows.clone();
    rows.sort_by_key(|r| r.id);
    rows
}

/// Selected counts add up to the rows holding a selected label
fn assert_counts_consistent(engine: &mut Engine, column: &str) {
    let values = cells(engine, column);
    let catalog = engine.catalog(column).unwrap();
    let selected: Vec<_> = catalog.entries.iter().filter(|e| e.selected).collect();

    let counted: usize = selected.iter().map(|e| e.count).sum();
    let matching = values
        .iter()
        .filter(|c| !c.is_missing() && selected.iter().any(|e| c.matches(&e.current_value)))
        .count();
    assert_eq!(counted, matching, "counts drifted for '{}'", column);
}

#[test]
fn test_catalog_counts_follow_committed_edits() {
    let mut engine = engine();

    engine.rename_value("sex", "Male", "M").unwrap();
    engine.set_selection("sex", "U", false).unwrap();
    engine.save_column("sex").unwrap();
    assert_counts_consistent(&mut engine, "sex");

    engine.strip_leading_zeros("code").unwrap();
    assert_counts_consistent(&mut engine, "code");
    assert_counts_consistent(&mut engine, "sex");

    engine.select_all("sex").unwrap();
    engine.set_selection("sex", "F", false).unwrap();
    engine.save_column("sex").unwrap();
    assert_counts_consistent(&mut engine, "sex");
    assert_counts_consistent(&mut engine, "code");

    engine.restore_excluded("sex").unwrap();
    assert_counts_consistent(&mut engine, "sex");
}

#[test]
fn test_undo_then_redo_restores_dataset() {
    let mut engine = engine();

    engine.set_selection("sex", "U", false).unwrap();
    engine.save_column("sex").unwrap();
    engine.strip_leading_zeros("code").unwrap();
    engine
        .add_rule_feature("age", Comparison::Ge, "30", "older")
        .unwrap();

    for _ in 0..3 {
        let before = engine.dataset().clone();
        assert!(engine.undo());
        assert_ne!(engine.dataset(), &before);
        assert!(engine.redo());
        assert_eq!(engine.dataset(), &before);
        assert!(engine.undo());
    }
    assert!(engine.can_redo());
}

#[test]
fn test_exclude_then_restore_keeps_row_multiset() {
    let mut engine = engine();
    let before = sorted_rows(&engine);

    engine.set_selection("sex", "M", false).unwrap();
    engine.set_selection("sex", "U", false).unwrap();
    let report = engine.save_column("sex").unwrap();
    assert_eq!(report.excluded, 4);
    assert_eq!(engine.dataset().row_count(), 4);

    assert_eq!(engine.restore_excluded("sex").unwrap(), 4);
    assert_eq!(sorted_rows(&engine), before);

    // Restored rows go to the end
    let ids: Vec<u64> = engine.dataset().rows.iter().map(|r| r.id).collect();
    assert_eq!(&ids[..4], &[1, 2, 5, 6]);
}

#[test]
fn test_repeated_saves_do_not_accumulate_exclusions() {
    let mut engine = engine();

    engine.set_selection("sex", "U", false).unwrap();
    engine.save_column("sex").unwrap();
    engine.save_column("sex").unwrap();
    assert_eq!(engine.dataset().row_count(), 7);

    engine.set_selection("sex", "U", true).unwrap();
    engine.set_selection("sex", "F", false).unwrap();
    let report = engine.save_column("sex").unwrap();
    assert_eq!(report.restored, 1);
    assert_eq!(report.excluded, 2);
    assert_eq!(engine.dataset().row_count(), 6);
}

#[test]
fn test_leading_zero_strip_is_idempotent() {
    let mut engine = engine();

    assert!(engine.strip_leading_zeros("code").unwrap().is_some());
    let once = engine.catalog("code").unwrap().clone();
    let dataset = engine.dataset().clone();

    assert_eq!(engine.strip_leading_zeros("code").unwrap(), None);
    assert_eq!(engine.catalog("code").unwrap(), &once);
    assert_eq!(engine.dataset(), &dataset);
}

#[test]
fn test_continuous_guard_tracks_selected_labels() {
    let cases: &[(&[&str], &[&str], &[&str], bool)] = &[
        // labels, deselected, flagged NaN, allowed
        (&["1", "2", "3.5"], &[], &[], true),
        (&["1", "2", "three"], &[], &[], false),
        (&["1", "2", "three"], &["three"], &[], true),
        (&["1", "unknown", "2"], &[], &["unknown"], true),
        (&["-4", "1e3", "x1"], &[], &[], false),
        (&["abc", "def"], &["abc"], &[], false),
    ];

    for (labels, deselected, flagged, allowed) in cases {
        let rows = labels
            .iter()
            .enumerate()
            .map(|(i, l)| vec![CellValue::Number(i as f64), CellValue::text(*l)]);
        let mut engine = Engine::load(["id", "value"], rows, EngineConfig::default());
        for label in *deselected {
            engine.set_selection("value", label, false).unwrap();
        }
        for label in *flagged {
            engine.set_nan_flag("value", label, true).unwrap();
        }

        assert_eq!(
            engine.can_be_continuous("value").is_ok(),
            *allowed,
            "labels {:?}",
            labels
        );
    }
}

#[test]
fn test_rule_features_never_zero_for_missing_source() {
    let mut engine = engine();
    let age = cells(&engine, "age");

    for (op, name) in [(Comparison::Gt, "gt"), (Comparison::Le, "le"), (Comparison::Ne, "ne")] {
        engine.add_rule_feature("age", op, "30", name).unwrap();
        let derived = cells(&engine, name);
        for (source, value) in age.iter().zip(&derived) {
            let missing = source.is_null() || source.to_text().eq_ignore_ascii_case("nan");
            assert_eq!(value.is_null(), missing, "{} on {:?}", name, source);
        }
    }

    // Nulling a source value later propagates to the feature
    engine.set_nan_flag("age", "41", true).unwrap();
    engine.save_column("age").unwrap();
    assert!(cells(&engine, "gt")[0].is_null());
}
