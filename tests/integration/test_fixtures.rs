//! Fixture and bundled data tests
//!
//! Verifies that the configuration and exercise fixtures parse, and that every
//! exercise shipped in `data/queries.json` runs against the bundled sample
//! dataset.

use std::path::PathBuf;

use sqltutor_engine::{Config, ExerciseBank, QueryExecutor, SqliteExecutor, Tier};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Path to the data directory at the workspace root.
fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("data")
}

fn sample_executor() -> SqliteExecutor {
    let script = std::fs::read_to_string(data_dir().join("sample_database.sql"))
        .expect("Failed to read sample dataset");
    SqliteExecutor::from_script(&script).expect("Sample dataset script failed")
}

#[test]
fn test_config_fixture_loads() {
    let config = Config::load_from_dir(&fixtures_dir()).expect("Failed to load config fixture");

    assert_eq!(config.database, "practice.db");
    assert_eq!(config.exercises, "queries.json");
    assert_eq!(config.display_rows, 5);
    assert!(!config.advisor.enabled);
    assert_eq!(config.advisor.timeout_seconds, 10);
    assert_eq!(config.embedding.dimension, 128);
}

#[test]
fn test_missing_config_uses_defaults() {
    let dir = data_dir();
    let config = Config::load_from_dir(&dir).expect("Defaults should validate");
    assert_eq!(config.display_rows, 10);
    assert_eq!(config.exercises, "data/queries.json");
}

#[test]
fn test_exercise_fixture_loads() {
    let bank =
        ExerciseBank::load(fixtures_dir().join("queries.json")).expect("Failed to load fixture");

    assert_eq!(bank.len(Tier::Beginner), 2);
    assert_eq!(bank.len(Tier::Intermediate), 1);
    assert_eq!(bank.len(Tier::Advanced), 0);
    assert_eq!(
        bank.get(Tier::Beginner, "b1").and_then(|e| e.static_hint()),
        Some("You only need the id column.")
    );
}

#[test]
fn test_bundled_exercises_run_against_sample_dataset() {
    let bank = ExerciseBank::load(data_dir().join("queries.json"))
        .expect("Failed to load bundled exercises");
    let executor = sample_executor();

    for tier in Tier::ALL {
        assert!(bank.len(tier) > 0, "tier {tier} has no exercises");

        for exercise in bank.exercises(tier) {
            let result = executor.execute(&exercise.solution);
            assert!(
                result.success,
                "{} solution failed: {:?}",
                exercise.id, result.error
            );
            assert!(
                result.row_count() > 0,
                "{} solution returned no rows",
                exercise.id
            );
            assert!(!exercise.concepts.is_empty(), "{} has no concepts", exercise.id);
        }
    }
}

#[test]
fn test_sample_dataset_schema() {
    let executor = sample_executor();
    let tables = executor.tables().expect("Failed to describe tables");

    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["customers", "order_items", "orders", "products"]);
    assert_eq!(executor.table_names(), names);

    let products = tables
        .iter()
        .find(|t| t.name == "products")
        .expect("products table missing");
    assert_eq!(products.row_count, 10);

    let stock = products
        .columns
        .iter()
        .find(|c| c.name == "stock")
        .expect("stock column missing");
    assert_eq!(stock.data_type, "INTEGER");
    assert_eq!(stock.constraints(), vec!["NOT NULL", "DEFAULT 0"]);

    let id = &products.columns[0];
    assert_eq!(id.constraints(), vec!["PRIMARY KEY"]);
}
