//! Tests for the dirty state
//!
//! These tests verify:
//! - Decode anomalies mark the database dirty and yield best-effort values
//! - Writes are blocked while dirty, reads are not
//! - The DIRTY flag reaches the file header
//! - Structural header damage is detected on open

use std::path::PathBuf;

use l2db::format::{Header, HEADER_SIZE};
use l2db::{Config, Database, L2dbError, OpenMode, Source, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_db() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dirty.l2db");
    (temp_dir, path)
}

/// A serialized database whose "flag" entry holds the byte 0x02
fn corrupted_bool_db() -> Vec<u8> {
    let mut db = Database::open(
        Source::entries([("name", Value::from("l2db")), ("flag", Value::Bool(true))]),
        Config::default(),
    )
    .unwrap();
    let entry = db.entry("flag").unwrap().unwrap();
    let mut bytes = db.to_bytes().unwrap();

    let offset = HEADER_SIZE + db.header().index_len as usize + entry.start as usize;
    bytes[offset] = 0x02;
    bytes
}

fn header_of(path: &PathBuf) -> Header {
    Header::decode(&std::fs::read(path).unwrap(), true).unwrap()
}

// =============================================================================
// Anomaly Tests
// =============================================================================

#[test]
fn test_malformed_bool_marks_dirty() {
    let mut db = Database::open(corrupted_bool_db(), Config::default()).unwrap();
    assert!(!db.is_dirty());

    assert_eq!(db.get("flag").unwrap(), Value::Bool(true));
    assert!(db.is_dirty());

    // Reads keep working, writes don't
    assert_eq!(db.get("name").unwrap(), Value::from("l2db"));
    assert!(matches!(db.set("other", 1i64), Err(L2dbError::Dirty)));
    assert!(matches!(db.delete("name"), Err(L2dbError::Dirty)));
}

#[test]
fn test_dump_marks_dirty() {
    let mut db = Database::open(corrupted_bool_db(), Config::default()).unwrap();

    let dump = db.dump().unwrap();

    assert_eq!(dump.get("flag"), Some(&Value::Bool(true)));
    assert_eq!(dump.len(), 2);
    assert!(db.is_dirty());
}

#[test]
fn test_dump_leaves_bytes_unchanged() {
    let original = corrupted_bool_db();
    let mut db = Database::open(original.clone(), Config::default()).unwrap();

    db.dump().unwrap();
    let after = db.to_bytes().unwrap();

    // Only the flag byte differs
    assert_eq!(after.len(), original.len());
    assert_eq!(&after[HEADER_SIZE..], &original[HEADER_SIZE..]);
    assert!(Header::decode(&after, true).unwrap().is_dirty());
}

#[test]
fn test_dirty_flag_persisted() {
    for mode in [OpenMode::read_write(), OpenMode::read_write().unbuffered()] {
        let (_temp, path) = setup_temp_db();
        std::fs::write(&path, corrupted_bool_db()).unwrap();
        let config = Config::builder().mode(mode).build();

        let mut db = Database::open(path.clone(), config.clone()).unwrap();
        db.get("flag").unwrap();
        db.close().unwrap();

        assert!(header_of(&path).is_dirty());

        // A dirty header opens straight into the dirty state
        let mut db = Database::open(path.clone(), config).unwrap();
        assert!(db.is_dirty());
        assert!(matches!(db.set("k", "v"), Err(L2dbError::Dirty)));
    }
}

#[test]
fn test_read_only_session_leaves_file_alone() {
    let (_temp, path) = setup_temp_db();
    let bytes = corrupted_bool_db();
    std::fs::write(&path, &bytes).unwrap();

    let config = Config::builder().mode(OpenMode::read_only()).build();
    let mut db = Database::open(path.clone(), config).unwrap();
    db.get("flag").unwrap();
    assert!(db.is_dirty());
    drop(db);

    assert_eq!(std::fs::read(&path).unwrap(), bytes);
}

#[test]
fn test_nan_write_marks_dirty() {
    let mut db = Database::open(Source::entries([("x", 1i64)]), Config::default()).unwrap();

    db.set("nan", f64::NAN).unwrap();

    assert!(db.is_dirty());
    assert_eq!(db.entry("nan").unwrap().unwrap().value_len(), 0);
    match db.get("nan").unwrap() {
        Value::Float(f) => assert!(f.is_nan()),
        other => panic!("expected a float, got {:?}", other),
    }
    assert!(matches!(db.set("y", 2i64), Err(L2dbError::Dirty)));
}

// =============================================================================
// Structural Damage Tests
// =============================================================================

#[test]
fn test_oversized_index_len_clamped() {
    let mut db = Database::open(Source::entries([("k", "v")]), Config::default()).unwrap();
    let mut bytes = db.to_bytes().unwrap();
    bytes[14..18].copy_from_slice(&u32::MAX.to_be_bytes());

    let db = Database::open(bytes.clone(), Config::default()).unwrap();

    assert!(db.is_dirty());
    assert_eq!(db.header().index_len as usize, bytes.len() - HEADER_SIZE);
}

#[test]
fn test_out_of_bounds_range() {
    let mut db = Database::open(Source::entries([("k", "value")]), Config::default()).unwrap();
    let mut bytes = db.to_bytes().unwrap();
    // Narrow entry: [start u32][end u32]...; push end past the value block
    bytes[HEADER_SIZE + 4..HEADER_SIZE + 8].copy_from_slice(&100u32.to_be_bytes());

    let mut db = Database::open(bytes, Config::default()).unwrap();
    let value = db.get("k").unwrap();

    assert_eq!(value, Value::from("value"));
    assert!(db.is_dirty());
}

#[test]
fn test_unknown_tag_entry_is_invisible_to_lookup() {
    let mut db = Database::open(Source::entries([("k", "value")]), Config::default()).unwrap();
    let mut bytes = db.to_bytes().unwrap();
    bytes[HEADER_SIZE + 8..HEADER_SIZE + 11].copy_from_slice(b"???");

    let mut db = Database::open(bytes, Config::default()).unwrap();

    assert!(matches!(db.get("k"), Err(L2dbError::KeyNotFound(_))));
    assert!(!db.is_dirty());

    // A dump still surfaces it, as raw bytes
    let dump = db.dump().unwrap();
    assert_eq!(dump.get("k"), Some(&Value::Raw(b"value".to_vec())));
    assert!(db.is_dirty());
}

#[test]
fn test_cleanup_only_flag_unblocks_writes() {
    let mut db = Database::open(corrupted_bool_db(), Config::default()).unwrap();
    db.get("flag").unwrap();

    let report = db.cleanup(true, false).unwrap();

    assert_eq!(report.repaired, 0);
    assert!(!db.is_dirty());
    db.set("k", "v").unwrap();
    // The corrupted byte is still there
    db.get("flag").unwrap();
    assert!(db.is_dirty());
}
