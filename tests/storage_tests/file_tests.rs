//! Tests for the unbuffered file storage backend
//!
//! These tests verify:
//! - Value reads and writes at file offsets
//! - Shifting the value block when the index grows or shrinks
//! - Chunked region moves with a tiny copy buffer

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use l2db::format::{Flags, Header, TypeTag, HEADER_SIZE};
use l2db::storage::{FileStorage, Storage};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.l2db");
    (temp_dir, path)
}

fn open_rw(path: &PathBuf) -> File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .unwrap()
}

/// Fresh storage with a 3-byte copy buffer to force chunked moves
fn create_storage(path: &PathBuf) -> FileStorage {
    let header = Header::new(Flags::empty());
    FileStorage::create(open_rw(path), &header, 3).unwrap()
}

// =============================================================================
// Value Tests
// =============================================================================

#[test]
fn test_create_writes_header() {
    let (_temp, path) = setup_temp_file();

    let mut storage = create_storage(&path);

    assert_eq!(std::fs::metadata(&path).unwrap().len(), HEADER_SIZE as u64);
    assert_eq!(storage.value_len().unwrap(), 0);
    assert!(storage.load_index().unwrap().is_empty());
}

#[test]
fn test_append_and_read() {
    let (_temp, path) = setup_temp_file();
    let mut storage = create_storage(&path);

    assert_eq!(storage.append_value(b"hello").unwrap(), 0);
    assert_eq!(storage.append_value(b"world").unwrap(), 5);

    assert_eq!(storage.read_value(3..7).unwrap(), b"lowo");
    assert!(storage.read_value(8..11).is_err());
}

#[test]
fn test_index_growth_shifts_values() {
    let (_temp, path) = setup_temp_file();
    let mut storage = create_storage(&path);
    storage.append_value(b"0123456789").unwrap();

    let mut index = storage.take_index().unwrap();
    index.push_entry("digits", TypeTag::Str, 0..10).unwrap();
    let index_len = index.byte_len();
    storage.store_index(index).unwrap();

    assert_eq!(storage.read_value(0..10).unwrap(), b"0123456789");
    assert_eq!(storage.load_index().unwrap().find("digits").unwrap().range(), 0..10);

    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(on_disk.len(), HEADER_SIZE + index_len + 10);
    assert_eq!(&on_disk[HEADER_SIZE + index_len..], b"0123456789");
}

#[test]
fn test_index_shrink_shifts_values_back() {
    let (_temp, path) = setup_temp_file();
    let mut storage = create_storage(&path);
    storage.append_value(b"abcdefgh").unwrap();

    let mut index = storage.take_index().unwrap();
    index.push_entry("one", TypeTag::Str, 0..4).unwrap();
    index.push_entry("two", TypeTag::Str, 4..8).unwrap();
    storage.store_index(index).unwrap();

    let mut index = storage.take_index().unwrap();
    index.remove("one").unwrap();
    let index_len = index.byte_len();
    storage.store_index(index).unwrap();

    assert_eq!(storage.value_len().unwrap(), 8);
    assert_eq!(storage.read_value(4..8).unwrap(), b"efgh");
    assert_eq!(
        std::fs::metadata(&path).unwrap().len(),
        (HEADER_SIZE + index_len + 8) as u64
    );
}

#[test]
fn test_compaction_primitives() {
    let (_temp, path) = setup_temp_file();
    let mut storage = create_storage(&path);
    storage.append_value(b"xxxxabcdefg").unwrap();

    storage.copy_within(4..11, 0).unwrap();
    storage.truncate_values(7).unwrap();

    assert_eq!(storage.value_len().unwrap(), 7);
    assert_eq!(storage.read_value(0..7).unwrap(), b"abcdefg");
}

#[test]
fn test_write_header_in_place() {
    let (_temp, path) = setup_temp_file();
    let mut storage = create_storage(&path);
    storage.append_value(b"v").unwrap();

    let header = Header::new(Flags::DIRTY);
    storage.write_header(&header).unwrap();
    storage.sync().unwrap();

    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(&on_disk[..HEADER_SIZE], &header.encode());
    assert_eq!(on_disk.last(), Some(&b'v'));
}

#[test]
fn test_copy_to_buffer() {
    let (_temp, path) = setup_temp_file();
    let mut storage = create_storage(&path);
    storage.append_value(b"data").unwrap();

    let mut out = Vec::new();
    let copied = storage.copy_to(&mut out).unwrap();

    assert_eq!(copied, (HEADER_SIZE + 4) as u64);
    assert_eq!(&out[HEADER_SIZE..], b"data");
}
