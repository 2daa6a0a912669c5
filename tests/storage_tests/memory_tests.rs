//! Tests for the in-memory storage backend

use l2db::format::{Flags, Header, Index, TypeTag, HEADER_SIZE};
use l2db::storage::{MemoryStorage, Storage};
use l2db::L2dbError;

// =============================================================================
// Value Block Tests
// =============================================================================

#[test]
fn test_append_returns_offsets() {
    let mut storage = MemoryStorage::new(false);

    assert_eq!(storage.append_value(b"abc").unwrap(), 0);
    assert_eq!(storage.append_value(b"de").unwrap(), 3);
    assert_eq!(storage.value_len().unwrap(), 5);
    assert_eq!(storage.read_value(1..4).unwrap(), b"bcd");
}

#[test]
fn test_read_out_of_bounds() {
    let mut storage = MemoryStorage::new(false);
    storage.append_value(b"abc").unwrap();

    assert!(matches!(storage.read_value(2..5), Err(L2dbError::Capacity(_))));
}

#[test]
fn test_write_in_place() {
    let mut storage = MemoryStorage::new(false);
    storage.append_value(b"hello").unwrap();

    storage.write_value(1, b"EL").unwrap();

    assert_eq!(storage.values(), b"hELlo");
}

#[test]
fn test_copy_within_and_truncate() {
    let mut storage = MemoryStorage::new(false);
    storage.append_value(b"__abc").unwrap();

    storage.copy_within(2..5, 0).unwrap();
    storage.truncate_values(3).unwrap();

    assert_eq!(storage.values(), b"abc");
}

// =============================================================================
// Index Tests
// =============================================================================

#[test]
fn test_take_and_store_index() {
    let mut storage = MemoryStorage::new(false);

    let mut index = storage.take_index().unwrap();
    index.push_entry("k", TypeTag::Bool, 0..1).unwrap();
    storage.store_index(index).unwrap();

    assert!(storage.load_index().unwrap().find("k").is_some());
}

#[test]
fn test_serialize_layout() {
    let mut index = Index::new(false);
    index.push_entry("k", TypeTag::Bool, 0..1).unwrap();
    let index_len = index.byte_len();
    let storage = MemoryStorage::from_parts(index, vec![0x01]);

    let mut header = Header::new(Flags::empty());
    header.index_len = index_len as u32;
    let bytes = storage.serialize(&header);

    assert_eq!(bytes.len(), HEADER_SIZE + index_len + 1);
    assert_eq!(&bytes[..HEADER_SIZE], &header.encode());
    assert_eq!(bytes.last(), Some(&0x01));
}
