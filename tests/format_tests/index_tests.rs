//! Tests for the index block
//!
//! These tests verify:
//! - Entry layout for narrow and wide offsets
//! - Forward-walk lookups, including keys that are suffixes of others
//! - In-place updates and removal
//! - Handling of garbage tags and trailing bytes

use l2db::format::{Index, TypeTag};
use l2db::L2dbError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Build a raw narrow entry by hand
fn raw_entry(start: u32, end: u32, code: &[u8; 3], key: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&start.to_be_bytes());
    bytes.extend_from_slice(&end.to_be_bytes());
    bytes.extend_from_slice(code);
    bytes.extend_from_slice(key.as_bytes());
    bytes.push(0x00);
    bytes
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_narrow_entry_layout() {
    let mut index = Index::new(false);

    index.push_entry("hello", TypeTag::Str, 0..5).unwrap();

    assert_eq!(index.as_bytes(), raw_entry(0, 5, b"str", "hello").as_slice());
    assert_eq!(index.byte_len(), index.entry_size("hello"));
    assert_eq!(index.byte_len(), 4 + 4 + 3 + 5 + 1);
}

#[test]
fn test_wide_entry_layout() {
    let mut index = Index::new(true);

    index.push_entry("k", TypeTag::Int, 1..2).unwrap();

    let bytes = index.as_bytes();
    assert_eq!(bytes.len(), 8 + 8 + 3 + 1 + 1);
    assert_eq!(&bytes[..8], &1u64.to_be_bytes());
    assert_eq!(&bytes[8..16], &2u64.to_be_bytes());
    assert_eq!(&bytes[16..19], b"int");
}

#[test]
fn test_narrow_index_rejects_large_offsets() {
    let mut index = Index::new(false);

    let result = index.push_entry("big", TypeTag::Raw, 0..u64::from(u32::MAX) + 1);

    assert!(matches!(result, Err(L2dbError::Capacity(_))));
    assert!(index.is_empty());
}

#[test]
fn test_key_with_nul_rejected() {
    let mut index = Index::new(false);

    let result = index.insert_or_update("a\0b", TypeTag::Str, 0..1);

    assert!(matches!(result, Err(L2dbError::InvalidKey(_))));
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_find_in_insertion_order() {
    let mut index = Index::new(false);
    index.push_entry("first", TypeTag::Str, 0..3).unwrap();
    index.push_entry("second", TypeTag::Int, 3..4).unwrap();

    let entry = index.find("second").unwrap();
    assert_eq!(entry.range(), 3..4);
    assert_eq!(entry.type_tag(), Some(TypeTag::Int));

    let keys: Vec<String> = index.entries().map(|e| e.key).collect();
    assert_eq!(keys, vec!["first", "second"]);
    assert!(index.find("third").is_none());
}

#[test]
fn test_find_suffix_key() {
    let mut index = Index::new(false);
    index.push_entry("username", TypeTag::Str, 0..4).unwrap();
    index.push_entry("name", TypeTag::Str, 4..8).unwrap();

    assert_eq!(index.find("name").unwrap().range(), 4..8);
    assert_eq!(index.find("username").unwrap().range(), 0..4);
}

#[test]
fn test_find_key_matching_offset_bytes() {
    // Offsets whose bytes spell out another key must not confuse lookup
    let mut index = Index::new(false);
    index.push_entry("x", TypeTag::Raw, 0..0x7800).unwrap();
    index.push_entry("y", TypeTag::Raw, 0..1).unwrap();

    assert_eq!(index.find("x").unwrap().range(), 0..0x7800);
    assert_eq!(index.find("y").unwrap().range(), 0..1);
}

#[test]
fn test_empty_key() {
    let mut index = Index::new(false);
    index.push_entry("", TypeTag::Null, 0..1).unwrap();
    index.push_entry("a", TypeTag::Null, 1..2).unwrap();

    assert_eq!(index.find("").unwrap().range(), 0..1);
    assert_eq!(index.len(), 2);
}

#[test]
fn test_find_skips_unrecognized_tag() {
    let mut bytes = raw_entry(0, 1, b"???", "k");
    bytes.extend(raw_entry(1, 2, b"bol", "k"));
    let index = Index::from_bytes(bytes, false);

    let entry = index.find("k").unwrap();

    assert_eq!(entry.range(), 1..2);
    assert_eq!(index.len(), 2);
}

#[test]
fn test_trailing_bytes() {
    let mut bytes = raw_entry(0, 1, b"int", "n");
    bytes.extend_from_slice(&[0xAB, 0xCD]);
    let index = Index::from_bytes(bytes, false);

    assert_eq!(index.len(), 1);
    assert_eq!(index.trailing_bytes(), 2);
}

// =============================================================================
// Mutation Tests
// =============================================================================

#[test]
fn test_update_in_place() {
    let mut index = Index::new(false);
    index.push_entry("a", TypeTag::Str, 0..10).unwrap();
    index.push_entry("b", TypeTag::Str, 10..12).unwrap();
    let before = index.byte_len();

    let appended = index.insert_or_update("a", TypeTag::Int, 0..1).unwrap();

    assert!(!appended);
    assert_eq!(index.byte_len(), before);
    let entry = index.find("a").unwrap();
    assert_eq!(entry.range(), 0..1);
    assert_eq!(entry.type_tag(), Some(TypeTag::Int));
    assert_eq!(index.find("b").unwrap().range(), 10..12);
}

#[test]
fn test_insert_appends() {
    let mut index = Index::new(false);

    assert!(index.insert_or_update("a", TypeTag::Str, 0..1).unwrap());
    assert!(index.insert_or_update("b", TypeTag::Str, 1..2).unwrap());

    assert_eq!(index.len(), 2);
}

#[test]
fn test_remove_splices_entry() {
    let mut index = Index::new(false);
    index.push_entry("a", TypeTag::Str, 0..1).unwrap();
    index.push_entry("b", TypeTag::Str, 1..2).unwrap();
    index.push_entry("c", TypeTag::Str, 2..3).unwrap();

    let removed = index.remove("b").unwrap();

    assert_eq!(removed.range(), 1..2);
    let keys: Vec<String> = index.entries().map(|e| e.key).collect();
    assert_eq!(keys, vec!["a", "c"]);
    assert_eq!(index.trailing_bytes(), 0);
    assert!(index.remove("b").is_none());
}
