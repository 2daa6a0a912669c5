//! Tests for the file header
//!
//! These tests verify:
//! - Fixed 64-byte encoding with zero padding
//! - Round trip of version, index length and flags
//! - Magic validation in strict and lenient mode
//! - Major version gate

use l2db::format::{Flags, Header, SpecVersion, HEADER_SIZE, MAGIC, SPEC_VERSION};
use l2db::L2dbError;

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_encode_layout() {
    let mut header = Header::new(Flags::WIDE_INDEX | Flags::LOCKED);
    header.index_len = 0x0102_0304;

    let bytes = header.encode();

    assert_eq!(bytes.len(), HEADER_SIZE);
    assert_eq!(&bytes[..8], MAGIC);
    assert_eq!(&bytes[8..14], &[0, 1, 0, 0, 0, 0]);
    assert_eq!(&bytes[14..18], &[1, 2, 3, 4]);
    assert_eq!(bytes[18], 0b0000_0101);
    assert!(bytes[19..].iter().all(|&b| b == 0));
}

#[test]
fn test_round_trip() {
    let mut header = Header::new(Flags::DIRTY);
    header.index_len = 4242;

    let decoded = Header::decode(&header.encode(), true).unwrap();

    assert_eq!(decoded, header);
    assert_eq!(decoded.version, SPEC_VERSION);
    assert!(decoded.is_dirty());
    assert!(!decoded.is_wide());
    assert!(!decoded.is_locked());
}

#[test]
fn test_unknown_flag_bits_survive() {
    let header = Header::new(Flags::from_bits(0b1000_0001));

    let decoded = Header::decode(&header.encode(), true).unwrap();

    assert_eq!(decoded.flags.bits(), 0b1000_0001);
    assert!(decoded.is_wide());
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_bad_magic_strict() {
    let mut bytes = Header::new(Flags::empty()).encode();
    bytes[..8].copy_from_slice(b"NOTL2DB!");

    let result = Header::decode(&bytes, true);

    assert!(matches!(result, Err(L2dbError::Syntax(_))));
}

#[test]
fn test_bad_magic_lenient() {
    let mut bytes = Header::new(Flags::empty()).encode();
    bytes[..8].copy_from_slice(b"NOTL2DB!");

    let header = Header::decode(&bytes, false).unwrap();

    assert_eq!(header.index_len, 0);
}

#[test]
fn test_truncated_header() {
    let bytes = Header::new(Flags::empty()).encode();

    let result = Header::decode(&bytes[..HEADER_SIZE - 1], true);

    assert!(matches!(result, Err(L2dbError::Syntax(_))));
}

#[test]
fn test_major_version_mismatch() {
    let mut bytes = Header::new(Flags::empty()).encode();
    bytes[8..10].copy_from_slice(&2u16.to_be_bytes());

    // Lenient mode does not relax the version gate
    match Header::decode(&bytes, false) {
        Err(L2dbError::VersionMismatch { expected, actual }) => {
            assert_eq!(expected, 1);
            assert_eq!(actual.major, 2);
        }
        other => panic!("expected VersionMismatch, got {:?}", other),
    }
}

#[test]
fn test_minor_and_patch_ignored() {
    let mut bytes = Header::new(Flags::empty()).encode();
    bytes[10..12].copy_from_slice(&7u16.to_be_bytes());
    bytes[12..14].copy_from_slice(&3u16.to_be_bytes());

    let header = Header::decode(&bytes, true).unwrap();

    assert_eq!(
        header.version,
        SpecVersion {
            major: 1,
            minor: 7,
            patch: 3
        }
    );
    assert_eq!(header.version.to_string(), "1.7.3");
}

// =============================================================================
// Flag Tests
// =============================================================================

#[test]
fn test_flag_set_and_remove() {
    let mut flags = Flags::empty();

    flags.set(Flags::DIRTY, true);
    flags.insert(Flags::LOCKED);
    assert!(flags.contains(Flags::DIRTY | Flags::LOCKED));

    flags.remove(Flags::DIRTY);
    assert!(!flags.contains(Flags::DIRTY));
    assert!(flags.contains(Flags::LOCKED));

    flags.set(Flags::LOCKED, false);
    assert_eq!(flags, Flags::empty());
}
