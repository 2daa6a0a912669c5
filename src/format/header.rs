//! Header codec
//!
//! Encodes and decodes the fixed 64-byte file header.

use std::fmt;
use std::ops::BitOr;

use bytes::{Buf, BufMut, BytesMut};
use tracing::warn;

use crate::error::{L2dbError, Result};

use super::{HEADER_SIZE, MAGIC, SPEC_VERSION};

// =============================================================================
// Spec Version
// =============================================================================

/// Three-part spec version stored in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// =============================================================================
// Flags
// =============================================================================

/// Bitmask stored in the header's flag byte
///
/// Unknown bits are carried through untouched so a newer writer's flags
/// survive a round trip through this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Flags(u8);

impl Flags {
    /// 8-byte instead of 4-byte offsets in index entries
    pub const WIDE_INDEX: Flags = Flags(0b0000_0001);
    /// Structural anomaly detected, writes blocked until cleanup
    pub const DIRTY: Flags = Flags(0b0000_0010);
    /// Advisory lock bit, never enforced
    pub const LOCKED: Flags = Flags(0b0000_0100);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    /// Insert or remove `other` depending on `value`
    pub fn set(&mut self, other: Flags, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

// =============================================================================
// Header
// =============================================================================

/// Decoded file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Spec version the file was written with
    pub version: SpecVersion,
    /// Length of the index block in bytes
    pub index_len: u32,
    /// Flag byte
    pub flags: Flags,
}

impl Header {
    /// Header for a fresh, empty database
    pub fn new(flags: Flags) -> Self {
        Self {
            version: SPEC_VERSION,
            index_len: 0,
            flags,
        }
    }

    /// Encode into the fixed 64-byte representation
    ///
    /// Format: magic (8) + major/minor/patch (3 × u16) + index_len (u32) +
    /// flags (1) + zero padding
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_slice(MAGIC);
        buf.put_u16(self.version.major);
        buf.put_u16(self.version.minor);
        buf.put_u16(self.version.patch);
        buf.put_u32(self.index_len);
        buf.put_u8(self.flags.bits());
        buf.put_bytes(0, HEADER_SIZE - buf.len());

        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Decode a header from the first 64 bytes of `bytes`
    ///
    /// A magic mismatch is a syntax error when `strict`, and only logged
    /// otherwise. A different major version is always rejected.
    pub fn decode(bytes: &[u8], strict: bool) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(L2dbError::Syntax(format!(
                "Truncated header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut buf = &bytes[..HEADER_SIZE];

        let magic = &buf[..MAGIC.len()];
        if magic != MAGIC {
            if strict {
                return Err(L2dbError::Syntax(format!(
                    "Invalid magic bytes: expected {:?}, got {:?}",
                    MAGIC, magic
                )));
            }
            warn!(?magic, "ignoring invalid magic bytes in non-strict mode");
        }
        buf.advance(MAGIC.len());

        let version = SpecVersion {
            major: buf.get_u16(),
            minor: buf.get_u16(),
            patch: buf.get_u16(),
        };
        if version.major != SPEC_VERSION.major {
            return Err(L2dbError::VersionMismatch {
                expected: SPEC_VERSION.major,
                actual: version,
            });
        }

        let index_len = buf.get_u32();
        let flags = Flags::from_bits(buf.get_u8());

        Ok(Self {
            version,
            index_len,
            flags,
        })
    }

    /// Whether index entries use 8-byte offsets
    pub fn is_wide(&self) -> bool {
        self.flags.contains(Flags::WIDE_INDEX)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(Flags::DIRTY)
    }

    pub fn is_locked(&self) -> bool {
        self.flags.contains(Flags::LOCKED)
    }
}
