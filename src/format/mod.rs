//! Format Module
//!
//! The on-disk L2DB layout: header, index block and value block.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (64 bytes)                                           │
//! │   Magic (8) | Major (2) | Minor (2) | Patch (2)             │
//! │   IndexLen: u32 (4) | Flags (1) | Reserved, zero (45)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Index Block (IndexLen bytes)                                │
//! │   [Start][End][Tag (3)][Key ... 0x00]                       │
//! │   ... packed back-to-back, in insertion order ...           │
//! │   (Start/End are u32, or u64 when WIDE_INDEX is set)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Value Block (remainder of the file)                         │
//! │   bare encoded values, addressed by [Start, End)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All multi-byte integers are big-endian.
//!
//! ### Flag bits
//! - bit 0: WIDE_INDEX: 8-byte offsets in every index entry
//! - bit 1: DIRTY: a structural anomaly was seen and not yet repaired
//! - bit 2: LOCKED: advisory only, never enforced by the engine

mod codec;
mod header;
mod index;
mod registry;
mod tag;
mod value;

pub use codec::{decode_tagged, decode_value, encode_value, Anomaly, Decoded, Encoded};
pub use header::{Flags, Header, SpecVersion};
pub use index::{Entries, Index, IndexEntry};
pub(crate) use index::validate_key;
pub use registry::{CustomType, TypeRegistry};
pub use tag::TypeTag;
pub use value::Value;

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying an L2DB file
pub const MAGIC: &[u8; 8] = b"\x88L2DB\x00\x00\x00";

/// Header size: fixed 64 bytes, zero padded
pub const HEADER_SIZE: usize = 64;

/// Spec version written by this engine; only `major` must match on read
pub const SPEC_VERSION: SpecVersion = SpecVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

/// Length of a type tag in an index entry
pub const TAG_SIZE: usize = 3;

/// Terminator after every key name in the index block
pub const KEY_TERMINATOR: u8 = 0x00;
