//! Index block
//!
//! The packed, insertion-ordered list of entries binding key names to value
//! ranges. The in-memory form is the wire form: lookups scan the raw bytes
//! directly and no secondary structure is kept.
//!
//! ## Entry Format
//! ```text
//! ┌───────────┬───────────┬─────────┬──────────────┬──────┐
//! │ Start (w) │  End (w)  │ Tag (3) │ Key (UTF-8)  │ 0x00 │
//! └───────────┴───────────┴─────────┴──────────────┴──────┘
//!   w = 4, or 8 when WIDE_INDEX is set
//! ```
//!
//! Offsets and tag are fixed width, so the first `0x00` after them always
//! terminates the key. Walking forward from the start of the block therefore
//! re-derives every entry boundary unambiguously.

use std::ops::Range;

use bytes::{Buf, BufMut};

use crate::error::{L2dbError, Result};

use super::{TypeTag, KEY_TERMINATOR, TAG_SIZE};

/// One decoded index entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Key name (lossily decoded if the stored bytes are not UTF-8)
    pub key: String,
    /// Raw 3-byte type tag code
    pub code: [u8; TAG_SIZE],
    /// Start of the value range in the value block
    pub start: u64,
    /// End (exclusive) of the value range
    pub end: u64,
    /// Byte span of the whole entry inside the index block
    pub span: Range<usize>,
}

impl IndexEntry {
    /// The entry's tag, if it is a built-in one
    pub fn type_tag(&self) -> Option<TypeTag> {
        TypeTag::from_code(&self.code)
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }

    /// Length of the value range (0 for an inverted range)
    pub fn value_len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// The index block of one database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    bytes: Vec<u8>,
    wide: bool,
}

impl Index {
    /// Create an empty index
    pub fn new(wide: bool) -> Self {
        Self {
            bytes: Vec::new(),
            wide,
        }
    }

    /// Wrap an index block read from a database
    pub fn from_bytes(bytes: Vec<u8>, wide: bool) -> Self {
        Self { bytes, wide }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Length of the index block in bytes
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_wide(&self) -> bool {
        self.wide
    }

    /// Width of each offset field (4 or 8)
    pub fn offset_width(&self) -> usize {
        if self.wide {
            8
        } else {
            4
        }
    }

    /// Bytes an entry for `key` occupies
    pub fn entry_size(&self, key: &str) -> usize {
        2 * self.offset_width() + TAG_SIZE + key.len() + 1
    }

    /// Number of well-formed entries
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    /// Iterate over entries in insertion order
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            index: self,
            pos: 0,
        }
    }

    /// Bytes after the last well-formed entry
    pub fn trailing_bytes(&self) -> usize {
        let mut entries = self.entries();
        for _ in entries.by_ref() {}
        self.bytes.len() - entries.pos
    }

    /// Find the entry for `key`
    ///
    /// Only entries with a built-in type tag match; an entry whose tag
    /// bytes are garbage is never returned. O(index length).
    pub fn find(&self, key: &str) -> Option<IndexEntry> {
        self.find_with(key, is_builtin)
    }

    /// Find the entry for `key` among entries whose tag `recognized` accepts
    pub fn find_with(&self, key: &str, recognized: impl Fn(&[u8]) -> bool) -> Option<IndexEntry> {
        let mut pos = 0;
        while let Some((name, next)) = self.parse_name(pos) {
            if name == key.as_bytes() {
                let tag_at = pos + 2 * self.offset_width();
                if recognized(&self.bytes[tag_at..tag_at + TAG_SIZE]) {
                    return self.parse_entry(pos).map(|(entry, _)| entry);
                }
            }
            pos = next;
        }
        None
    }

    /// Point `key` at `range` with `tag`
    ///
    /// Rewrites an existing entry's offset and tag fields in place (the key
    /// bytes stay as they are), or appends a new entry. Returns whether an
    /// entry was appended.
    pub fn insert_or_update(&mut self, key: &str, tag: TypeTag, range: Range<u64>) -> Result<bool> {
        self.upsert(key, *tag.code(), range, is_builtin)
    }

    /// [`Index::insert_or_update`] for an arbitrary tag code
    pub fn upsert(
        &mut self,
        key: &str,
        code: [u8; TAG_SIZE],
        range: Range<u64>,
        recognized: impl Fn(&[u8]) -> bool,
    ) -> Result<bool> {
        validate_key(key)?;
        self.check_range(&range)?;

        match self.find_with(key, recognized) {
            Some(entry) => {
                let w = self.offset_width();
                let mut field = &mut self.bytes[entry.span.start..entry.span.start + 2 * w + TAG_SIZE];
                put_offset(&mut field, range.start, self.wide);
                put_offset(&mut field, range.end, self.wide);
                field.put_slice(&code);
                Ok(false)
            }
            None => {
                self.push_code(key, code, range)?;
                Ok(true)
            }
        }
    }

    /// Append an entry without looking for an existing one
    ///
    /// The caller guarantees `key` is not already present.
    pub fn push_entry(&mut self, key: &str, tag: TypeTag, range: Range<u64>) -> Result<()> {
        self.push_code(key, *tag.code(), range)
    }

    /// [`Index::push_entry`] for an arbitrary tag code
    pub fn push_code(&mut self, key: &str, code: [u8; TAG_SIZE], range: Range<u64>) -> Result<()> {
        validate_key(key)?;
        self.check_range(&range)?;

        let new_len = self.bytes.len() + self.entry_size(key);
        if u32::try_from(new_len).is_err() {
            return Err(L2dbError::Capacity(format!(
                "index block would grow to {} bytes, beyond the 32-bit length field",
                new_len
            )));
        }

        self.bytes.reserve(self.entry_size(key));
        put_offset(&mut self.bytes, range.start, self.wide);
        put_offset(&mut self.bytes, range.end, self.wide);
        self.bytes.put_slice(&code);
        self.bytes.put_slice(key.as_bytes());
        self.bytes.put_u8(KEY_TERMINATOR);
        Ok(())
    }

    /// Splice the entry for `key` out of the block
    ///
    /// The value range it pointed at is left alone and becomes dead space.
    pub fn remove(&mut self, key: &str) -> Option<IndexEntry> {
        self.remove_with(key, is_builtin)
    }

    /// [`Index::remove`] among entries whose tag `recognized` accepts
    pub fn remove_with(&mut self, key: &str, recognized: impl Fn(&[u8]) -> bool) -> Option<IndexEntry> {
        let entry = self.find_with(key, recognized)?;
        self.bytes.drain(entry.span.clone());
        Some(entry)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Offsets must fit the entry's field width
    fn check_range(&self, range: &Range<u64>) -> Result<()> {
        if !self.wide && range.end > u64::from(u32::MAX) {
            return Err(L2dbError::Capacity(format!(
                "offset {} does not fit a 4-byte index; use a wide index",
                range.end
            )));
        }
        Ok(())
    }

    /// Key bytes of the entry at `pos`, and where the next entry starts
    fn parse_name(&self, pos: usize) -> Option<(&[u8], usize)> {
        let name_start = pos + 2 * self.offset_width() + TAG_SIZE;
        if name_start >= self.bytes.len() {
            return None;
        }
        let name_len = self.bytes[name_start..]
            .iter()
            .position(|&b| b == KEY_TERMINATOR)?;
        let name_end = name_start + name_len;
        Some((&self.bytes[name_start..name_end], name_end + 1))
    }

    fn parse_entry(&self, pos: usize) -> Option<(IndexEntry, usize)> {
        let (name, next) = self.parse_name(pos)?;

        let mut fields = &self.bytes[pos..];
        let start = get_offset(&mut fields, self.wide);
        let end = get_offset(&mut fields, self.wide);
        let mut code = [0u8; TAG_SIZE];
        fields.copy_to_slice(&mut code);

        let entry = IndexEntry {
            key: String::from_utf8_lossy(name).into_owned(),
            code,
            start,
            end,
            span: pos..next,
        };
        Some((entry, next))
    }
}

/// Iterator over well-formed index entries
///
/// Stops at the first position that cannot hold a complete entry.
pub struct Entries<'a> {
    index: &'a Index,
    pos: usize,
}

impl Iterator for Entries<'_> {
    type Item = IndexEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let (entry, next) = self.index.parse_entry(self.pos)?;
        self.pos = next;
        Some(entry)
    }
}

fn is_builtin(code: &[u8]) -> bool {
    TypeTag::from_code(code).is_some()
}

/// Key names are NUL-terminated on disk, so they cannot contain NUL
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.as_bytes().contains(&KEY_TERMINATOR) {
        return Err(L2dbError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn put_offset<B: BufMut>(buf: &mut B, offset: u64, wide: bool) {
    if wide {
        buf.put_u64(offset);
    } else {
        // check_range guarantees the narrowing is lossless
        buf.put_u32(offset as u32);
    }
}

fn get_offset<B: Buf>(buf: &mut B, wide: bool) -> u64 {
    if wide {
        buf.get_u64()
    } else {
        u64::from(buf.get_u32())
    }
}
