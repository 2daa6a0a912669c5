//! Memory Storage
//!
//! Index and value blocks buffered in memory.

use std::borrow::Cow;
use std::mem;
use std::ops::Range;

use crate::error::{L2dbError, Result};
use crate::format::{Header, Index};

use super::{to_usize, Storage};

/// Whole-database buffer
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    index: Index,
    values: Vec<u8>,
}

impl MemoryStorage {
    /// Create empty storage
    pub fn new(wide: bool) -> Self {
        Self {
            index: Index::new(wide),
            values: Vec::new(),
        }
    }

    /// Create storage from an already-split index and value block
    pub fn from_parts(index: Index, values: Vec<u8>) -> Self {
        Self { index, values }
    }

    /// The value block
    pub fn values(&self) -> &[u8] {
        &self.values
    }

    /// Serialize header, index and values into one buffer
    pub fn serialize(&self, header: &Header) -> Vec<u8> {
        let header = header.encode();
        let mut out = Vec::with_capacity(header.len() + self.index.byte_len() + self.values.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(self.index.as_bytes());
        out.extend_from_slice(&self.values);
        out
    }

    fn checked_range(&self, range: &Range<u64>) -> Result<Range<usize>> {
        let start = to_usize(range.start)?;
        let end = to_usize(range.end)?;
        if start > end || end > self.values.len() {
            return Err(L2dbError::Capacity(format!(
                "range {}..{} outside the {}-byte value block",
                start,
                end,
                self.values.len()
            )));
        }
        Ok(start..end)
    }
}

impl Storage for MemoryStorage {
    fn load_index(&mut self) -> Result<Cow<'_, Index>> {
        Ok(Cow::Borrowed(&self.index))
    }

    fn take_index(&mut self) -> Result<Index> {
        let wide = self.index.is_wide();
        Ok(mem::replace(&mut self.index, Index::new(wide)))
    }

    fn store_index(&mut self, index: Index) -> Result<()> {
        self.index = index;
        Ok(())
    }

    fn value_len(&mut self) -> Result<u64> {
        Ok(self.values.len() as u64)
    }

    fn read_value(&mut self, range: Range<u64>) -> Result<Vec<u8>> {
        let range = self.checked_range(&range)?;
        Ok(self.values[range].to_vec())
    }

    fn write_value(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let start = to_usize(offset)?;
        let end = start + bytes.len();
        if end > self.values.len() {
            self.values.resize(end, 0);
        }
        self.values[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn append_value(&mut self, bytes: &[u8]) -> Result<u64> {
        let offset = self.values.len() as u64;
        self.values.extend_from_slice(bytes);
        Ok(offset)
    }

    fn copy_within(&mut self, src: Range<u64>, dst: u64) -> Result<()> {
        let src = self.checked_range(&src)?;
        let dst = to_usize(dst)?;
        let end = dst + src.len();
        if end > self.values.len() {
            self.values.resize(end, 0);
        }
        self.values.copy_within(src, dst);
        Ok(())
    }

    fn truncate_values(&mut self, len: u64) -> Result<()> {
        self.values.truncate(to_usize(len)?);
        Ok(())
    }

    fn write_header(&mut self, _header: &Header) -> Result<()> {
        // Header is written out with everything else on flush
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
