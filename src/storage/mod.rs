//! Storage Module
//!
//! Where the index and value blocks of an open database live.
//!
//! ## Responsibilities
//! - Hand the session the index block, and take back a modified one
//! - Read, overwrite and append value bytes by value-block offset
//! - Move value bytes around for compaction
//! - Persist the header when it changes
//!
//! ## Backends
//! - [`MemoryStorage`]: the whole database buffered in memory; nothing
//!   reaches disk until the session flushes
//! - [`FileStorage`]: only the header is read up front; every call goes
//!   straight to the file, so databases larger than memory work

mod file;
mod memory;

use std::borrow::Cow;
use std::ops::Range;

use crate::error::{L2dbError, Result};
use crate::format::{Header, Index};

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Access to a database's index and value blocks
///
/// Value offsets are relative to the start of the value block.
pub trait Storage {
    /// The current index block
    fn load_index(&mut self) -> Result<Cow<'_, Index>>;

    /// Take the index block out for modification
    ///
    /// Must be followed by [`Storage::store_index`].
    fn take_index(&mut self) -> Result<Index>;

    /// Replace the index block
    fn store_index(&mut self, index: Index) -> Result<()>;

    /// Length of the value block
    fn value_len(&mut self) -> Result<u64>;

    /// Read a range of the value block; the range must lie inside it
    fn read_value(&mut self, range: Range<u64>) -> Result<Vec<u8>>;

    /// Overwrite value bytes starting at `offset`
    fn write_value(&mut self, offset: u64, bytes: &[u8]) -> Result<()>;

    /// Append bytes to the value block, returning their start offset
    fn append_value(&mut self, bytes: &[u8]) -> Result<u64>;

    /// Copy `src` to start at `dst` (ranges may overlap)
    fn copy_within(&mut self, src: Range<u64>, dst: u64) -> Result<()>;

    /// Cut the value block down to `len` bytes
    fn truncate_values(&mut self, len: u64) -> Result<()>;

    /// Persist a changed header
    fn write_header(&mut self, header: &Header) -> Result<()>;

    /// Push written data down to the device
    fn sync(&mut self) -> Result<()>;
}

/// The backend an open database runs on
#[derive(Debug)]
pub enum Backend {
    Memory(MemoryStorage),
    File(FileStorage),
}

macro_rules! dispatch {
    ($self:ident, $storage:ident => $call:expr) => {
        match $self {
            Backend::Memory($storage) => $call,
            Backend::File($storage) => $call,
        }
    };
}

impl Storage for Backend {
    fn load_index(&mut self) -> Result<Cow<'_, Index>> {
        dispatch!(self, s => s.load_index())
    }

    fn take_index(&mut self) -> Result<Index> {
        dispatch!(self, s => s.take_index())
    }

    fn store_index(&mut self, index: Index) -> Result<()> {
        dispatch!(self, s => s.store_index(index))
    }

    fn value_len(&mut self) -> Result<u64> {
        dispatch!(self, s => s.value_len())
    }

    fn read_value(&mut self, range: Range<u64>) -> Result<Vec<u8>> {
        dispatch!(self, s => s.read_value(range))
    }

    fn write_value(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        dispatch!(self, s => s.write_value(offset, bytes))
    }

    fn append_value(&mut self, bytes: &[u8]) -> Result<u64> {
        dispatch!(self, s => s.append_value(bytes))
    }

    fn copy_within(&mut self, src: Range<u64>, dst: u64) -> Result<()> {
        dispatch!(self, s => s.copy_within(src, dst))
    }

    fn truncate_values(&mut self, len: u64) -> Result<()> {
        dispatch!(self, s => s.truncate_values(len))
    }

    fn write_header(&mut self, header: &Header) -> Result<()> {
        dispatch!(self, s => s.write_header(header))
    }

    fn sync(&mut self) -> Result<()> {
        dispatch!(self, s => s.sync())
    }
}

/// Offsets beyond the address space can't be buffered
pub(crate) fn to_usize(n: u64) -> Result<usize> {
    usize::try_from(n)
        .map_err(|_| L2dbError::Capacity(format!("offset {} exceeds the address space", n)))
}
