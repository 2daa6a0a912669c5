//! File Storage
//!
//! Direct, unbuffered access to a database file. Only the header lives in
//! memory; the index block is read from disk on every lookup and values are
//! read and written at their file offsets.
//!
//! Growing or shrinking the index block shifts the whole value block, which
//! is done in chunks of `copy_buffer_size` bytes.

use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;

use tracing::debug;

use crate::error::{L2dbError, Result};
use crate::format::{Header, Index, HEADER_SIZE};

use super::{to_usize, Storage};

/// Unbuffered file backend
#[derive(Debug)]
pub struct FileStorage {
    /// Open database file
    file: File,
    /// Length of the index block on disk
    index_len: u64,
    /// Offset width of index entries
    wide: bool,
    /// Chunk size for region moves
    copy_buffer_size: usize,
}

impl FileStorage {
    /// Wrap a file whose header has already been read and validated
    ///
    /// `header.index_len` must not exceed the bytes actually present.
    pub fn open(file: File, header: &Header, copy_buffer_size: usize) -> Self {
        Self {
            file,
            index_len: u64::from(header.index_len),
            wide: header.is_wide(),
            copy_buffer_size: copy_buffer_size.max(1),
        }
    }

    /// Initialise an empty database in `file`
    pub fn create(mut file: File, header: &Header, copy_buffer_size: usize) -> Result<Self> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        Ok(Self::open(file, header, copy_buffer_size))
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn into_file(self) -> File {
        self.file
    }

    /// Copy the whole database file into `out`
    pub fn copy_to<W: Write>(&mut self, out: &mut W) -> Result<u64> {
        self.file.seek(SeekFrom::Start(0))?;
        let copied = std::io::copy(&mut self.file, out)?;
        Ok(copied)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// File offset of the first value byte
    fn values_start(&self) -> u64 {
        HEADER_SIZE as u64 + self.index_len
    }

    fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Move the file region `src` so it starts at `dst`
    ///
    /// Copies back-to-front when moving towards the end so overlapping
    /// regions are never clobbered before they are read.
    fn move_region(&mut self, src: Range<u64>, dst: u64) -> Result<()> {
        let len = src.end.saturating_sub(src.start);
        if len == 0 || dst == src.start {
            return Ok(());
        }

        let chunk = len.min(self.copy_buffer_size as u64);
        let mut buf = vec![0u8; to_usize(chunk)?];

        if dst > src.start {
            let mut remaining = len;
            while remaining > 0 {
                let n = remaining.min(chunk);
                remaining -= n;
                let piece = &mut buf[..n as usize];
                self.read_at(src.start + remaining, piece)?;
                self.write_at(dst + remaining, piece)?;
            }
        } else {
            let mut done = 0;
            while done < len {
                let n = (len - done).min(chunk);
                let piece = &mut buf[..n as usize];
                self.read_at(src.start + done, piece)?;
                self.write_at(dst + done, piece)?;
                done += n;
            }
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn load_index(&mut self) -> Result<Cow<'_, Index>> {
        Ok(Cow::Owned(self.take_index()?))
    }

    fn take_index(&mut self) -> Result<Index> {
        let mut bytes = vec![0u8; to_usize(self.index_len)?];
        self.read_at(HEADER_SIZE as u64, &mut bytes)?;
        Ok(Index::from_bytes(bytes, self.wide))
    }

    fn store_index(&mut self, index: Index) -> Result<()> {
        let new_len = index.byte_len() as u64;
        let old_len = self.index_len;

        if new_len != old_len {
            let file_len = self.file_len()?;
            let old_start = self.values_start();
            let new_start = HEADER_SIZE as u64 + new_len;
            debug!(old_len, new_len, "shifting value block for resized index");

            self.move_region(old_start..file_len, new_start)?;
            if new_len < old_len {
                self.file.set_len(file_len - (old_len - new_len))?;
            }
            self.index_len = new_len;
        }

        self.write_at(HEADER_SIZE as u64, index.as_bytes())
    }

    fn value_len(&mut self) -> Result<u64> {
        Ok(self.file_len()?.saturating_sub(self.values_start()))
    }

    fn read_value(&mut self, range: Range<u64>) -> Result<Vec<u8>> {
        let value_len = self.value_len()?;
        if range.start > range.end || range.end > value_len {
            return Err(L2dbError::Capacity(format!(
                "range {}..{} outside the {}-byte value block",
                range.start, range.end, value_len
            )));
        }
        let mut bytes = vec![0u8; to_usize(range.end - range.start)?];
        self.read_at(self.values_start() + range.start, &mut bytes)?;
        Ok(bytes)
    }

    fn write_value(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.write_at(self.values_start() + offset, bytes)
    }

    fn append_value(&mut self, bytes: &[u8]) -> Result<u64> {
        let file_len = self.file_len()?;
        let offset = file_len.saturating_sub(self.values_start());
        self.write_at(file_len, bytes)?;
        Ok(offset)
    }

    fn copy_within(&mut self, src: Range<u64>, dst: u64) -> Result<()> {
        let base = self.values_start();
        self.move_region(base + src.start..base + src.end, base + dst)
    }

    fn truncate_values(&mut self, len: u64) -> Result<()> {
        self.file.set_len(self.values_start() + len)?;
        Ok(())
    }

    fn write_header(&mut self, header: &Header) -> Result<()> {
        self.write_at(0, &header.encode())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
