//! Database Module
//!
//! The session that ties header, index and value block together.
//!
//! ## Responsibilities
//! - Open a database from a mapping, a byte buffer or a file
//! - Resolve keys through the index and (de)serialize values
//! - Apply the in-place / relocate update policy
//! - Track the dirty state and repair it in `cleanup`
//! - Flush to disk and release the file handle on teardown
//!
//! ## States
//! ```text
//!            open                 anomaly on read/decode
//! Closed ──────────► Open(Clean) ───────────────────────► Open(Dirty)
//!    ▲                   │   ▲                                 │
//!    │      close        │   └──────────── cleanup ────────────┘
//!    └───────────────────┘◄──────────────── close ─────────────┘
//! ```
//!
//! While dirty, reads still return best-effort values, but `write` and
//! `delete` fail with [`L2dbError::Dirty`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::{Config, OpenMode};
use crate::error::{L2dbError, Result};
use crate::format::{
    self, encode_value, Anomaly, CustomType, Decoded, Flags, Header, Index, IndexEntry,
    TypeRegistry, TypeTag, Value, HEADER_SIZE, TAG_SIZE,
};
use crate::storage::{Backend, FileStorage, MemoryStorage, Storage};

// =============================================================================
// Sources
// =============================================================================

/// What a database is opened from
#[derive(Debug)]
pub enum Source {
    /// Key/value pairs; bootstraps a fresh in-memory database
    Entries(Vec<(String, Value)>),
    /// An already-serialized database
    Bytes(Vec<u8>),
    /// A file the session opens (and creates, in write mode) itself
    Path(PathBuf),
    /// A file handle supplied by the caller
    Handle(File),
}

impl Source {
    /// Build an entries source from any key/value iterator
    pub fn entries<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Source::Entries(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, Value>> for Source {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Source::Entries(map.into_iter().collect())
    }
}

impl From<HashMap<String, Value>> for Source {
    fn from(map: HashMap<String, Value>) -> Self {
        Source::Entries(map.into_iter().collect())
    }
}

impl From<Vec<(String, Value)>> for Source {
    fn from(entries: Vec<(String, Value)>) -> Self {
        Source::Entries(entries)
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Source::Bytes(bytes)
    }
}

impl From<&[u8]> for Source {
    fn from(bytes: &[u8]) -> Self {
        Source::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<File> for Source {
    fn from(file: File) -> Self {
        Source::Handle(file)
    }
}

/// Where an in-place flush goes
#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    /// Mapping or byte buffer, no file behind it
    Detached,
    /// File opened by the session from this path
    Path(PathBuf),
    /// File handle supplied by the caller
    Handle,
}

/// Summary of a [`Database::cleanup`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Corrupted entries rewritten with a safe value
    pub repaired: usize,
    /// Corrupted or shadowed entries removed
    pub discarded: usize,
    /// Dead value bytes given back by compaction
    pub reclaimed_bytes: u64,
    /// Garbage bytes dropped from the end of the index block
    pub trailing_index_bytes: usize,
}

// =============================================================================
// Database
// =============================================================================

/// An open L2DB session
///
/// Owns exactly one header, index and value block. Dropping the session
/// flushes pending changes to its file (if any) and releases the handle;
/// use [`Database::close`] to observe errors from that flush.
pub struct Database {
    /// Session configuration
    config: Config,

    /// Decoded header; authoritative for flags and index length
    header: Header,

    /// Where index and values live
    backend: Backend,

    /// Caller-defined types recognized on top of the built-in tags
    types: TypeRegistry,

    /// Target of an in-place flush
    origin: Origin,

    /// File handle of a buffered file-backed session
    handle: Option<File>,

    /// Unflushed changes exist
    modified: bool,

    /// Teardown already ran
    closed: bool,
}

impl Database {
    /// Open a database from `source`
    ///
    /// - Entries: a fresh database with one write per pair
    /// - Bytes: split into header, index and values, buffered in memory
    /// - Path/Handle: read fully into memory, or with `mode.unbuffered`
    ///   only the header is read and every operation goes to the file
    pub fn open(source: impl Into<Source>, config: Config) -> Result<Self> {
        let mode = config.mode;

        match source.into() {
            Source::Entries(entries) => {
                if mode.unbuffered {
                    return Err(L2dbError::InvalidSource(
                        "an in-memory mapping cannot be opened unbuffered".to_string(),
                    ));
                }
                let header = Header::new(config.initial_flags());
                let backend = Backend::Memory(MemoryStorage::new(header.is_wide()));
                let mut db = Self::assemble(config, header, backend, Origin::Detached, None);

                debug!(entries = entries.len(), "bootstrapping database from mapping");
                for (key, value) in entries {
                    db.put(&key, value)?;
                }
                Ok(db)
            }
            Source::Bytes(bytes) => {
                if mode.unbuffered {
                    return Err(L2dbError::InvalidSource(
                        "a byte buffer cannot be opened unbuffered".to_string(),
                    ));
                }
                Self::from_buffer(bytes, config, Origin::Detached, None)
            }
            Source::Path(path) => {
                let file = Self::open_path(&path, mode)?;
                debug!(path = %path.display(), %mode, "opening database file");
                Self::from_file(file, config, Origin::Path(path))
            }
            Source::Handle(file) => {
                debug!(%mode, "opening database from file handle");
                Self::from_file(file, config, Origin::Handle)
            }
        }
    }

    /// Read a value
    ///
    /// With `as_type`, the stored value is converted explicitly. A stored
    /// byte pattern that breaks its type's rule still yields a best-effort
    /// value, but marks the database dirty.
    pub fn read(&mut self, key: &str, as_type: Option<TypeTag>) -> Result<Value> {
        self.ensure_readable()?;

        let entry = self.find(key)?;
        let value = self.decode_entry(&entry)?;

        match as_type {
            Some(target) => value.convert(target),
            None => Ok(value),
        }
    }

    /// Read a value in its stored type
    pub fn get(&mut self, key: &str) -> Result<Value> {
        self.read(key, None)
    }

    /// Write a value
    ///
    /// Update policy for an existing key:
    /// - new encoding no longer than the old range: overwrite in place and
    ///   shrink the range; the tail becomes dead space
    /// - longer: append to the value block and repoint the entry; the old
    ///   range becomes dead space
    pub fn write(&mut self, key: &str, value: impl Into<Value>, as_type: Option<TypeTag>) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_clean()?;

        let mut value = value.into();
        if let Some(target) = as_type {
            value = value.convert(target)?;
        }
        self.put(key, value)
    }

    /// Write a value in its own type
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.write(key, value, None)
    }

    /// Register a caller-defined type under `code` for this session
    ///
    /// Entries carrying `code` become visible to lookups, reads and dumps.
    /// Registrations are not stored in the file.
    pub fn register_type(&mut self, code: [u8; TAG_SIZE], ty: impl CustomType + 'static) -> Result<()> {
        let name = ty.name().to_string();
        if self.types.register(code, Arc::new(ty))?.is_some() {
            debug!(code = %String::from_utf8_lossy(&code), type_name = %name, "replaced registered type");
        } else {
            debug!(code = %String::from_utf8_lossy(&code), type_name = %name, "registered type");
        }
        Ok(())
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Write a value through the registered type for `code`
    ///
    /// Follows the same update policy as [`Database::write`].
    pub fn write_custom(&mut self, key: &str, code: [u8; TAG_SIZE], value: impl Into<Value>) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_clean()?;

        let ty = self
            .types
            .get(&code)
            .cloned()
            .ok_or_else(|| L2dbError::UnregisteredType(String::from_utf8_lossy(&code).into_owned()))?;
        let bytes = ty
            .encode(&value.into())
            .map_err(|reason| L2dbError::CustomType(format!("{}: {}", ty.name(), reason)))?;

        self.put_encoded(key, code, &bytes, None)
    }

    /// Remove a key; its value bytes become dead space
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_clean()?;

        let mut index = self.backend.take_index()?;
        let types = &self.types;
        let removed = index.remove_with(key, |code| types.is_recognized(code));
        let index_len = index.byte_len();
        self.backend.store_index(index)?;

        let removed = removed.ok_or_else(|| L2dbError::KeyNotFound(key.to_string()))?;
        debug!(key, range = ?removed.range(), "deleted entry");

        self.set_index_len(index_len)?;
        self.modified = true;
        Ok(())
    }

    /// Merge every entry of `other` into this database
    ///
    /// Keys already present are overwritten under the usual update policy.
    /// A serialized or file source is read through a read-only session;
    /// entries under tags it doesn't recognize come across as raw bytes.
    /// Returns the number of entries written.
    pub fn extend(&mut self, other: impl Into<Source>) -> Result<usize> {
        self.ensure_writable()?;
        self.ensure_clean()?;

        let entries: Vec<(String, Value)> = match other.into() {
            Source::Entries(entries) => entries,
            source => {
                let config = Config::builder()
                    .mode(OpenMode::read_only())
                    .strict(self.config.strict)
                    .build();
                let mut other = Database::open(source, config)?;
                let dump = other.dump()?;
                if other.is_dirty() {
                    warn!("merging from a dirty database; corrupted values are taken as read");
                }
                dump.into_iter().collect()
            }
        };

        // Reject bad keys before anything is written
        for (key, _) in &entries {
            format::validate_key(key)?;
        }
        let merged = entries.len();
        for (key, value) in entries {
            self.put(&key, value)?;
        }
        debug!(merged, "extended database");
        Ok(merged)
    }

    /// Delete each of `keys` that is present, ignoring the rest
    ///
    /// Returns the number of keys removed.
    pub fn remove_keys<I, K>(&mut self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.ensure_writable()?;
        self.ensure_clean()?;

        let mut removed = 0;
        for key in keys {
            let key = key.as_ref();
            if self.contains_key(key)? {
                self.delete(key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Decode every entry
    ///
    /// Does not change any stored data; like `read`, an anomaly marks the
    /// database dirty.
    pub fn dump(&mut self) -> Result<BTreeMap<String, Value>> {
        self.ensure_readable()?;

        let (entries, trailing) = {
            let index = self.backend.load_index()?;
            (index.entries().collect::<Vec<_>>(), index.trailing_bytes())
        };
        if trailing > 0 {
            self.mark_dirty("<index>", Anomaly::TrailingIndexBytes(trailing))?;
        }

        // Entries with a recognized tag shadow unrecognized ones for the
        // same key, matching what `find` resolves to
        let (recognized, unrecognized): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|e| self.types.is_recognized(&e.code));

        let mut out = BTreeMap::new();
        for entry in recognized.into_iter().chain(unrecognized) {
            let value = self.decode_entry(&entry)?;
            out.entry(entry.key).or_insert(value);
        }
        Ok(out)
    }

    /// Write the database to `target`, or to its own file
    ///
    /// With `move_to`, the session continues on `target` afterwards. A
    /// target naming the session's own file is flushed in place. Any other
    /// target is written to a temporary sibling and renamed over it once
    /// complete.
    pub fn flush(&mut self, target: Option<&Path>, move_to: bool) -> Result<()> {
        let path = match target {
            Some(path) if !self.is_own_file(path) => path,
            _ => return self.flush_in_place(),
        };

        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;

        match &mut self.backend {
            Backend::Memory(storage) => {
                tmp.write_all(&storage.serialize(&self.header))?;
            }
            Backend::File(storage) => {
                // The copy carries the on-disk header; patch in ours
                storage.copy_to(tmp.as_file_mut())?;
                tmp.seek(SeekFrom::Start(0))?;
                tmp.write_all(&self.header.encode())?;
            }
        }
        tmp.as_file().sync_all()?;
        let out = tmp.persist(path).map_err(|e| e.error)?;
        debug!(path = %path.display(), move_to, "flushed database");

        if move_to {
            self.switch_to(out, path)?;
        }
        Ok(())
    }

    /// Validate every entry, repair or discard corrupted ones, compact the
    /// value block and clear the dirty flag
    ///
    /// - `only_flag`: skip validation and compaction, just clear the flag
    /// - `discard_corrupted`: remove corrupted entries instead of rewriting
    ///   them (malformed booleans become `true`, malformed nulls `null`,
    ///   unknown tags raw bytes)
    pub fn cleanup(&mut self, only_flag: bool, discard_corrupted: bool) -> Result<CleanupReport> {
        self.ensure_writable()?;

        let report = if only_flag {
            CleanupReport::default()
        } else {
            let report = self.repair_and_compact(discard_corrupted)?;
            info!(
                repaired = report.repaired,
                discarded = report.discarded,
                reclaimed_bytes = report.reclaimed_bytes,
                trailing_index_bytes = report.trailing_index_bytes,
                "cleanup finished"
            );
            report
        };

        self.header.flags.remove(Flags::DIRTY);
        self.backend.write_header(&self.header)?;
        self.modified = true;
        Ok(report)
    }

    /// Flush pending changes and release the file handle
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.teardown()
    }

    /// Flush pending changes and hand back the file handle
    ///
    /// `None` for sessions without a file.
    pub fn into_handle(mut self) -> Result<Option<File>> {
        self.closed = true;
        self.teardown()?;

        let backend = mem::replace(&mut self.backend, Backend::Memory(MemoryStorage::default()));
        Ok(match backend {
            Backend::File(storage) => Some(storage.into_file()),
            Backend::Memory(_) => self.handle.take(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Serialize the current state into one buffer
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        match &mut self.backend {
            Backend::Memory(storage) => Ok(storage.serialize(&self.header)),
            Backend::File(storage) => {
                let mut out = Vec::new();
                storage.copy_to(&mut out)?;
                out[..HEADER_SIZE].copy_from_slice(&self.header.encode());
                Ok(out)
            }
        }
    }

    /// The index entry for `key`
    pub fn entry(&mut self, key: &str) -> Result<Option<IndexEntry>> {
        let types = &self.types;
        Ok(self
            .backend
            .load_index()?
            .find_with(key, |code| types.is_recognized(code)))
    }

    pub fn contains_key(&mut self, key: &str) -> Result<bool> {
        Ok(self.entry(key)?.is_some())
    }

    /// Keys in insertion order
    pub fn keys(&mut self) -> Result<Vec<String>> {
        Ok(self.backend.load_index()?.entries().map(|e| e.key).collect())
    }

    /// Number of entries
    pub fn len(&mut self) -> Result<usize> {
        Ok(self.backend.load_index()?.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Length of the value block, dead space included
    pub fn value_block_len(&mut self) -> Result<u64> {
        self.backend.value_len()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_dirty(&self) -> bool {
        self.header.is_dirty()
    }

    pub fn is_locked(&self) -> bool {
        self.header.is_locked()
    }

    /// Set or clear the advisory LOCKED bit
    ///
    /// Nothing in the engine checks it; coordinating writers is up to the
    /// caller.
    pub fn set_locked(&mut self, locked: bool) -> Result<()> {
        self.ensure_writable()?;
        self.header.flags.set(Flags::LOCKED, locked);
        self.backend.write_header(&self.header)?;
        self.modified = true;
        Ok(())
    }

    pub fn is_unbuffered(&self) -> bool {
        matches!(self.backend, Backend::File(_))
    }

    // =========================================================================
    // Private Helpers: opening
    // =========================================================================

    fn assemble(
        config: Config,
        header: Header,
        backend: Backend,
        origin: Origin,
        handle: Option<File>,
    ) -> Self {
        Self {
            config,
            header,
            backend,
            types: TypeRegistry::new(),
            origin,
            handle,
            modified: false,
            closed: false,
        }
    }

    fn open_path(path: &Path, mode: OpenMode) -> Result<File> {
        let mut options = OpenOptions::new();
        options.read(true);
        if mode.write {
            options.write(true).create(true);
        }
        Ok(options.open(path)?)
    }

    fn from_file(mut file: File, config: Config, origin: Origin) -> Result<Self> {
        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;

        if file_len == 0 && config.mode.write {
            return Self::create_in_file(file, config, origin);
        }

        if !config.mode.unbuffered {
            let mut bytes = Vec::with_capacity(file_len as usize);
            file.read_to_end(&mut bytes)?;
            return Self::from_buffer(bytes, config, origin, Some(file));
        }

        let mut raw_header = [0u8; HEADER_SIZE];
        file.read_exact(&mut raw_header).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => L2dbError::Syntax(format!(
                "Truncated header: expected {} bytes, got {}",
                HEADER_SIZE, file_len
            )),
            _ => L2dbError::Io(e),
        })?;
        let mut header = Header::decode(&raw_header, config.strict)?;

        let available = file_len - HEADER_SIZE as u64;
        let truncated = clamp_index_len(&mut header, available);

        let storage = FileStorage::open(file, &header, config.copy_buffer_size);
        let mut db = Self::assemble(config, header, Backend::File(storage), origin, None);
        if let Some(anomaly) = truncated {
            db.mark_dirty("<header>", anomaly)?;
        }
        Ok(db)
    }

    fn create_in_file(file: File, config: Config, origin: Origin) -> Result<Self> {
        let header = Header::new(config.initial_flags());
        debug!(wide = header.is_wide(), "initialising empty database file");

        if config.mode.unbuffered {
            let storage = FileStorage::create(file, &header, config.copy_buffer_size)?;
            Ok(Self::assemble(config, header, Backend::File(storage), origin, None))
        } else {
            let backend = Backend::Memory(MemoryStorage::new(header.is_wide()));
            let mut db = Self::assemble(config, header, backend, origin, Some(file));
            db.modified = true;
            Ok(db)
        }
    }

    fn from_buffer(bytes: Vec<u8>, config: Config, origin: Origin, handle: Option<File>) -> Result<Self> {
        if bytes.is_empty() && !config.strict {
            let header = Header::new(config.initial_flags());
            let backend = Backend::Memory(MemoryStorage::new(header.is_wide()));
            return Ok(Self::assemble(config, header, backend, origin, handle));
        }

        let mut header = Header::decode(&bytes, config.strict)?;
        let body = &bytes[HEADER_SIZE..];
        let truncated = clamp_index_len(&mut header, body.len() as u64);

        let (index, values) = body.split_at(header.index_len as usize);
        let index = Index::from_bytes(index.to_vec(), header.is_wide());
        let storage = MemoryStorage::from_parts(index, values.to_vec());

        let mut db = Self::assemble(config, header, Backend::Memory(storage), origin, handle);
        if let Some(anomaly) = truncated {
            db.mark_dirty("<header>", anomaly)?;
        }
        Ok(db)
    }

    // =========================================================================
    // Private Helpers: operations
    // =========================================================================

    fn ensure_readable(&self) -> Result<()> {
        if self.config.mode.read {
            Ok(())
        } else {
            Err(L2dbError::WriteOnly)
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.config.mode.write {
            Ok(())
        } else {
            Err(L2dbError::ReadOnly)
        }
    }

    fn ensure_clean(&self) -> Result<()> {
        if self.is_dirty() {
            Err(L2dbError::Dirty)
        } else {
            Ok(())
        }
    }

    fn find(&mut self, key: &str) -> Result<IndexEntry> {
        self.entry(key)?
            .ok_or_else(|| L2dbError::KeyNotFound(key.to_string()))
    }

    /// Store `value` under `key`, skipping mode and dirty checks
    fn put(&mut self, key: &str, value: Value) -> Result<()> {
        let encoded = encode_value(&value);
        self.put_encoded(key, *encoded.tag.code(), &encoded.bytes, encoded.anomaly)
    }

    fn put_encoded(
        &mut self,
        key: &str,
        code: [u8; TAG_SIZE],
        bytes: &[u8],
        anomaly: Option<Anomaly>,
    ) -> Result<()> {
        format::validate_key(key)?;

        let len = bytes.len() as u64;
        let types = &self.types;

        let (existing, index_len) = {
            let index = self.backend.load_index()?;
            let existing = index.find_with(key, |code| types.is_recognized(code));
            let index_len = index.byte_len() + index.entry_size(key);
            (existing, index_len)
        };
        let block_len = self.backend.value_len()?;

        let range = match existing {
            Some(entry) if len <= entry.value_len() && entry.start <= entry.end && entry.end <= block_len => {
                debug!(key, old = ?entry.range(), new_len = len, "updating value in place");
                self.backend.write_value(entry.start, bytes)?;
                entry.start..entry.start + len
            }
            existing => {
                if existing.is_none() && u32::try_from(index_len).is_err() {
                    return Err(L2dbError::Capacity(format!(
                        "index block would grow to {} bytes, beyond the 32-bit length field",
                        index_len
                    )));
                }
                if !self.header.is_wide() && block_len + len > u64::from(u32::MAX) {
                    return Err(L2dbError::Capacity(format!(
                        "value block would grow past {} bytes; use a wide index",
                        u32::MAX
                    )));
                }
                let start = self.backend.append_value(bytes)?;
                if let Some(old) = existing {
                    debug!(key, old = ?old.range(), new_start = start, new_len = len, "relocating value");
                }
                start..start + len
            }
        };

        let mut index = self.backend.take_index()?;
        let updated = index.upsert(key, code, range, |c| types.is_recognized(c));
        let index_len = index.byte_len();
        self.backend.store_index(index)?;
        updated?;

        self.set_index_len(index_len)?;
        self.modified = true;

        if let Some(anomaly) = anomaly {
            self.mark_dirty(key, anomaly)?;
        }
        Ok(())
    }

    /// Record a new index length in the header and persist it
    fn set_index_len(&mut self, index_len: usize) -> Result<()> {
        self.header.index_len = u32::try_from(index_len).map_err(|_| {
            L2dbError::Capacity(format!("index block of {} bytes exceeds 32 bits", index_len))
        })?;
        self.backend.write_header(&self.header)
    }

    /// Enter the dirty state
    fn mark_dirty(&mut self, key: &str, anomaly: Anomaly) -> Result<()> {
        warn!(key, %anomaly, "structural anomaly detected; database marked dirty");
        if self.is_dirty() {
            return Ok(());
        }
        self.header.flags.insert(Flags::DIRTY);
        self.modified = true;
        if self.config.mode.write {
            self.backend.write_header(&self.header)?;
        }
        Ok(())
    }

    fn decode_entry(&mut self, entry: &IndexEntry) -> Result<Value> {
        let block_len = self.backend.value_len()?;
        let decoded = self.fetch_decoded(entry, block_len)?;
        if let Some(anomaly) = decoded.anomaly {
            self.mark_dirty(&entry.key, anomaly)?;
        }
        Ok(decoded.value)
    }

    /// Read and decode an entry's value, treating a range outside the first
    /// `block_len` value bytes as an anomaly
    fn fetch_decoded(&mut self, entry: &IndexEntry, block_len: u64) -> Result<Decoded> {
        if entry.start <= entry.end && entry.end <= block_len {
            let bytes = self.backend.read_value(entry.range())?;
            return Ok(self.types.decode(&entry.code, &bytes));
        }

        let start = entry.start.min(block_len);
        let end = entry.end.clamp(start, block_len);
        let bytes = self.backend.read_value(start..end)?;
        let mut decoded = self.types.decode(&entry.code, &bytes);
        decoded.anomaly = Some(Anomaly::OutOfBounds {
            start: entry.start,
            end: entry.end,
            block_len,
        });
        Ok(decoded)
    }

    fn repair_and_compact(&mut self, discard_corrupted: bool) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        let (entries, wide) = {
            let index = self.backend.load_index()?;
            report.trailing_index_bytes = index.trailing_bytes();
            (index.entries().collect::<Vec<_>>(), index.is_wide())
        };
        let block_len = self.backend.value_len()?;

        // The entry `find` resolves to wins; later duplicates are dropped
        let mut resolved: HashMap<&str, usize> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            if self.types.is_recognized(&entry.code) {
                resolved.entry(entry.key.as_str()).or_insert(i);
            }
        }
        let mut seen: HashSet<&str> = HashSet::new();

        let mut live: Vec<(String, [u8; TAG_SIZE], Range<u64>)> = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let keep = match resolved.get(entry.key.as_str()) {
                Some(&winner) => winner == i,
                None => !seen.contains(entry.key.as_str()),
            };
            seen.insert(entry.key.as_str());
            if !keep {
                debug!(key = %entry.key, "dropping shadowed index entry");
                report.discarded += 1;
                continue;
            }

            let decoded = self.fetch_decoded(entry, block_len)?;
            let anomaly = match decoded.anomaly {
                None => {
                    live.push((entry.key.clone(), entry.code, entry.range()));
                    continue;
                }
                Some(anomaly) => anomaly,
            };

            if discard_corrupted {
                warn!(key = %entry.key, %anomaly, "discarding corrupted entry");
                report.discarded += 1;
                continue;
            }

            let value = repaired_value(decoded.value);
            warn!(key = %entry.key, %anomaly, repaired = %value, "repairing corrupted entry");
            let encoded = encode_value(&value);
            let start = self.backend.append_value(&encoded.bytes)?;
            live.push((
                entry.key.clone(),
                *encoded.tag.code(),
                start..start + encoded.bytes.len() as u64,
            ));
            report.repaired += 1;
        }

        let before = self.backend.value_len()?;
        let after = self.compact(&mut live)?;
        report.reclaimed_bytes = before.saturating_sub(after);

        let mut index = Index::new(wide);
        for (key, code, range) in &live {
            index.push_code(key, *code, range.clone())?;
        }
        let index_len = index.byte_len();
        self.backend.store_index(index)?;
        self.set_index_len(index_len)?;
        Ok(report)
    }

    /// Rewrite the value block densely, updating every live range
    ///
    /// Returns the new value block length.
    fn compact(&mut self, live: &mut [(String, [u8; TAG_SIZE], Range<u64>)]) -> Result<u64> {
        let mut order: Vec<usize> = (0..live.len()).collect();
        order.sort_by_key(|&i| live[i].2.start);

        let overlapping = order
            .windows(2)
            .any(|pair| live[pair[0]].2.end > live[pair[1]].2.start);

        let mut cursor = 0u64;
        if overlapping {
            // Ranges share bytes; a forward copy could clobber unread data
            warn!("overlapping value ranges; compacting through memory");
            let mut blobs = Vec::with_capacity(order.len());
            for &i in &order {
                blobs.push(self.backend.read_value(live[i].2.clone())?);
            }
            for (&i, blob) in order.iter().zip(blobs) {
                let len = blob.len() as u64;
                self.backend.write_value(cursor, &blob)?;
                live[i].2 = cursor..cursor + len;
                cursor += len;
            }
        } else {
            for &i in &order {
                let range = live[i].2.clone();
                let len = range.end - range.start;
                if range.start != cursor {
                    self.backend.copy_within(range, cursor)?;
                }
                live[i].2 = cursor..cursor + len;
                cursor += len;
            }
        }

        self.backend.truncate_values(cursor)?;
        Ok(cursor)
    }

    // =========================================================================
    // Private Helpers: persistence
    // =========================================================================

    fn flush_in_place(&mut self) -> Result<()> {
        self.ensure_writable()?;

        match &mut self.backend {
            Backend::Memory(storage) => {
                let file = self.handle.as_mut().ok_or(L2dbError::NoFileSpecified)?;
                let bytes = storage.serialize(&self.header);
                file.seek(SeekFrom::Start(0))?;
                file.write_all(&bytes)?;
                file.set_len(bytes.len() as u64)?;
                file.sync_all()?;
            }
            Backend::File(storage) => {
                storage.write_header(&self.header)?;
                storage.sync()?;
            }
        }

        debug!(origin = ?self.origin, "flushed database in place");
        self.modified = false;
        Ok(())
    }

    /// Continue the session on a freshly written copy
    /// Whether `path` names the file this session was opened from
    fn is_own_file(&self, path: &Path) -> bool {
        match &self.origin {
            Origin::Path(own) => match (own.canonicalize(), path.canonicalize()) {
                (Ok(own), Ok(target)) => own == target,
                _ => false,
            },
            _ => false,
        }
    }

    fn switch_to(&mut self, file: File, path: &Path) -> Result<()> {
        if self.is_unbuffered() {
            let storage = FileStorage::open(file, &self.header, self.config.copy_buffer_size);
            self.backend = Backend::File(storage);
        } else {
            self.handle = Some(file);
        }
        self.origin = Origin::Path(path.to_path_buf());
        self.modified = false;
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        let has_file = self.origin != Origin::Detached;
        if self.modified && has_file && self.config.mode.write {
            self.flush_in_place()?;
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.teardown() {
            warn!(error = %e, "failed to flush database on drop");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("header", &self.header)
            .field("mode", &self.config.mode)
            .field("origin", &self.origin)
            .field("unbuffered", &self.is_unbuffered())
            .field("modified", &self.modified)
            .finish()
    }
}

/// Shrink a declared index length that runs past the available bytes
fn clamp_index_len(header: &mut Header, available: u64) -> Option<Anomaly> {
    let declared = u64::from(header.index_len);
    if declared <= available {
        return None;
    }
    // available < declared <= u32::MAX
    header.index_len = available as u32;
    Some(Anomaly::TruncatedIndex {
        declared,
        available,
    })
}

/// The value a corrupted entry is rewritten with
///
/// The best-effort reading already is the safe default (`true` for
/// booleans, `null` for nulls, raw bytes for unknown tags); only a
/// NaN float has no stored form and becomes 0.0.
fn repaired_value(best_effort: Value) -> Value {
    match best_effort {
        Value::Float(f) if f.is_nan() => Value::Float(0.0),
        other => other,
    }
}
