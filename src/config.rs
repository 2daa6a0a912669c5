//! Configuration for L2DB
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::str::FromStr;

use crate::error::{L2dbError, Result};
use crate::format::Flags;

/// Main configuration for an L2DB session
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Access Configuration
    // -------------------------------------------------------------------------
    /// Which operations the session allows and how the file is accessed
    pub mode: OpenMode,

    /// Reject sources whose magic bytes don't match
    ///
    /// A non-strict session still refuses a different major spec version,
    /// since the layout itself may differ.
    pub strict: bool,

    // -------------------------------------------------------------------------
    // New Database Configuration
    // -------------------------------------------------------------------------
    /// Use 8-byte offsets in index entries (only for freshly created databases)
    pub wide_index: bool,

    /// Set the advisory LOCKED bit on freshly created databases
    pub locked: bool,

    // -------------------------------------------------------------------------
    // Unbuffered I/O Configuration
    // -------------------------------------------------------------------------
    /// Chunk size used when shifting or compacting file regions (in bytes)
    pub copy_buffer_size: usize,
}

/// Access mode of a session: a set drawn from {read, write, unbuffered}
///
/// Parses from a compact letter string: `r` read, `w` write, `f` direct
/// (unbuffered) file access. `"rw"` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    /// Keep only the header in memory; index and values stay on disk
    pub unbuffered: bool,
}

impl OpenMode {
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            unbuffered: false,
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            unbuffered: false,
        }
    }

    pub fn write_only() -> Self {
        Self {
            read: false,
            write: true,
            unbuffered: false,
        }
    }

    /// Switch to direct file access
    pub fn unbuffered(mut self) -> Self {
        self.unbuffered = true;
        self
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::read_write()
    }
}

impl FromStr for OpenMode {
    type Err = L2dbError;

    fn from_str(s: &str) -> Result<Self> {
        let mut mode = OpenMode {
            read: false,
            write: false,
            unbuffered: false,
        };
        for c in s.chars() {
            match c {
                'r' => mode.read = true,
                'w' => mode.write = true,
                'f' => mode.unbuffered = true,
                other => {
                    return Err(L2dbError::InvalidMode(format!(
                        "unknown mode letter {:?} in {:?} (expected r, w or f)",
                        other, s
                    )))
                }
            }
        }
        if !mode.read && !mode.write {
            return Err(L2dbError::InvalidMode(format!(
                "mode {:?} allows neither reading nor writing",
                s
            )));
        }
        Ok(mode)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.read {
            f.write_str("r")?;
        }
        if self.write {
            f.write_str("w")?;
        }
        if self.unbuffered {
            f.write_str("f")?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: OpenMode::default(),
            strict: true,
            wide_index: false,
            locked: false,
            copy_buffer_size: 64 * 1024, // 64 KiB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Header flags for a database created by this config
    pub fn initial_flags(&self) -> Flags {
        let mut flags = Flags::empty();
        flags.set(Flags::WIDE_INDEX, self.wide_index);
        flags.set(Flags::LOCKED, self.locked);
        flags
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the access mode
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Enable or disable magic validation
    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    /// Use 8-byte index offsets for new databases
    pub fn wide_index(mut self, wide: bool) -> Self {
        self.config.wide_index = wide;
        self
    }

    /// Set the advisory LOCKED bit on new databases
    pub fn locked(mut self, locked: bool) -> Self {
        self.config.locked = locked;
        self
    }

    /// Set the chunk size for unbuffered region copies (in bytes)
    pub fn copy_buffer_size(mut self, size: usize) -> Self {
        self.config.copy_buffer_size = size.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
