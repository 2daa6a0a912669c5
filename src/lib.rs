//! # L2DB
//!
//! A compact, single-file binary key-value store with:
//! - A fixed 64-byte header carrying version and flags
//! - A packed index of `[start][end][tag][key\0]` entries
//! - Typed values in their minimal big-endian encoding
//! - A dirty flag that fences writes after a structural anomaly
//! - Buffered (in-memory) or unbuffered (direct file) sessions
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Database (session)                        │
//! │        read / write / delete / dump / flush / cleanup       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Format    │          │   Storage   │
//!   │ header,index│          │ memory/file │
//!   │ value codec │          │  backends   │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use l2db::{Config, Database, Source, Value};
//!
//! let mut db = Database::open(Source::entries([("hello", "world")]), Config::default())?;
//! db.set("n", 42i64)?;
//! assert_eq!(db.get("hello")?, Value::from("world"));
//! assert_eq!(db.get("n")?, Value::Int(42));
//! # Ok::<(), l2db::L2dbError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod format;
pub mod storage;
pub mod database;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{L2dbError, Result};
pub use config::{Config, ConfigBuilder, OpenMode};
pub use database::{CleanupReport, Database, Source};
pub use format::{CustomType, Flags, Header, TypeRegistry, TypeTag, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the l2db crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
