//! Error types for L2DB
//!
//! Provides a unified error type for all operations.
//!
//! Decode-time anomalies (a boolean byte of `0x02`, an unknown type tag, a
//! float stored in 3 bytes) are not errors: a read returns a best-effort
//! value and flips the session dirty instead. See
//! [`crate::format::Anomaly`].

use thiserror::Error;

use crate::format::{SpecVersion, TypeTag};

/// Result type alias using L2dbError
pub type Result<T> = std::result::Result<T, L2dbError>;

/// Unified error type for L2DB operations
#[derive(Debug, Error)]
pub enum L2dbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Spec version mismatch: engine supports major version {expected}, database is {actual}")]
    VersionMismatch {
        expected: u16,
        actual: SpecVersion,
    },

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    // -------------------------------------------------------------------------
    // Key / Value Errors
    // -------------------------------------------------------------------------
    #[error("Key not found: {0:?}")]
    KeyNotFound(String),

    #[error("Invalid key {0:?}: key names must not contain NUL bytes")]
    InvalidKey(String),

    #[error("Could not convert {from} value to {to}: {reason}")]
    TypeConversion {
        from: TypeTag,
        to: TypeTag,
        reason: String,
    },

    #[error("No type registered for tag {0:?}")]
    UnregisteredType(String),

    #[error("Custom type error: {0}")]
    CustomType(String),

    // -------------------------------------------------------------------------
    // Session Errors
    // -------------------------------------------------------------------------
    #[error("Database is dirty; run cleanup before writing")]
    Dirty,

    #[error("Database was opened read-only")]
    ReadOnly,

    #[error("Database was opened write-only")]
    WriteOnly,

    #[error("Unsupported source: {0}")]
    InvalidSource(String),

    #[error("Invalid open mode: {0}")]
    InvalidMode(String),

    #[error("No file specified to flush to")]
    NoFileSpecified,
}

impl L2dbError {
    pub(crate) fn conversion(from: TypeTag, to: TypeTag, reason: impl Into<String>) -> Self {
        L2dbError::TypeConversion {
            from,
            to,
            reason: reason.into(),
        }
    }
}
