//! Type tag definitions
//!
//! The 3-byte ASCII code in every index entry that says how to decode the
//! entry's value bytes.

use std::fmt;
use std::str::FromStr;

use crate::error::{L2dbError, Result};

use super::TAG_SIZE;

/// Type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Raw bytes, stored as-is
    Raw,
    /// UTF-8 text
    Str,
    /// Signed integer, 1/2/4/8 bytes
    Int,
    /// Unsigned integer, 1/2/4/8 bytes
    UInt,
    /// Single or double precision float
    Float,
    /// One byte, 0x00 or 0x01
    Bool,
    /// One byte, 0x00
    Null,
    /// Marks a value known to be unusable
    Invalid,
}

impl TypeTag {
    pub const ALL: [TypeTag; 8] = [
        TypeTag::Raw,
        TypeTag::Str,
        TypeTag::Int,
        TypeTag::UInt,
        TypeTag::Float,
        TypeTag::Bool,
        TypeTag::Null,
        TypeTag::Invalid,
    ];

    /// The on-disk code
    pub fn code(self) -> &'static [u8; TAG_SIZE] {
        match self {
            TypeTag::Raw => b"raw",
            TypeTag::Str => b"str",
            TypeTag::Int => b"int",
            TypeTag::UInt => b"uin",
            TypeTag::Float => b"flt",
            TypeTag::Bool => b"bol",
            TypeTag::Null => b"nul",
            TypeTag::Invalid => b"inv",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Raw => "raw",
            TypeTag::Str => "str",
            TypeTag::Int => "int",
            TypeTag::UInt => "uin",
            TypeTag::Float => "flt",
            TypeTag::Bool => "bol",
            TypeTag::Null => "nul",
            TypeTag::Invalid => "inv",
        }
    }

    /// Look up a tag from its on-disk code
    pub fn from_code(code: &[u8]) -> Option<TypeTag> {
        TypeTag::ALL
            .into_iter()
            .find(|tag| tag.code().as_slice() == code)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = L2dbError;

    /// Accepts the 3-letter codes plus common long names
    fn from_str(s: &str) -> Result<Self> {
        let tag = match s.to_ascii_lowercase().as_str() {
            "raw" | "bytes" | "binary" => TypeTag::Raw,
            "str" | "string" | "text" => TypeTag::Str,
            "int" | "integer" | "i64" => TypeTag::Int,
            "uin" | "uint" | "unsigned" | "u64" => TypeTag::UInt,
            "flt" | "float" | "double" | "f64" => TypeTag::Float,
            "bol" | "bool" | "boolean" => TypeTag::Bool,
            "nul" | "null" | "none" => TypeTag::Null,
            "inv" | "invalid" => TypeTag::Invalid,
            _ => {
                return Err(L2dbError::Syntax(format!(
                    "unknown type name {:?}",
                    s
                )))
            }
        };
        Ok(tag)
    }
}
