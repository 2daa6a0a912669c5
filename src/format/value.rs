//! Value definitions
//!
//! The typed value domain stored in an L2DB file, plus explicit
//! conversions between types.

use std::fmt;

use serde::Serialize;

use crate::error::{L2dbError, Result};

use super::{decode_value, encode_value, TypeTag};

/// A typed value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Raw(Vec<u8>),
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Value {
    /// The tag this value is stored under
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Raw(_) => TypeTag::Raw,
            Value::Str(_) => TypeTag::Str,
            Value::Int(_) => TypeTag::Int,
            Value::UInt(_) => TypeTag::UInt,
            Value::Float(_) => TypeTag::Float,
            Value::Bool(_) => TypeTag::Bool,
            Value::Null => TypeTag::Null,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert to another type
    ///
    /// Supported pairs:
    /// - anything → raw (its stored encoding), anything → str (its text form)
    /// - raw → any type, by decoding the bytes under that type's strict rule
    /// - str → int/uin/flt/bol/nul, by parsing
    /// - int ↔ uin ↔ flt when the value is exactly representable
    /// - bol ↔ int/uin/flt as 0 and 1
    ///
    /// Nothing converts to `inv`.
    pub fn convert(self, target: TypeTag) -> Result<Value> {
        let from = self.type_tag();
        if from == target {
            return Ok(self);
        }
        let fail = |reason: &str| Err(L2dbError::conversion(from, target, reason));

        match (self, target) {
            (_, TypeTag::Invalid) => fail("no value can be stored as inv"),

            (value, TypeTag::Raw) => Ok(Value::Raw(encode_value(&value).bytes)),
            (Value::Raw(bytes), TypeTag::Str) => match String::from_utf8(bytes) {
                Ok(text) => Ok(Value::Str(text)),
                Err(_) => fail("bytes are not valid UTF-8"),
            },
            (Value::Raw(bytes), target) => {
                let decoded = decode_value(target, &bytes);
                match decoded.anomaly {
                    None => Ok(decoded.value),
                    Some(anomaly) => fail(&anomaly.to_string()),
                }
            }
            (value, TypeTag::Str) => Ok(Value::Str(value.to_string())),

            (Value::Str(text), target) => parse_text(text.trim(), target)
                .ok_or_else(|| L2dbError::conversion(from, target, format!("cannot parse {:?}", text))),

            (Value::Int(n), TypeTag::UInt) => match u64::try_from(n) {
                Ok(n) => Ok(Value::UInt(n)),
                Err(_) => fail("negative value"),
            },
            (Value::UInt(n), TypeTag::Int) => match i64::try_from(n) {
                Ok(n) => Ok(Value::Int(n)),
                Err(_) => fail("value exceeds the signed 64-bit range"),
            },
            (Value::Int(n), TypeTag::Float) => {
                let f = n as f64;
                if f as i64 == n && f != 9_223_372_036_854_775_808.0 {
                    Ok(Value::Float(f))
                } else {
                    fail("value loses precision as a float")
                }
            }
            (Value::UInt(n), TypeTag::Float) => {
                let f = n as f64;
                if f as u64 == n && f != 18_446_744_073_709_551_616.0 {
                    Ok(Value::Float(f))
                } else {
                    fail("value loses precision as a float")
                }
            }
            (Value::Float(f), TypeTag::Int) => {
                if f.fract() == 0.0 && f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0 {
                    Ok(Value::Int(f as i64))
                } else {
                    fail("not an integral value in the signed 64-bit range")
                }
            }
            (Value::Float(f), TypeTag::UInt) => {
                if f.fract() == 0.0 && f >= 0.0 && f < 18_446_744_073_709_551_616.0 {
                    Ok(Value::UInt(f as u64))
                } else {
                    fail("not an integral value in the unsigned 64-bit range")
                }
            }

            (Value::Bool(b), TypeTag::Int) => Ok(Value::Int(i64::from(b))),
            (Value::Bool(b), TypeTag::UInt) => Ok(Value::UInt(u64::from(b))),
            (Value::Bool(b), TypeTag::Float) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
            (Value::Int(n), TypeTag::Bool) => int_to_bool(i128::from(n)).map_or_else(|| fail("only 0 and 1 convert to bol"), Ok),
            (Value::UInt(n), TypeTag::Bool) => int_to_bool(i128::from(n)).map_or_else(|| fail("only 0 and 1 convert to bol"), Ok),
            (Value::Float(f), TypeTag::Bool) => {
                if f == 0.0 {
                    Ok(Value::Bool(false))
                } else if f == 1.0 {
                    Ok(Value::Bool(true))
                } else {
                    fail("only 0 and 1 convert to bol")
                }
            }

            _ => fail("unsupported conversion"),
        }
    }
}

fn int_to_bool(n: i128) -> Option<Value> {
    match n {
        0 => Some(Value::Bool(false)),
        1 => Some(Value::Bool(true)),
        _ => None,
    }
}

fn parse_text(text: &str, target: TypeTag) -> Option<Value> {
    match target {
        TypeTag::Int => text.parse().ok().map(Value::Int),
        TypeTag::UInt => text.parse().ok().map(Value::UInt),
        TypeTag::Float => text.parse().ok().map(Value::Float),
        TypeTag::Bool => match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(Value::Bool(true)),
            "false" | "0" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
        TypeTag::Null => match text {
            "" | "null" | "none" => Some(Value::Null),
            _ => None,
        },
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Raw(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{}", n),
            Value::UInt(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => f.write_str("null"),
        }
    }
}

// =============================================================================
// Conversions from Rust types
// =============================================================================

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Raw(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Raw(b)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $wide:ty: $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::$variant(<$wide>::from(n))
                }
            }
        )*
    };
}

impl_from_int!(Int, i64: i8, i16, i32, i64);
impl_from_int!(UInt, u64: u8, u16, u32, u64);
