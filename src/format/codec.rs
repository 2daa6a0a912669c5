//! Value codec
//!
//! Converts typed values to and from their minimal binary encodings.
//!
//! ## Encodings
//! - str: UTF-8 bytes, no terminator
//! - raw: stored byte-for-byte
//! - bol: one byte, 0x00 = false, 0x01 = true
//! - nul: one byte, 0x00
//! - int: big-endian two's complement in the smallest of 1/2/4/8 bytes
//! - uin: big-endian in the smallest of 1/2/4/8 bytes
//! - flt: 4-byte single precision when exact, otherwise 8-byte double
//!
//! The width of a number is never stored separately; it is implied by the
//! length of the entry's value range.
//!
//! Decoding never fails. A stored byte pattern that breaks its type's rule
//! yields a best-effort value plus an [`Anomaly`], which the session turns
//! into the dirty state.

use thiserror::Error;

use super::{TypeTag, Value, TAG_SIZE};

// =============================================================================
// Anomalies
// =============================================================================

/// A structural problem found while decoding stored data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Anomaly {
    #[error("boolean is not a single 0x00/0x01 byte")]
    MalformedBool,

    #[error("null is not a single 0x00 byte")]
    MalformedNull,

    #[error("no {tag} decoding for a {len}-byte value")]
    BadLength { tag: TypeTag, len: usize },

    #[error("text is not valid UTF-8")]
    InvalidUtf8,

    #[error("unrecognized type tag {0:?}")]
    UnknownTag([u8; TAG_SIZE]),

    #[error("stored bytes are not a valid {name} value")]
    MalformedCustom { name: String },

    #[error("NaN has no stored representation")]
    NotANumber,

    #[error("value range {start}..{end} lies outside the {block_len}-byte value block")]
    OutOfBounds { start: u64, end: u64, block_len: u64 },

    #[error("{0} trailing index bytes do not form an entry")]
    TrailingIndexBytes(usize),

    #[error("header declares a {declared}-byte index but only {available} bytes follow")]
    TruncatedIndex { declared: u64, available: u64 },
}

/// Output of [`encode_value`]
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub tag: TypeTag,
    pub bytes: Vec<u8>,
    /// Set when the value could only be stored as a marker
    pub anomaly: Option<Anomaly>,
}

/// Output of [`decode_value`]
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The value, or the best-effort reading when `anomaly` is set
    pub value: Value,
    pub anomaly: Option<Anomaly>,
}

impl Decoded {
    fn clean(value: Value) -> Self {
        Self {
            value,
            anomaly: None,
        }
    }

    fn flawed(value: Value, anomaly: Anomaly) -> Self {
        Self {
            value,
            anomaly: Some(anomaly),
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value into its tag and minimal byte representation
pub fn encode_value(value: &Value) -> Encoded {
    let tag = value.type_tag();
    let mut anomaly = None;

    let bytes = match value {
        Value::Raw(bytes) => bytes.clone(),
        Value::Str(text) => text.as_bytes().to_vec(),
        Value::Int(n) => encode_int(*n),
        Value::UInt(n) => encode_uint(*n),
        Value::Float(f) => match encode_float(*f) {
            Some(bytes) => bytes,
            None => {
                anomaly = Some(Anomaly::NotANumber);
                Vec::new()
            }
        },
        Value::Bool(b) => vec![u8::from(*b)],
        Value::Null => vec![0x00],
    };

    Encoded {
        tag,
        bytes,
        anomaly,
    }
}

/// Smallest of 1/2/4/8 bytes whose signed range holds `n`
fn encode_int(n: i64) -> Vec<u8> {
    if let Ok(n) = i8::try_from(n) {
        n.to_be_bytes().to_vec()
    } else if let Ok(n) = i16::try_from(n) {
        n.to_be_bytes().to_vec()
    } else if let Ok(n) = i32::try_from(n) {
        n.to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

/// Smallest of 1/2/4/8 bytes whose unsigned range holds `n`
fn encode_uint(n: u64) -> Vec<u8> {
    if let Ok(n) = u8::try_from(n) {
        vec![n]
    } else if let Ok(n) = u16::try_from(n) {
        n.to_be_bytes().to_vec()
    } else if let Ok(n) = u32::try_from(n) {
        n.to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

/// Single precision when the value survives the round trip, else double.
/// `None` for NaN.
fn encode_float(f: f64) -> Option<Vec<u8>> {
    if f.is_nan() {
        return None;
    }
    let single = f as f32;
    if f64::from(single) == f {
        Some(single.to_be_bytes().to_vec())
    } else {
        Some(f.to_be_bytes().to_vec())
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode bytes stored under a raw 3-byte tag code
///
/// Unknown codes (and `inv`) come back as raw bytes with an anomaly.
pub fn decode_tagged(code: &[u8; TAG_SIZE], bytes: &[u8]) -> Decoded {
    match TypeTag::from_code(code) {
        Some(tag) => decode_value(tag, bytes),
        None => Decoded::flawed(Value::Raw(bytes.to_vec()), Anomaly::UnknownTag(*code)),
    }
}

/// Decode bytes stored under `tag`
pub fn decode_value(tag: TypeTag, bytes: &[u8]) -> Decoded {
    match tag {
        TypeTag::Raw => Decoded::clean(Value::Raw(bytes.to_vec())),
        TypeTag::Str => match std::str::from_utf8(bytes) {
            Ok(text) => Decoded::clean(Value::Str(text.to_string())),
            Err(_) => Decoded::flawed(
                Value::Str(String::from_utf8_lossy(bytes).into_owned()),
                Anomaly::InvalidUtf8,
            ),
        },
        TypeTag::Int => decode_int(bytes),
        TypeTag::UInt => decode_uint(bytes),
        TypeTag::Float => decode_float(bytes),
        TypeTag::Bool => match bytes {
            [0x00] => Decoded::clean(Value::Bool(false)),
            [0x01] => Decoded::clean(Value::Bool(true)),
            _ => Decoded::flawed(Value::Bool(true), Anomaly::MalformedBool),
        },
        TypeTag::Null => match bytes {
            [0x00] => Decoded::clean(Value::Null),
            _ => Decoded::flawed(Value::Null, Anomaly::MalformedNull),
        },
        TypeTag::Invalid => Decoded::flawed(
            Value::Raw(bytes.to_vec()),
            Anomaly::UnknownTag(*TypeTag::Invalid.code()),
        ),
    }
}

fn decode_int(bytes: &[u8]) -> Decoded {
    let n = match *bytes {
        [a] => i64::from(i8::from_be_bytes([a])),
        [a, b] => i64::from(i16::from_be_bytes([a, b])),
        [a, b, c, d] => i64::from(i32::from_be_bytes([a, b, c, d])),
        [a, b, c, d, e, f, g, h] => i64::from_be_bytes([a, b, c, d, e, f, g, h]),
        _ => {
            // Best effort: sign-extend whatever fits in 8 bytes
            let tail = &bytes[bytes.len().saturating_sub(8)..];
            let fill = match tail.first() {
                Some(first) if first & 0x80 != 0 => 0xFF,
                _ => 0x00,
            };
            let mut buf = [fill; 8];
            buf[8 - tail.len()..].copy_from_slice(tail);
            return Decoded::flawed(
                Value::Int(i64::from_be_bytes(buf)),
                Anomaly::BadLength {
                    tag: TypeTag::Int,
                    len: bytes.len(),
                },
            );
        }
    };
    Decoded::clean(Value::Int(n))
}

fn decode_uint(bytes: &[u8]) -> Decoded {
    // Zero-extend on the left, any length from 1 to 8 bytes is accepted
    let tail = &bytes[bytes.len().saturating_sub(8)..];
    let mut buf = [0u8; 8];
    buf[8 - tail.len()..].copy_from_slice(tail);
    let n = u64::from_be_bytes(buf);

    if bytes.is_empty() || bytes.len() > 8 {
        return Decoded::flawed(
            Value::UInt(n),
            Anomaly::BadLength {
                tag: TypeTag::UInt,
                len: bytes.len(),
            },
        );
    }
    Decoded::clean(Value::UInt(n))
}

fn decode_float(bytes: &[u8]) -> Decoded {
    match *bytes {
        [a, b, c, d] => Decoded::clean(Value::Float(f64::from(f32::from_be_bytes([a, b, c, d])))),
        [a, b, c, d, e, f, g, h] => {
            Decoded::clean(Value::Float(f64::from_be_bytes([a, b, c, d, e, f, g, h])))
        }
        [] => Decoded::flawed(Value::Float(f64::NAN), Anomaly::NotANumber),
        _ => Decoded::flawed(
            Value::Float(f64::NAN),
            Anomaly::BadLength {
                tag: TypeTag::Float,
                len: bytes.len(),
            },
        ),
    }
}
