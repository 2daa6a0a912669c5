//! Caller-defined value types
//!
//! A session recognizes the built-in type tags plus any tag registered
//! here. Each registered tag maps to a [`CustomType`] that turns values
//! into stored bytes and back. Registering only widens the set of
//! recognized tags; registration order has no effect.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{L2dbError, Result};

use super::{decode_tagged, Anomaly, Decoded, TypeTag, Value, TAG_SIZE};

/// Encoding rules for a value type the built-in codec doesn't know
pub trait CustomType: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Stored bytes for `value`, or why it can't be represented
    fn encode(&self, value: &Value) -> std::result::Result<Vec<u8>, String>;

    /// Value for stored bytes; `None` marks them malformed
    fn decode(&self, bytes: &[u8]) -> Option<Value>;
}

/// Registered custom types, keyed by their 3-byte tag code
#[derive(Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<[u8; TAG_SIZE], Arc<dyn CustomType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ty` under `code`, returning the type it replaces
    ///
    /// Built-in codes can't be taken over.
    pub fn register(
        &mut self,
        code: [u8; TAG_SIZE],
        ty: Arc<dyn CustomType>,
    ) -> Result<Option<Arc<dyn CustomType>>> {
        if TypeTag::from_code(&code).is_some() {
            return Err(L2dbError::CustomType(format!(
                "{:?} is a built-in type tag",
                String::from_utf8_lossy(&code)
            )));
        }
        Ok(self.types.insert(code, ty))
    }

    pub fn unregister(&mut self, code: &[u8; TAG_SIZE]) -> Option<Arc<dyn CustomType>> {
        self.types.remove(code)
    }

    pub fn get(&self, code: &[u8]) -> Option<&Arc<dyn CustomType>> {
        self.types.get(code)
    }

    /// Whether entries tagged `code` are visible to lookups
    pub fn is_recognized(&self, code: &[u8]) -> bool {
        TypeTag::from_code(code).is_some() || self.types.contains_key(code)
    }

    /// Registered codes in byte order
    pub fn codes(&self) -> impl Iterator<Item = &[u8; TAG_SIZE]> {
        self.types.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Decode bytes stored under `code`, consulting registered types first
    ///
    /// Bytes a custom type rejects come back raw, with an anomaly.
    pub fn decode(&self, code: &[u8; TAG_SIZE], bytes: &[u8]) -> Decoded {
        match self.types.get(code.as_slice()) {
            Some(ty) => match ty.decode(bytes) {
                Some(value) => Decoded {
                    value,
                    anomaly: None,
                },
                None => Decoded {
                    value: Value::Raw(bytes.to_vec()),
                    anomaly: Some(Anomaly::MalformedCustom {
                        name: ty.name().to_string(),
                    }),
                },
            },
            None => decode_tagged(code, bytes),
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.types
                    .iter()
                    .map(|(code, ty)| (String::from_utf8_lossy(code), ty.name())),
            )
            .finish()
    }
}

