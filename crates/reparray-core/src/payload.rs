//! Payload capabilities: decoding stored bytes and reading their properties.
//!
//! The array never inspects payloads itself. Sorting and statistics go
//! through a [`PayloadDecoder`] that turns bytes plus a [`TypeTag`] into a
//! [`Reflect`] value, which lists its numeric properties and exports any
//! property as text.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::entry::{Payload, TypeTag};
use crate::error::{DecodeError, EncodeError};

/// A numeric property read from a decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericProperty {
    pub name: String,
    pub type_name: String,
    pub value: f64,
}

impl NumericProperty {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value,
        }
    }
}

/// A property exported as text, together with its type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyText {
    pub type_name: String,
    pub text: String,
}

/// Property access for one decoded payload type.
///
/// Implementations must be side-effect free.
pub trait Reflect {
    /// Every numeric property with its current value.
    fn numeric_properties(&self) -> Vec<NumericProperty>;

    /// Export a single property as text, or `None` if the type has no such property.
    fn export_property(&self, name: &str) -> Option<PropertyText>;
}

/// Reconstructs payloads into reflectable values.
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, payload: &Payload, type_tag: &TypeTag) -> Result<Box<dyn Reflect>, DecodeError>;
}

// ============================================================================
// JSON object payloads
// ============================================================================

/// Decoder for payloads that are JSON objects, regardless of type tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloads;

impl JsonPayloads {
    /// Encode any serializable value as a JSON payload.
    pub fn encode<T: Serialize>(value: &T) -> Result<Payload, EncodeError> {
        Ok(Payload::new(serde_json::to_vec(value)?))
    }
}

impl PayloadDecoder for JsonPayloads {
    fn decode(&self, payload: &Payload, _type_tag: &TypeTag) -> Result<Box<dyn Reflect>, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }
        match serde_json::from_slice::<Value>(payload.as_bytes())? {
            Value::Object(map) => Ok(Box::new(JsonObject(map))),
            _ => Err(DecodeError::NotAnObject),
        }
    }
}

/// A decoded JSON object. Top-level fields are its properties.
#[derive(Debug, Clone)]
pub struct JsonObject(serde_json::Map<String, Value>);

impl JsonObject {
    fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }
}

fn number_type_name(n: &serde_json::Number) -> &'static str {
    if n.is_i64() {
        "i64"
    } else if n.is_u64() {
        "u64"
    } else {
        "f64"
    }
}

impl Reflect for JsonObject {
    fn numeric_properties(&self) -> Vec<NumericProperty> {
        self.0
            .iter()
            .filter_map(|(name, value)| match value {
                Value::Number(n) => n
                    .as_f64()
                    .map(|v| NumericProperty::new(name.clone(), number_type_name(n), v)),
                _ => None,
            })
            .collect()
    }

    fn export_property(&self, name: &str) -> Option<PropertyText> {
        let (type_name, text) = match self.field(name)? {
            Value::Null => return None,
            Value::Bool(b) => ("bool", b.to_string()),
            Value::Number(n) => (number_type_name(n), n.to_string()),
            Value::String(s) => ("string", s.clone()),
            v @ Value::Array(_) => ("array", v.to_string()),
            v @ Value::Object(_) => ("object", v.to_string()),
        };
        Some(PropertyText {
            type_name: type_name.to_string(),
            text,
        })
    }
}

// ============================================================================
// Typed MessagePack payloads
// ============================================================================

type DecodeFn = Box<dyn Fn(&[u8]) -> Result<Box<dyn Reflect>, DecodeError> + Send + Sync>;

/// Registry of concrete Rust payload types, keyed by type tag.
///
/// Payloads are MessagePack with named fields.
#[derive(Default)]
pub struct TypedPayloads {
    decoders: HashMap<String, DecodeFn>,
}

impl TypedPayloads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `tag`. Re-registering a tag replaces the decoder.
    pub fn register<T>(&mut self, tag: &TypeTag)
    where
        T: DeserializeOwned + Reflect + 'static,
    {
        let decode: DecodeFn = Box::new(|bytes: &[u8]| -> Result<Box<dyn Reflect>, DecodeError> {
            let value: T = rmp_serde::from_slice(bytes)?;
            Ok(Box::new(value))
        });
        self.decoders.insert(tag.as_str().to_string(), decode);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with<T>(mut self, tag: &TypeTag) -> Self
    where
        T: DeserializeOwned + Reflect + 'static,
    {
        self.register::<T>(tag);
        self
    }

    pub fn is_registered(&self, tag: &TypeTag) -> bool {
        self.decoders.contains_key(tag.as_str())
    }

    /// Encode a value as a MessagePack payload.
    pub fn encode<T: Serialize>(value: &T) -> Result<Payload, EncodeError> {
        Ok(Payload::new(rmp_serde::to_vec_named(value)?))
    }
}

impl std::fmt::Debug for TypedPayloads {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedPayloads")
            .field("types", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PayloadDecoder for TypedPayloads {
    fn decode(&self, payload: &Payload, type_tag: &TypeTag) -> Result<Box<dyn Reflect>, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }
        let decode = self
            .decoders
            .get(type_tag.as_str())
            .ok_or_else(|| DecodeError::UnknownType(type_tag.to_string()))?;
        decode(payload.as_bytes())
    }
}
