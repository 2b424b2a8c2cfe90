//! Generic wire value tree.
//!
//! Every message field is decoded into a [`WireValue`] by the serialization
//! collaborator before the codec sees it. The tree is format neutral: it
//! implements serde's `Serialize`/`Deserialize` so JSON, MessagePack or any
//! other serde format can carry it.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// String-keyed map of wire values (`dict` in protocol terms).
pub type WireMap = BTreeMap<String, WireValue>;

/// Largest integer safely representable by every WAMP peer (2^53).
pub const MAX_SAFE_INTEGER: i64 = 1 << 53;

/// Decoded form of a single field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WireValue {
    // ---
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<WireValue>),
    Map(WireMap),
}

impl WireValue {
    // ---

    /// Short name of the variant, used in decode errors.
    pub fn type_name(&self) -> &'static str {
        // ---
        match self {
            WireValue::Null => "null",
            WireValue::Bool(_) => "bool",
            WireValue::Integer(_) => "integer",
            WireValue::Float(_) => "float",
            WireValue::String(_) => "string",
            WireValue::List(_) => "list",
            WireValue::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Integer(i) => Some(*i as f64),
            WireValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Interpret the value as a protocol id (integer in `0..=2^53`).
    pub fn as_id(&self) -> Option<u64> {
        // ---
        match self {
            WireValue::Integer(i) if (0..=MAX_SAFE_INTEGER).contains(i) => Some(*i as u64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<WireValue>> {
        match self {
            WireValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&WireMap> {
        match self {
            WireValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key when the value is a map.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Convert any serializable value into a wire value.
    ///
    /// # Errors
    ///
    /// Returns the serde error if `value` cannot be represented (e.g. a map
    /// with non-string keys).
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        // ---
        let json = serde_json::to_value(value)?;
        serde_json::from_value(json)
    }

    /// Convert this wire value into a typed value.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the shape does not match `T`.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        // ---
        let json = serde_json::to_value(self)?;
        serde_json::from_value(json)
    }
}

// --- conversions

impl From<bool> for WireValue {
    fn from(v: bool) -> Self {
        WireValue::Bool(v)
    }
}

impl From<i32> for WireValue {
    fn from(v: i32) -> Self {
        WireValue::Integer(i64::from(v))
    }
}

impl From<i64> for WireValue {
    fn from(v: i64) -> Self {
        WireValue::Integer(v)
    }
}

impl From<u32> for WireValue {
    fn from(v: u32) -> Self {
        WireValue::Integer(i64::from(v))
    }
}

impl From<u64> for WireValue {
    fn from(v: u64) -> Self {
        // ---
        match i64::try_from(v) {
            Ok(i) => WireValue::Integer(i),
            Err(_) => WireValue::Float(v as f64),
        }
    }
}

impl From<f64> for WireValue {
    fn from(v: f64) -> Self {
        WireValue::Float(v)
    }
}

impl From<&str> for WireValue {
    fn from(v: &str) -> Self {
        WireValue::String(v.to_owned())
    }
}

impl From<String> for WireValue {
    fn from(v: String) -> Self {
        WireValue::String(v)
    }
}

impl<T: Into<WireValue>> From<Vec<T>> for WireValue {
    fn from(v: Vec<T>) -> Self {
        WireValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<WireMap> for WireValue {
    fn from(v: WireMap) -> Self {
        WireValue::Map(v)
    }
}

impl<T: Into<WireValue>> From<Option<T>> for WireValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(WireValue::Null, Into::into)
    }
}

// --- serde

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // ---
        match self {
            WireValue::Null => serializer.serialize_unit(),
            WireValue::Bool(b) => serializer.serialize_bool(*b),
            WireValue::Integer(i) => serializer.serialize_i64(*i),
            WireValue::Float(f) => serializer.serialize_f64(*f),
            WireValue::String(s) => serializer.serialize_str(s),
            WireValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            WireValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

struct WireValueVisitor;

impl<'de> Visitor<'de> for WireValueVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a WAMP wire value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<WireValue, D::Error> {
        WireValue::deserialize(d)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<WireValue, E> {
        Ok(WireValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<WireValue, E> {
        Ok(WireValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<WireValue, E> {
        Ok(WireValue::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<WireValue, E> {
        Ok(WireValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<WireValue, E> {
        Ok(WireValue::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<WireValue, E> {
        Ok(WireValue::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireValue, A::Error> {
        // ---
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(WireValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<WireValue, A::Error> {
        // ---
        let mut map = WireMap::new();
        while let Some((k, v)) = access.next_entry::<String, WireValue>()? {
            map.insert(k, v);
        }
        Ok(WireValue::Map(map))
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WireValueVisitor)
    }
}
