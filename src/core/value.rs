//! Document values
//!
//! Maps are `im::OrdMap`, so they iterate and serialize in key order. A
//! document read back from a snapshot has its keys sorted; insertion order
//! is not kept.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Ordered list container. Clones share structure, so a reader can hold a
/// copy while the writer keeps mutating its own.
pub type List = im::Vector<Value>;

/// String-keyed map container, iterated in key order.
pub type Map = im::OrdMap<String, Value>;

/// Deepest container nesting a stored document may reach, counting the
/// root map. Kept below serde_json's parser recursion limit so every
/// snapshot and journal record can be read back.
pub const MAX_NESTING_DEPTH: usize = 100;

/// A node of a JSON-compatible document tree.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(List),
    Map(Map),
}

impl Value {
    pub fn empty_map() -> Self {
        Self::Map(Map::new())
    }

    pub fn empty_list() -> Self {
        Self::List(List::new())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Checks that the value survives a JSON round trip when stored under
    /// `enclosing` containers: floats must be finite and the nesting must
    /// stay within [`MAX_NESTING_DEPTH`].
    pub fn check_storable(&self, enclosing: usize) -> crate::core::Result<()> {
        if enclosing > MAX_NESTING_DEPTH {
            return Err(too_deep());
        }
        let mut pending = vec![(self, enclosing)];
        while let Some((node, level)) = pending.pop() {
            match node {
                Self::Float(f) if !f.is_finite() => {
                    return Err(crate::core::StoreError::Value(format!(
                        "{} has no JSON encoding",
                        f
                    )));
                }
                Self::List(items) => {
                    if level >= MAX_NESTING_DEPTH {
                        return Err(too_deep());
                    }
                    pending.extend(items.iter().map(|item| (item, level + 1)));
                }
                Self::Map(map) => {
                    if level >= MAX_NESTING_DEPTH {
                        return Err(too_deep());
                    }
                    pending.extend(map.values().map(|item| (item, level + 1)));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Encodes the value as compact JSON text.
    pub fn to_json_string(&self) -> String {
        self.to_string()
    }

    /// Encodes the value as indented JSON text.
    pub fn to_json_pretty(&self) -> crate::core::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(text: &str) -> crate::core::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_slice(bytes: &[u8]) -> crate::core::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn too_deep() -> crate::core::StoreError {
    crate::core::StoreError::Value(format!(
        "document nesting exceeds {} levels",
        MAX_NESTING_DEPTH
    ))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            // NaN never survives a JSON round trip, but keep equality reflexive
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Value, D::Error> {
        Deserialize::deserialize(d)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> std::result::Result<Value, E> {
        Ok(Value::Boolean(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> std::result::Result<Value, E> {
        Ok(Value::Integer(i))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> std::result::Result<Value, E> {
        // Out-of-range integers degrade to floats rather than failing the parse
        match i64::try_from(u) {
            Ok(i) => Ok(Value::Integer(i)),
            Err(_) => Ok(Value::Float(u as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, f: f64) -> std::result::Result<Value, E> {
        Ok(Value::Float(f))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> std::result::Result<Value, E> {
        Ok(Value::Text(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> std::result::Result<Value, E> {
        Ok(Value::Text(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut items = List::new();
        while let Some(item) = seq.next_element::<Value>()? {
            items.push_back(item);
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Value, A::Error> {
        let mut map = Map::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<List> for Value {
    fn from(items: List) -> Self {
        Self::List(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Map(map)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items.into_iter().collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_maps_serialize_in_key_order() {
        let doc = Value::from_json_str(r#"{"b": 1, "a": {"z": 2, "y": 3}}"#).unwrap();
        assert_eq!(doc.to_json_string(), r#"{"a":{"y":3,"z":2},"b":1}"#);
    }

    #[test]
    fn test_check_storable() {
        assert!(Value::from(json!({"a": [1, 2.5, {"b": null}]})).check_storable(0).is_ok());
        assert!(matches!(
            Value::from(f64::NAN).check_storable(1),
            Err(crate::core::StoreError::Value(_))
        ));

        let mut deepest = Value::from(1);
        for _ in 0..MAX_NESTING_DEPTH {
            deepest = Value::from(vec![deepest]);
        }
        assert!(deepest.check_storable(0).is_ok());
        assert!(deepest.check_storable(1).is_err());
        assert!(Value::from(1).check_storable(MAX_NESTING_DEPTH).is_ok());
        assert!(Value::from(1).check_storable(MAX_NESTING_DEPTH + 1).is_err());
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Integer(1), Value::Float(1.0));
        assert_ne!(Value::empty_map(), Value::empty_list());
    }

    #[test]
    fn test_json_text_roundtrip() {
        let text = r#"{"app":{"id":"x","versions":[1,2.5,null,true]},"count":3}"#;
        let value = Value::from_json_str(text).unwrap();

        let app = value.as_map().unwrap().get("app").unwrap();
        let versions = app.as_map().unwrap().get("versions").unwrap().as_list().unwrap();
        assert_eq!(versions[0], Value::Integer(1));
        assert_eq!(versions[1], Value::Float(2.5));
        assert!(versions[2].is_null());

        // map keys serialize in sorted order
        assert_eq!(value.to_json_string(), r#"{"app":{"id":"x","versions":[1,2.5,null,true]},"count":3}"#);
    }

    #[test]
    fn test_from_serde_json_value() {
        let value = Value::from(json!({"a": [1, "two"], "b": {"c": false}}));
        assert_eq!(value, Value::from_json_str(r#"{"b":{"c":false},"a":[1,"two"]}"#).unwrap());
    }

    #[test]
    fn test_large_unsigned_becomes_float() {
        let value = Value::from_json_str("18446744073709551615").unwrap();
        assert_eq!(value.type_name(), "float");
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = Value::from(json!({"list": [1, 2]}));
        let snapshot = original.clone();
        if let Value::Map(map) = &mut original {
            map.insert("extra".into(), Value::from(true));
        }
        assert!(snapshot.as_map().unwrap().get("extra").is_none());
        assert!(original.as_map().unwrap().get("extra").is_some());
    }
}
