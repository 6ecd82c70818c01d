// src/domain/value.rs

//! Serializable value model.
//!
//! Every argument and result that crosses a context boundary is a [`Value`].
//! The wire schema is a tagged union, adjacently tagged as
//! `{"type": "<tag>", "value": <payload>}`, so a receiver can check the shape
//! of a payload without guessing from whatever JSON happened to arrive.
//!
//! Typed Rust data moves in and out through [`Value::encode`] and
//! [`Value::decode`], which go through `serde_json::Value` as the neutral
//! intermediate form.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::Result;

/// A value that may cross a context boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    // ---
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned integer above `i64::MAX`.
    UInt(u64),
    Float(f64),
    String(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A structured failure carried as data.
    Error(Failure),
}

impl Value {
    // ---
    /// Convert any serializable Rust value.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Serialization` if `value` cannot be represented as
    /// JSON (e.g. a map with non-string keys).
    pub fn encode<T>(value: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        // ---
        Ok(Self::from(serde_json::to_value(value)?))
    }

    /// Convert into any deserializable Rust value.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Serialization` if the shape does not match `T`.
    pub fn decode<T>(self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        // ---
        Ok(serde_json::from_value(Json::from(self))?)
    }

    /// Short tag name, matching the wire `type` field.
    pub fn kind(&self) -> &'static str {
        // ---
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Seq(_) => "seq",
            Value::Map(_) => "map",
            Value::Error(_) => "error",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        // ---
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Seq(items.into_iter().map(Value::from).collect()),
            Json::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for Json {
    fn from(value: Value) -> Self {
        // ---
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(b),
            Value::Int(i) => Json::from(i),
            Value::UInt(u) => Json::from(u),
            // NaN and infinities have no JSON form.
            Value::Float(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s),
            Value::Seq(items) => Json::Array(items.into_iter().map(Json::from).collect()),
            Value::Map(entries) => Json::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Json::from(v)))
                    .collect(),
            ),
            Value::Error(failure) => failure.into_json(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        // ---
        match i64::try_from(u) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::UInt(u),
        }
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

impl From<Failure> for Value {
    fn from(failure: Failure) -> Self {
        Value::Error(failure)
    }
}

/// Serialized failure description.
///
/// This is what a handler error becomes before it crosses the boundary:
/// a message and, where one can be derived, a structured cause. It is plain
/// data; it never carries a live error object.
///
/// Any `std::error::Error` converts into a `Failure`, with its `source()`
/// chain folded into nested [`Value::Error`] causes, so handlers can use `?`
/// on ordinary errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    // ---
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<Value>>,
}

impl Failure {
    // ---
    pub fn new(message: impl Into<String>) -> Self {
        // ---
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a structured cause.
    pub fn with_cause(mut self, cause: impl Into<Value>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    /// Failure reported for a method the service does not implement.
    pub fn no_such_method(method: &str) -> Self {
        Self::new(format!("no such method: {method}"))
    }

    fn into_json(self) -> Json {
        // ---
        let mut object = serde_json::Map::new();
        object.insert("message".to_owned(), Json::String(self.message));
        if let Some(cause) = self.cause {
            object.insert("cause".to_owned(), Json::from(*cause));
        }
        Json::Object(object)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// `Failure` deliberately does not implement `std::error::Error`, which keeps
// this blanket conversion coherent.
impl<E> From<E> for Failure
where
    E: std::error::Error,
{
    fn from(err: E) -> Self {
        // ---
        let mut failure = Failure::new(err.to_string());
        if let Some(source) = err.source() {
            failure.cause = Some(Box::new(Value::Error(chain(source))));
        }
        failure
    }
}

fn chain(err: &(dyn std::error::Error + 'static)) -> Failure {
    // ---
    let mut failure = Failure::new(err.to_string());
    if let Some(source) = err.source() {
        failure.cause = Some(Box::new(Value::Error(chain(source))));
    }
    failure
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn wire_schema_is_tagged() {
        // ---
        let wire = serde_json::to_value(Value::Seq(vec![Value::Int(2), Value::Null])).unwrap();
        assert_eq!(
            wire,
            json!({"type": "seq", "value": [{"type": "int", "value": 2}, {"type": "null"}]})
        );
    }

    #[test]
    fn json_numbers_split_into_int_uint_and_float() {
        // ---
        assert_eq!(Value::from(json!(7)), Value::Int(7));
        assert_eq!(Value::from(json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from(json!(u64::MAX)), Value::UInt(u64::MAX));
        assert_eq!(Value::from(u64::MAX - 1), Value::UInt(u64::MAX - 1));
        assert_eq!(Value::from(5_u64), Value::Int(5));
    }

    #[test]
    fn large_unsigned_survives_the_wire() {
        // ---
        let big = u64::MAX - 1;
        let value = Value::encode(&big).unwrap();
        assert_eq!(value, Value::UInt(big));

        let wire = serde_json::to_value(&value).unwrap();
        assert_eq!(wire, json!({"type": "uint", "value": big}));

        let back: Value = serde_json::from_value(wire).unwrap();
        assert_eq!(back.decode::<u64>().unwrap(), big);
    }

    #[test]
    fn struct_goes_through_map() {
        // ---
        let value = Value::encode(&Point { x: 1, y: -2 }).unwrap();
        assert_eq!(value.kind(), "map");
        assert_eq!(value.decode::<Point>().unwrap(), Point { x: 1, y: -2 });
    }

    #[test]
    fn decode_shape_mismatch_is_an_error() {
        // ---
        let err = Value::from("nope").decode::<i64>().unwrap_err();
        assert!(matches!(err, crate::RpcError::Serialization(_)));
    }

    #[test]
    fn non_finite_float_becomes_null_json() {
        // ---
        assert_eq!(Json::from(Value::Float(f64::INFINITY)), Json::Null);
    }

    #[test]
    fn error_source_chain_becomes_cause() {
        // ---
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] std::io::Error);

        let failure = Failure::from(Outer(std::io::Error::other("inner")));
        assert_eq!(failure.message, "outer");

        match failure.cause.as_deref() {
            Some(Value::Error(inner)) => assert_eq!(inner.message, "inner"),
            other => panic!("unexpected cause: {other:?}"),
        }
    }

    #[test]
    fn failure_as_json_is_plain_object() {
        // ---
        let failure = Failure::new("boom").with_cause("disk");
        assert_eq!(
            Json::from(Value::Error(failure)),
            json!({"message": "boom", "cause": "disk"})
        );
    }
}
