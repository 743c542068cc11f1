//! Cached artifact types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::frame::DataFrame;

/// A plain (non-tabular) value, e.g. summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Datum>),
    Map(BTreeMap<String, Datum>),
}

impl From<serde_json::Value> for Datum {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Datum::Null,
            Value::Bool(b) => Datum::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Datum::Int(i),
                None => Datum::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Datum::Text(s),
            Value::Array(items) => Datum::List(items.into_iter().map(Datum::from).collect()),
            Value::Object(map) => {
                Datum::Map(map.into_iter().map(|(k, v)| (k, Datum::from(v))).collect())
            }
        }
    }
}

/// Anything the cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Table(DataFrame),
    Value(Datum),
}

impl Payload {
    pub fn is_table(&self) -> bool {
        matches!(self, Payload::Table(_))
    }

    pub fn as_table(&self) -> Option<&DataFrame> {
        match self {
            Payload::Table(t) => Some(t),
            Payload::Value(_) => None,
        }
    }

    pub fn into_table(self) -> Option<DataFrame> {
        match self {
            Payload::Table(t) => Some(t),
            Payload::Value(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Datum> {
        match self {
            Payload::Value(v) => Some(v),
            Payload::Table(_) => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        let (payload, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(payload)
    }
}

impl From<DataFrame> for Payload {
    fn from(frame: DataFrame) -> Self {
        Payload::Table(frame)
    }
}

impl From<Datum> for Payload {
    fn from(datum: Datum) -> Self {
        Payload::Value(datum)
    }
}
