//! Core data types for the MESHJOIN engine.
//!
//! This module contains the record types that flow through the join:
//! - [`FieldValue`] - the dynamic value type for carry and enrichment payloads
//! - [`StreamTuple`] - a transactional fact record from the stream side
//! - [`MasterTuple`] - a dimension record from the master relation
//! - [`EnrichedTuple`] - the joined output handed to the sink

use chrono::NaiveDateTime;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A value in a tuple payload field
///
/// Stream and master payloads are opaque to the join itself; the engine only
/// inspects the configured derived-measure attribute, which must be numeric.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Timestamp (e.g. an order date)
    Timestamp(NaiveDateTime),
    /// Null value
    Null,
}

impl FieldValue {
    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::String(_) => "string",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Null => "null",
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert a JSON value into a field value.
    ///
    /// Whole numbers become `Integer`, other numbers `Float`. Nested arrays
    /// and objects are not part of the payload model and are carried as
    /// their JSON text.
    pub fn from_json(value: &Value) -> FieldValue {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            other => FieldValue::String(other.to_string()),
        }
    }

    /// Convert the field value into JSON. Non-finite floats become null.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Timestamp(t) => Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string()),
            FieldValue::Null => Value::Null,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Timestamp(t) => write!(f, "{}", t),
            FieldValue::Null => write!(f, "NULL"),
        }
    }
}

/// A transactional fact record from the stream side of the join.
///
/// `order_id` is the tuple's identity, `join_key` the equi-join attribute
/// (e.g. a product id) and `measure` the quantity the derived measure is
/// computed from. Everything else the sink needs that does not come from the
/// master relation rides in the opaque `carry` payload (order date, customer
/// id, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTuple {
    pub order_id: i64,
    pub join_key: i64,
    pub measure: i64,
    pub carry: HashMap<String, FieldValue>,
}

impl StreamTuple {
    /// Create a stream tuple with an empty carry payload
    pub fn new(order_id: i64, join_key: i64, measure: i64) -> Self {
        Self {
            order_id,
            join_key,
            measure,
            carry: HashMap::new(),
        }
    }

    /// Add a carry payload field
    pub fn with_carry(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.carry.insert(name.into(), value);
        self
    }
}

/// A dimension record from the master relation.
///
/// `join_key` is unique within the relation; the enrichment payload holds
/// the attributes merged into the output (product name, unit price, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct MasterTuple {
    pub join_key: i64,
    pub enrichment: HashMap<String, FieldValue>,
}

impl MasterTuple {
    /// Create a master tuple with an empty enrichment payload
    pub fn new(join_key: i64) -> Self {
        Self {
            join_key,
            enrichment: HashMap::new(),
        }
    }

    /// Add an enrichment payload field
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.enrichment.insert(name.into(), value);
        self
    }
}

/// The joined output record: carry payload, enrichment payload, the join
/// key, measure and derived measure, flattened into one field map. Written
/// once per matched stream tuple, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedTuple {
    pub order_id: i64,
    pub fields: HashMap<String, FieldValue>,
}

impl EnrichedTuple {
    /// Look up an output field by name
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}
