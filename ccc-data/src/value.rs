use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString, VariantNames};

/// The value type of a dimension
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    Number,
    String,
    Date,
    Boolean,
    /// Custom or unknown values, kept as given
    #[default]
    Any,
}

impl ValueType {
    /// Whether dimensions of this type are continuous unless configured otherwise
    pub fn is_continuous_by_default(&self) -> bool {
        matches!(self, ValueType::Number | ValueType::Date)
    }
}

/// A typed, non-null dimension value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Number(OrderedFloat<f64>),
    String(String),
    Date(NaiveDateTime),
    Boolean(bool),
}

impl Value {
    pub fn number(v: f64) -> Self {
        Value::Number(OrderedFloat(v))
    }

    pub fn string(v: impl Into<String>) -> Self {
        Value::String(v.into())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Date(_) => ValueType::Date,
            Value::Boolean(_) => ValueType::Boolean,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(v.0),
            Value::Date(d) => Some(d.and_utc().timestamp_millis() as f64),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(_) => None,
        }
    }

    /// Empty strings and NaN carry no value and intern to the null atom
    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Number(v) => v.0.is_nan(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical string used to de-duplicate atoms and build composite keys.
    pub fn key(&self) -> String {
        match self {
            Value::Number(v) => format_number(v.0),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.and_utc().timestamp_millis().to_string(),
            Value::Boolean(b) => b.to_string(),
        }
    }

    /// Cast the value to the given type, returning `None` when no sensible conversion exists.
    pub fn cast(&self, value_type: ValueType) -> Option<Value> {
        match (value_type, self) {
            (ValueType::Any, v) => Some(v.clone()),
            (ValueType::Number, Value::Number(_)) => Some(self.clone()),
            (ValueType::Number, Value::String(s)) => {
                s.trim().parse::<f64>().ok().map(Value::number)
            }
            (ValueType::Number, v) => v.as_f64().map(Value::number),
            (ValueType::String, Value::String(_)) => Some(self.clone()),
            (ValueType::String, v) => Some(Value::String(v.to_string())),
            (ValueType::Date, Value::Date(_)) => Some(self.clone()),
            (ValueType::Date, Value::Number(ms)) => {
                DateTime::from_timestamp_millis(ms.0 as i64).map(|d| Value::Date(d.naive_utc()))
            }
            (ValueType::Date, Value::String(s)) => parse_date(s.trim()).map(Value::Date),
            (ValueType::Date, Value::Boolean(_)) => None,
            (ValueType::Boolean, Value::Boolean(_)) => Some(self.clone()),
            (ValueType::Boolean, Value::Number(n)) => Some(Value::Boolean(n.0 != 0.0)),
            (ValueType::Boolean, Value::String(s)) => match s.trim() {
                "true" | "1" => Some(Value::Boolean(true)),
                "false" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },
            (ValueType::Boolean, Value::Date(_)) => None,
        }
    }

    /// Natural ordering of two values.
    ///
    /// Values of different types order by type first and never compare equal.
    pub fn natural_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (a, b) => type_rank(a)
                .cmp(&type_rank(b))
                .then_with(|| a.key().cmp(&b.key())),
        }
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Boolean(_) => 0,
        Value::Number(_) => 1,
        Value::Date(_) => 2,
        Value::String(_) => 3,
    }
}

fn format_number(v: f64) -> String {
    // -0 and 0 must intern to the same atom
    if v == 0.0 {
        return "0".to_string();
    }
    format!("{v}")
}

fn parse_date(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    for format in FORMATS {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, format) {
            return Some(d);
        }
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.naive_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{}", format_number(v.0)),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Value::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::number(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Date(v)
    }
}
