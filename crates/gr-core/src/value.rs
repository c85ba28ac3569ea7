use std::fmt;

use arrow::datatypes::DataType;
use orion_error::StructError;
use serde::{Deserialize, Serialize};

use crate::error::{CoreReason, CoreResult};

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single cell. Serialized untagged so wire batches read as plain JSON
/// arrays (`[1.5, 2.0]`, `["a", "b"]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

// ---------------------------------------------------------------------------
// ValueEncoding
// ---------------------------------------------------------------------------

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueEncoding {
    Float32,
    Float64,
    Int32,
    Int64,
    Bool,
    Utf8,
}

impl ValueEncoding {
    /// Convert `value` to this encoding. Float32 values are rounded through
    /// `f32`; integers accept floats with no fractional part.
    pub fn coerce(self, value: &Value) -> CoreResult<Value> {
        let converted = match (self, value) {
            (Self::Float32, v) => v.as_f64().map(|f| Value::Float(f as f32 as f64)),
            (Self::Float64, v) => v.as_f64().map(Value::Float),
            (Self::Int64, Value::Int(i)) => Some(Value::Int(*i)),
            (Self::Int32, Value::Int(i)) => i32::try_from(*i).ok().map(|i| Value::Int(i as i64)),
            (Self::Int64 | Self::Int32, Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                let i = *f as i64;
                match self {
                    Self::Int32 => i32::try_from(i).ok().map(|i| Value::Int(i as i64)),
                    _ => Some(Value::Int(i)),
                }
            }
            (Self::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
            (Self::Bool, Value::Int(0)) => Some(Value::Bool(false)),
            (Self::Bool, Value::Int(1)) => Some(Value::Bool(true)),
            (Self::Utf8, Value::Str(s)) => Some(Value::Str(s.clone())),
            _ => None,
        };
        converted.ok_or_else(|| {
            StructError::from(CoreReason::ValueEncoding)
                .with_detail(format!("cannot encode {value} as {self}"))
        })
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Bool | Self::Utf8)
    }

    pub fn arrow_type(self) -> DataType {
        match self {
            Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::Bool => DataType::Boolean,
            Self::Utf8 => DataType::Utf8,
        }
    }
}

impl fmt::Display for ValueEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Bool => "bool",
            Self::Utf8 => "utf8",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ColumnInput
// ---------------------------------------------------------------------------

/// Values handed to `RecordBatch::set`. `None` marks a missing sample that
/// is replaced by the column's fill value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnInput(pub Vec<Option<Value>>);

impl ColumnInput {
    pub fn has_present(&self) -> bool {
        self.0.iter().any(Option::is_some)
    }
}

impl From<Vec<Option<Value>>> for ColumnInput {
    fn from(v: Vec<Option<Value>>) -> Self {
        Self(v)
    }
}

impl From<Vec<Value>> for ColumnInput {
    fn from(v: Vec<Value>) -> Self {
        Self(v.into_iter().map(Some).collect())
    }
}

impl From<Vec<f64>> for ColumnInput {
    fn from(v: Vec<f64>) -> Self {
        Self(v.into_iter().map(|x| Some(Value::Float(x))).collect())
    }
}

impl From<Vec<Option<f64>>> for ColumnInput {
    fn from(v: Vec<Option<f64>>) -> Self {
        Self(v.into_iter().map(|x| x.map(Value::Float)).collect())
    }
}

impl From<Vec<i64>> for ColumnInput {
    fn from(v: Vec<i64>) -> Self {
        Self(v.into_iter().map(|x| Some(Value::Int(x))).collect())
    }
}

impl From<Vec<Option<i64>>> for ColumnInput {
    fn from(v: Vec<Option<i64>>) -> Self {
        Self(v.into_iter().map(|x| x.map(Value::Int)).collect())
    }
}
