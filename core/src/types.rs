//! Column values, value types and result rows.
//!
//! [`Value`] is the currency between records, the query builder and the
//! storage backend. [`FromValue`] converts values back into Rust types with
//! the lenient coercions relational drivers usually apply (integers as
//! booleans, numeric text, timestamps stored as text).

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Logical type of a mapped field.
///
/// Dialects translate these into concrete column types.
///
/// # Examples
///
/// ```
/// use tabula_core::ValueType;
///
/// assert_eq!(ValueType::default(), ValueType::Text);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    Int,
    BigInt,
    UnsignedInt,
    UnsignedBigInt,
    Float,
    #[default]
    Text,
    Bytes,
    Timestamp,
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Short name of the variant, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` for values that do not identify a row: null, integer
    /// zero and empty text.
    pub fn is_absent(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Int(0) => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Converts the value into `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tabula_core::Value;
    ///
    /// let id: i32 = Value::Int(7).decode().unwrap();
    /// assert_eq!(id, 7);
    ///
    /// let name: Option<String> = Value::Null.decode().unwrap();
    /// assert_eq!(name, None);
    /// ```
    pub fn decode<T: FromValue>(self) -> Result<T> {
        T::from_value(self)
    }
}

/// Conversion from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            Value::Bool(b) => Ok(i64::from(b)),
            Value::Float(f) if f.fract() == 0.0 => Ok(f as i64),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::conversion("int", format!("text {s:?}"))),
            other => Err(Error::conversion("int", other.type_name())),
        }
    }
}

macro_rules! narrow_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    let wide = i64::from_value(value)?;
                    <$ty>::try_from(wide)
                        .map_err(|_| Error::conversion(stringify!($ty), wide.to_string()))
                }
            }
        )*
    };
}

narrow_int!(i32, i16, u32, u64, usize);

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" => Ok(true),
                "0" | "f" | "false" => Ok(false),
                _ => Err(Error::conversion("bool", format!("text {s:?}"))),
            },
            other => Err(Error::conversion("bool", other.type_name())),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::conversion("float", format!("text {s:?}"))),
            other => Err(Error::conversion("float", other.type_name())),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Bytes(bytes) => String::from_utf8(bytes)
                .map_err(|_| Error::conversion("text", "non-utf8 bytes")),
            Value::Timestamp(ts) => Ok(ts.to_rfc3339()),
            Value::Null => Err(Error::conversion("text", "null")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(bytes) => Ok(bytes),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(Error::conversion("bytes", other.type_name())),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Int(secs) => Utc
                .timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| Error::conversion("timestamp", secs.to_string())),
            Value::Text(s) => parse_timestamp(&s)
                .ok_or_else(|| Error::conversion("timestamp", format!("text {s:?}"))),
            other => Err(Error::conversion("timestamp", other.type_name())),
        }
    }
}

/// Parses RFC 3339 text or the `YYYY-MM-DD HH:MM:SS[.f]` form produced by
/// `CURRENT_TIMESTAMP`, the latter interpreted as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! int_into_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

int_into_value!(i16, i32, i64, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        // Values above i64::MAX cannot be bound by any supported backend.
        Value::Int(v.min(i64::MAX as u64) as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One result row: column names paired with values, in select order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Builds a row from parallel column/value lists.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Looks a column up by name, ignoring ASCII case.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    /// Value at a zero-based position.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Decodes a named column into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if the row has no such column and
    /// [`Error::Conversion`] if the value cannot be converted.
    pub fn decode<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self.get(column).cloned().ok_or_else(|| Error::UnknownField {
            model: "row".to_string(),
            field: column.to_string(),
        })?;
        T::from_value(value)
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}
