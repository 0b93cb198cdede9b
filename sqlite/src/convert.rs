//! Conversion between core values and SQLite values.
//!
//! SQLite has no boolean or timestamp storage class: booleans are stored as
//! integers 0 and 1 and timestamps as RFC 3339 text in UTC. Values read
//! back come out as their storage class (`Int`, `Float`, `Text`, `Bytes`);
//! record fields convert them on assignment.

use chrono::SecondsFormat;
use rusqlite::types::{Value as SqlValue, ValueRef};
use tabula_core::Value;

use crate::error::{Result, SqliteError};

/// Core value to an owned SQLite value, for binding.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Timestamp(ts) => SqlValue::Text(ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
    }
}

/// Column value to a core value.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| SqliteError::Conversion(format!("invalid UTF-8 in text column: {e}")))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_bool_and_timestamp_encoding() {
        assert_eq!(to_sql(&Value::Bool(true)), SqlValue::Integer(1));
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            to_sql(&Value::Timestamp(ts)),
            SqlValue::Text("2024-03-01T12:30:00.000000Z".to_string())
        );
    }

    #[test]
    fn test_storage_classes_read_back() {
        assert_eq!(from_sql(ValueRef::Integer(7)).unwrap(), Value::Int(7));
        assert_eq!(from_sql(ValueRef::Null).unwrap(), Value::Null);
        assert_eq!(from_sql(ValueRef::Text(b"abc")).unwrap(), Value::from("abc"));
        assert!(from_sql(ValueRef::Text(&[0xff, 0xfe])).is_err());
    }
}
