// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Value coercion between wire representations and typed metric values.
//!
//! Southbound payloads are sloppy about types: a float arrives as the
//! string `"23.5"`, a boolean as `"no"`, a timestamp as RFC-3339 text.
//! Everything funnels through here so the rules live in one place.

use chrono::DateTime;
use serde_json::Value;

use crate::metric::{DataType, MetricValue};

/// Parse a string into a typed value. Unparseable numerics yield `None`
/// (the metric is left unchanged); booleans use the literal false set
/// {"false", "no", "0", ""} and treat everything else as true.
pub fn string_to_value(s: &str, data_type: DataType) -> Option<MetricValue> {
  let trimmed = s.trim();
  match data_type {
    DataType::Boolean => Some(MetricValue::Boolean(string_to_bool(trimmed))),
    DataType::Int8 => trimmed.parse::<i8>().ok().map(MetricValue::Int8),
    DataType::Int16 => trimmed.parse::<i16>().ok().map(MetricValue::Int16),
    DataType::Int32 => trimmed.parse::<i32>().ok().map(MetricValue::Int32),
    DataType::Int64 => trimmed.parse::<i64>().ok().map(MetricValue::Int64),
    DataType::UInt8 => trimmed.parse::<u8>().ok().map(MetricValue::UInt8),
    DataType::UInt16 => trimmed.parse::<u16>().ok().map(MetricValue::UInt16),
    DataType::UInt32 => trimmed.parse::<u32>().ok().map(MetricValue::UInt32),
    DataType::UInt64 => trimmed.parse::<u64>().ok().map(MetricValue::UInt64),
    DataType::Float => trimmed.parse::<f32>().ok().map(MetricValue::Float),
    DataType::Double => trimmed.parse::<f64>().ok().map(MetricValue::Double),
    DataType::DateTime => string_to_millis(trimmed).map(MetricValue::DateTime),
    DataType::String | DataType::Text | DataType::Uuid => {
      Some(MetricValue::String(s.to_owned()))
    }
    DataType::Bytes | DataType::File => Some(MetricValue::Bytes(s.as_bytes().to_vec())),
    _ => None,
  }
}

pub fn string_to_bool(s: &str) -> bool {
  !matches!(s, "false" | "no" | "0" | "")
}

/// RFC-3339/ISO-8601 text, or a bare integer, to epoch milliseconds.
pub fn string_to_millis(s: &str) -> Option<u64> {
  if let Ok(ms) = s.parse::<u64>() {
    return Some(ms);
  }
  DateTime::parse_from_rfc3339(s)
    .ok()
    .map(|dt| dt.timestamp_millis().max(0) as u64)
}

/// Coerce a JSON value to a typed metric value. `Null` is an absent value.
pub fn json_to_value(value: &Value, data_type: DataType) -> Option<MetricValue> {
  match value {
    Value::Null => None,
    Value::String(s) => string_to_value(s, data_type),
    Value::Bool(b) => match data_type {
      DataType::Boolean => Some(MetricValue::Boolean(*b)),
      DataType::String | DataType::Text => Some(MetricValue::String(b.to_string())),
      _ => number_to_value(if *b { 1.0 } else { 0.0 }, data_type),
    },
    Value::Number(n) => match data_type {
      DataType::Boolean => Some(MetricValue::Boolean(n.as_f64().is_some_and(|f| f != 0.0))),
      DataType::String | DataType::Text | DataType::Uuid => {
        Some(MetricValue::String(n.to_string()))
      }
      DataType::UInt64 => n.as_u64().map(MetricValue::UInt64),
      DataType::Int64 => n.as_i64().map(MetricValue::Int64),
      DataType::DateTime => n.as_u64().map(MetricValue::DateTime),
      _ => n.as_f64().and_then(|f| number_to_value(f, data_type)),
    },
    Value::Array(_) | Value::Object(_) => match data_type {
      DataType::String | DataType::Text => Some(MetricValue::String(value.to_string())),
      _ => None,
    },
  }
}

/// Narrow a float to the metric's native width. Out-of-range integers
/// yield `None` rather than wrapping.
pub fn number_to_value(f: f64, data_type: DataType) -> Option<MetricValue> {
  fn int_in_range(f: f64, min: f64, max: f64) -> Option<i64> {
    let t = f.trunc();
    (t >= min && t <= max).then_some(t as i64)
  }
  match data_type {
    DataType::Float => Some(MetricValue::Float(f as f32)),
    DataType::Double => Some(MetricValue::Double(f)),
    DataType::Int8 => int_in_range(f, i8::MIN as f64, i8::MAX as f64).map(|v| MetricValue::Int8(v as i8)),
    DataType::Int16 => {
      int_in_range(f, i16::MIN as f64, i16::MAX as f64).map(|v| MetricValue::Int16(v as i16))
    }
    DataType::Int32 => {
      int_in_range(f, i32::MIN as f64, i32::MAX as f64).map(|v| MetricValue::Int32(v as i32))
    }
    DataType::Int64 => int_in_range(f, i64::MIN as f64, i64::MAX as f64).map(MetricValue::Int64),
    DataType::UInt8 => int_in_range(f, 0.0, u8::MAX as f64).map(|v| MetricValue::UInt8(v as u8)),
    DataType::UInt16 => {
      int_in_range(f, 0.0, u16::MAX as f64).map(|v| MetricValue::UInt16(v as u16))
    }
    DataType::UInt32 => {
      int_in_range(f, 0.0, u32::MAX as f64).map(|v| MetricValue::UInt32(v as u32))
    }
    DataType::UInt64 => int_in_range(f, 0.0, u64::MAX as f64).map(|v| MetricValue::UInt64(v as u64)),
    DataType::DateTime => int_in_range(f, 0.0, u64::MAX as f64).map(|v| MetricValue::DateTime(v as u64)),
    DataType::Boolean => Some(MetricValue::Boolean(f != 0.0)),
    _ => None,
  }
}

/// Re-type an already decoded value, e.g. a driver-native reading bound
/// to a metric declared with a different width.
pub fn convert(value: &MetricValue, data_type: DataType) -> Option<MetricValue> {
  if value.data_type() == data_type {
    return Some(value.clone());
  }
  match value {
    MetricValue::String(s) => string_to_value(s, data_type),
    MetricValue::Boolean(b) => match data_type {
      DataType::String | DataType::Text => Some(MetricValue::String(b.to_string())),
      _ => number_to_value(if *b { 1.0 } else { 0.0 }, data_type),
    },
    MetricValue::Bytes(b) => match data_type {
      DataType::String | DataType::Text => {
        Some(MetricValue::String(String::from_utf8_lossy(b).into_owned()))
      }
      _ => None,
    },
    MetricValue::DataSet(_) => None,
    other => match data_type {
      DataType::String | DataType::Text => Some(MetricValue::String(value_to_string(other))),
      _ => other.as_f64().and_then(|f| number_to_value(f, data_type)),
    },
  }
}

/// String form used by the delimited encoder.
pub fn value_to_string(value: &MetricValue) -> String {
  match value {
    MetricValue::Boolean(b) => b.to_string(),
    MetricValue::Int8(v) => v.to_string(),
    MetricValue::Int16(v) => v.to_string(),
    MetricValue::Int32(v) => v.to_string(),
    MetricValue::Int64(v) => v.to_string(),
    MetricValue::UInt8(v) => v.to_string(),
    MetricValue::UInt16(v) => v.to_string(),
    MetricValue::UInt32(v) => v.to_string(),
    MetricValue::UInt64(v) => v.to_string(),
    MetricValue::Float(v) => v.to_string(),
    MetricValue::Double(v) => v.to_string(),
    MetricValue::DateTime(v) => v.to_string(),
    MetricValue::String(s) => s.clone(),
    MetricValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
    MetricValue::DataSet(_) => String::new(),
  }
}

/// JSON form used by the JSON encoder.
pub fn value_to_json(value: &MetricValue) -> Value {
  match value {
    MetricValue::Boolean(b) => Value::Bool(*b),
    MetricValue::Int8(v) => Value::from(*v),
    MetricValue::Int16(v) => Value::from(*v),
    MetricValue::Int32(v) => Value::from(*v),
    MetricValue::Int64(v) => Value::from(*v),
    MetricValue::UInt8(v) => Value::from(*v),
    MetricValue::UInt16(v) => Value::from(*v),
    MetricValue::UInt32(v) => Value::from(*v),
    MetricValue::UInt64(v) => Value::from(*v),
    MetricValue::Float(v) => Value::from(*v),
    MetricValue::Double(v) => Value::from(*v),
    MetricValue::DateTime(v) => Value::from(*v),
    MetricValue::String(s) => Value::String(s.clone()),
    MetricValue::Bytes(b) => Value::Array(b.iter().map(|v| Value::from(*v)).collect()),
    MetricValue::DataSet(ds) => serde_json::to_value(ds).unwrap_or(Value::Null),
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_boolean_literal_set() {
    for s in ["false", "no", "0", ""] {
      assert_eq!(
        string_to_value(s, DataType::Boolean),
        Some(MetricValue::Boolean(false)),
        "'{s}' must be false"
      );
    }
    for s in ["true", "yes", "1", "on", "anything"] {
      assert_eq!(
        string_to_value(s, DataType::Boolean),
        Some(MetricValue::Boolean(true)),
        "'{s}' must be true"
      );
    }
  }

  #[test]
  fn test_unparseable_integer_is_none() {
    assert_eq!(string_to_value("twelve", DataType::Int32), None);
    assert_eq!(string_to_value("12.5", DataType::Int32), None);
    assert_eq!(
      string_to_value("12", DataType::Int32),
      Some(MetricValue::Int32(12))
    );
  }

  #[test]
  fn test_rfc3339_to_millis() {
    assert_eq!(
      string_to_value("1970-01-01T00:00:01Z", DataType::DateTime),
      Some(MetricValue::DateTime(1_000))
    );
    assert_eq!(
      string_to_value("1500", DataType::DateTime),
      Some(MetricValue::DateTime(1_500))
    );
  }

  #[test]
  fn test_json_number_narrowing() {
    let v = serde_json::json!(2500);
    assert_eq!(
      json_to_value(&v, DataType::UInt16),
      Some(MetricValue::UInt16(2500))
    );
    let too_big = serde_json::json!(70_000);
    assert_eq!(json_to_value(&too_big, DataType::UInt16), None);
  }

  #[test]
  fn test_string_passthrough() {
    assert_eq!(
      string_to_value("23.5", DataType::Float),
      Some(MetricValue::Float(23.5))
    );
  }
}
