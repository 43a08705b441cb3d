// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! JSON payload codec with JSONPath selection.

use serde_json::Value;
use serde_json_path::JsonPath;

use super::coerce;
use crate::{
  errors::CodecError,
  metric::{DataSetValue, DataType, Metric, MetricValue},
};

pub(super) fn parse_document(raw: &str) -> Result<Value, CodecError> {
  serde_json::from_str(raw).map_err(|e| CodecError::InvalidPayload("JSON".to_owned(), e.to_string()))
}

fn select<'a>(document: &'a Value, path: &str) -> Result<Option<&'a Value>, CodecError> {
  if path.is_empty() {
    return Ok(Some(document));
  }
  let compiled =
    JsonPath::parse(path).map_err(|e| CodecError::JsonPath(path.to_owned(), e.to_string()))?;
  Ok(compiled.query(document).all().into_iter().next())
}

pub fn parse(raw: &str, metric: &Metric) -> Result<Option<MetricValue>, CodecError> {
  let document = parse_document(raw)?;
  let path = metric.properties().path().clone().unwrap_or_default();
  let Some(selected) = select(&document, &path)? else {
    return Ok(None);
  };
  if metric.data_type() == DataType::DataSet {
    return Ok(parse_data_set(selected, metric));
  }
  Ok(coerce::json_to_value(selected, metric.data_type()))
}

/// Rows arrive as objects (or one object); the declared column order on
/// the metric's current dataset value drives the projection. Without a
/// declaration the first row's keys, sorted, become the columns.
fn parse_data_set(selected: &Value, metric: &Metric) -> Option<MetricValue> {
  let rows_in: Vec<&Value> = match selected {
    Value::Array(rows) => rows.iter().collect(),
    Value::Object(_) => vec![selected],
    _ => return None,
  };
  let columns: Vec<String> = match metric.value() {
    Some(MetricValue::DataSet(ds)) if !ds.columns.is_empty() => ds.columns.clone(),
    _ => match rows_in.first() {
      Some(Value::Object(map)) => {
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
      }
      _ => return None,
    },
  };
  let rows = rows_in
    .iter()
    .filter_map(|row| row.as_object())
    .map(|row| {
      columns
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
        .collect()
    })
    .collect();
  Some(MetricValue::DataSet(DataSetValue { columns, rows }))
}

/// The payload-embedded timestamp, at JSONPath `$.timestamp`, in epoch
/// milliseconds or RFC-3339 text.
pub fn parse_timestamp(raw: &str) -> Option<u64> {
  let document = parse_document(raw).ok()?;
  match document.get("timestamp")? {
    Value::Number(n) => n.as_u64(),
    Value::String(s) => coerce::string_to_millis(s),
    _ => None,
  }
}

/// Build one JSON object from the metrics, placing each value at the
/// JSON-Pointer equivalent of its JSONPath. Metrics without a path land
/// under their own name.
pub fn encode(metrics: &[Metric]) -> Result<String, CodecError> {
  let mut document = Value::Object(serde_json::Map::new());
  for metric in metrics {
    let Some(value) = metric.value() else {
      continue;
    };
    let path = metric.properties().path().clone().unwrap_or_default();
    let pointer = if path.is_empty() {
      format!("/{}", metric.name().replace('/', "~1"))
    } else {
      jsonpath_to_pointer(&path)?
    };
    insert_at_pointer(&mut document, &pointer, coerce::value_to_json(value))?;
  }
  serde_json::to_string(&document)
    .map_err(|e| CodecError::InvalidPayload("JSON".to_owned(), e.to_string()))
}

/// `$.a.b[0].c` -> `/a/b/0/c`. Only child and index selectors are
/// invertible; anything else is rejected.
pub(super) fn jsonpath_to_pointer(path: &str) -> Result<String, CodecError> {
  let trimmed = path
    .strip_prefix('$')
    .ok_or_else(|| CodecError::InvalidPath(path.to_owned()))?;
  let mut pointer = String::new();
  let mut rest = trimmed;
  while !rest.is_empty() {
    if let Some(tail) = rest.strip_prefix('.') {
      let end = tail.find(['.', '[']).unwrap_or(tail.len());
      let (segment, after) = tail.split_at(end);
      if segment.is_empty() {
        return Err(CodecError::InvalidPath(path.to_owned()));
      }
      pointer.push('/');
      pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
      rest = after;
    } else if let Some(tail) = rest.strip_prefix('[') {
      let end = tail
        .find(']')
        .ok_or_else(|| CodecError::InvalidPath(path.to_owned()))?;
      let (segment, after) = tail.split_at(end);
      let segment = segment.trim_matches(['\'', '"']);
      pointer.push('/');
      pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
      rest = &after[1..];
    } else {
      return Err(CodecError::InvalidPath(path.to_owned()));
    }
  }
  Ok(pointer)
}

fn insert_at_pointer(document: &mut Value, pointer: &str, value: Value) -> Result<(), CodecError> {
  let segments: Vec<String> = pointer
    .split('/')
    .skip(1)
    .map(|s| s.replace("~1", "/").replace("~0", "~"))
    .collect();
  let Some((last, parents)) = segments.split_last() else {
    return Err(CodecError::InvalidPath(pointer.to_owned()));
  };
  let mut cursor = document;
  for segment in parents {
    cursor = descend(cursor, segment);
  }
  if let Ok(index) = last.parse::<usize>() {
    if cursor.is_null() {
      *cursor = Value::Array(vec![]);
    }
    if let Value::Array(items) = cursor {
      while items.len() <= index {
        items.push(Value::Null);
      }
      items[index] = value;
      return Ok(());
    }
  }
  if !cursor.is_object() {
    *cursor = Value::Object(serde_json::Map::new());
  }
  match cursor {
    Value::Object(map) => {
      map.insert(last.clone(), value);
      Ok(())
    }
    _ => Err(CodecError::InvalidPath(pointer.to_owned())),
  }
}

/// Walk one pointer segment down, materialising intermediate containers.
/// Numeric segments become array slots (null-padded), everything else an
/// object entry.
fn descend<'a>(parent: &'a mut Value, segment: &str) -> &'a mut Value {
  let index = segment.parse::<usize>().ok();
  if index.is_some() && parent.is_null() {
    *parent = Value::Array(vec![]);
  }
  if let Some(index) = index.filter(|_| parent.is_array()) {
    let Value::Array(items) = parent else {
      unreachable!("checked is_array above");
    };
    while items.len() <= index {
      items.push(Value::Null);
    }
    let slot = &mut items[index];
    if slot.is_null() {
      *slot = Value::Object(serde_json::Map::new());
    }
    return slot;
  }
  if !parent.is_object() {
    *parent = Value::Object(serde_json::Map::new());
  }
  match parent {
    Value::Object(map) => map
      .entry(segment.to_owned())
      .or_insert_with(|| Value::Object(serde_json::Map::new())),
    _ => unreachable!("coerced to an object above"),
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::metric::MetricProperties;

  fn json_metric(data_type: DataType, path: &str) -> Metric {
    Metric::new("m", data_type).with_properties(MetricProperties::new(
      "GET",
      Some("topic".to_owned()),
      if path.is_empty() { None } else { Some(path.to_owned()) },
    ))
  }

  #[test]
  fn test_path_decode_with_string_coercion() {
    let metric = json_metric(DataType::Float, "$.sensor.temp");
    let value = parse(r#"{"sensor":{"temp":"23.5"}}"#, &metric).expect("valid JSON");
    assert_eq!(value, Some(MetricValue::Float(23.5)));
  }

  #[test]
  fn test_missing_path_is_none() {
    let metric = json_metric(DataType::Float, "$.sensor.pressure");
    let value = parse(r#"{"sensor":{"temp":1}}"#, &metric).expect("valid JSON");
    assert_eq!(value, None);
  }

  #[test]
  fn test_invalid_document_is_error() {
    let metric = json_metric(DataType::Float, "$.a");
    assert!(parse("{nope", &metric).is_err());
  }

  #[test]
  fn test_timestamp_extraction() {
    assert_eq!(parse_timestamp(r#"{"timestamp":1500,"v":1}"#), Some(1_500));
    assert_eq!(
      parse_timestamp(r#"{"timestamp":"1970-01-01T00:00:02Z"}"#),
      Some(2_000)
    );
    assert_eq!(parse_timestamp(r#"{"v":1}"#), None);
  }

  #[test]
  fn test_jsonpath_to_pointer() {
    assert_eq!(jsonpath_to_pointer("$.a.b").expect("ok"), "/a/b");
    assert_eq!(jsonpath_to_pointer("$.a[0].c").expect("ok"), "/a/0/c");
    assert_eq!(jsonpath_to_pointer("$['odd name']").expect("ok"), "/odd name");
    assert!(jsonpath_to_pointer("no-dollar").is_err());
  }

  #[test]
  fn test_round_trip_disjoint_paths() {
    let m1 = json_metric(DataType::Double, "$.line.speed")
      .with_value(Some(MetricValue::Double(12.5)), Some(1));
    let m2 = json_metric(DataType::Boolean, "$.line.running")
      .with_value(Some(MetricValue::Boolean(true)), Some(1));
    let encoded = encode(&[m1.clone(), m2.clone()]).expect("encodes");
    assert_eq!(
      parse(&encoded, &m1).expect("valid"),
      Some(MetricValue::Double(12.5))
    );
    assert_eq!(
      parse(&encoded, &m2).expect("valid"),
      Some(MetricValue::Boolean(true))
    );
  }

  #[test]
  fn test_data_set_projection() {
    let declared = MetricValue::DataSet(DataSetValue {
      columns: vec!["id".to_owned(), "torque".to_owned()],
      rows: vec![],
    });
    let metric = json_metric(DataType::DataSet, "$.results").with_value(Some(declared), Some(1));
    let payload = r#"{"results":[{"torque":10.5,"id":1,"ignored":true},{"id":2,"torque":9.8}]}"#;
    let Some(MetricValue::DataSet(ds)) = parse(payload, &metric).expect("valid JSON") else {
      panic!("expected a dataset");
    };
    assert_eq!(ds.columns, vec!["id", "torque"]);
    assert_eq!(ds.rows.len(), 2);
    assert_eq!(ds.rows[0][0], serde_json::json!(1));
    assert_eq!(ds.rows[1][1], serde_json::json!(9.8));
  }
}
