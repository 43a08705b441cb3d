// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Delimited text codec. With a delimiter the payload is split and the
//! metric's `path` indexes a field; without one the whole payload is the
//! value.

use super::coerce;
use crate::{
  errors::CodecError,
  metric::{Metric, MetricValue},
};

pub fn parse(
  raw: &str,
  metric: &Metric,
  delimiter: &str,
) -> Result<Option<MetricValue>, CodecError> {
  let path = metric.properties().path().clone().unwrap_or_default();
  if delimiter.is_empty() {
    return Ok(coerce::string_to_value(raw, metric.data_type()));
  }
  let index: usize = path
    .trim()
    .parse()
    .map_err(|_| CodecError::InvalidPath(path.clone()))?;
  let Some(field) = raw.split(delimiter).nth(index) else {
    return Ok(None);
  };
  Ok(coerce::string_to_value(field, metric.data_type()))
}

pub fn encode(metrics: &[Metric], delimiter: &str) -> String {
  metrics
    .iter()
    .map(|m| m.value().map(coerce::value_to_string).unwrap_or_default())
    .collect::<Vec<_>>()
    .join(delimiter)
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::metric::{DataType, MetricProperties};

  fn field_metric(data_type: DataType, path: &str) -> Metric {
    Metric::new("m", data_type).with_properties(MetricProperties::new(
      "GET",
      Some("line".to_owned()),
      if path.is_empty() { None } else { Some(path.to_owned()) },
    ))
  }

  #[test]
  fn test_field_index() {
    let metric = field_metric(DataType::Int32, "2");
    assert_eq!(
      parse("a;17;42", &metric, ";").expect("valid"),
      Some(MetricValue::Int32(42))
    );
  }

  #[test]
  fn test_missing_field_is_none() {
    let metric = field_metric(DataType::Int32, "5");
    assert_eq!(parse("a;17;42", &metric, ";").expect("valid"), None);
  }

  #[test]
  fn test_whole_payload_without_delimiter() {
    let metric = field_metric(DataType::Double, "");
    assert_eq!(
      parse("3.25", &metric, "").expect("valid"),
      Some(MetricValue::Double(3.25))
    );
  }

  #[test]
  fn test_encode_joins_string_coercions() {
    let m1 = field_metric(DataType::Int32, "0").with_value(Some(MetricValue::Int32(1)), Some(1));
    let m2 = field_metric(DataType::String, "1")
      .with_value(Some(MetricValue::String("go".to_owned())), Some(1));
    assert_eq!(encode(&[m1, m2], ";"), "1;go");
  }
}
