// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! XML payload codec with XPath selection. Decode only; the write path
//! is reserved and the encoder returns empty.

use sxd_document::parser;
use sxd_xpath::{evaluate_xpath, Value as XpathValue};

use super::coerce;
use crate::{
  errors::CodecError,
  metric::{DataType, Metric, MetricValue},
};

pub fn parse(raw: &str, metric: &Metric) -> Result<Option<MetricValue>, CodecError> {
  let package = parser::parse(raw)
    .map_err(|e| CodecError::InvalidPayload("XML".to_owned(), e.to_string()))?;
  let document = package.as_document();
  let path = metric.properties().path().clone().unwrap_or_default();
  let data_type = metric.data_type();
  if path.is_empty() {
    let text = document.root().children().iter().fold(String::new(), |acc, c| {
      acc + &c
        .element()
        .map(|e| element_text(e))
        .unwrap_or_default()
    });
    return Ok(coerce::string_to_value(&text, data_type));
  }
  let value = evaluate_xpath(&document, &path).map_err(|e| CodecError::Xml(e.to_string()))?;
  Ok(match value {
    XpathValue::Boolean(b) => match data_type {
      DataType::Boolean => Some(MetricValue::Boolean(b)),
      _ => coerce::number_to_value(if b { 1.0 } else { 0.0 }, data_type),
    },
    XpathValue::Number(n) => match data_type {
      DataType::String | DataType::Text => Some(MetricValue::String(n.to_string())),
      _ => coerce::number_to_value(n, data_type),
    },
    XpathValue::String(s) => coerce::string_to_value(&s, data_type),
    XpathValue::Nodeset(nodes) => nodes
      .document_order_first()
      .and_then(|node| coerce::string_to_value(&node.string_value(), data_type)),
  })
}

fn element_text(element: sxd_document::dom::Element<'_>) -> String {
  element.children().iter().fold(String::new(), |acc, child| {
    if let Some(text) = child.text() {
      acc + text.text()
    } else if let Some(e) = child.element() {
      acc + &element_text(e)
    } else {
      acc
    }
  })
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::metric::MetricProperties;

  fn xml_metric(data_type: DataType, path: &str) -> Metric {
    Metric::new("m", data_type).with_properties(MetricProperties::new(
      "GET",
      Some("current".to_owned()),
      if path.is_empty() { None } else { Some(path.to_owned()) },
    ))
  }

  const SAMPLE: &str = r#"<MTConnectStreams><DeviceStream name="mill-1"><Samples><Temperature dataItemId="t1">88.5</Temperature><Load>12</Load></Samples></DeviceStream></MTConnectStreams>"#;

  #[test]
  fn test_xpath_decode() {
    let metric = xml_metric(
      DataType::Double,
      "/MTConnectStreams/DeviceStream/Samples/Temperature",
    );
    assert_eq!(
      parse(SAMPLE, &metric).expect("valid XML"),
      Some(MetricValue::Double(88.5))
    );
  }

  #[test]
  fn test_xpath_attribute() {
    let metric = xml_metric(DataType::String, "/MTConnectStreams/DeviceStream/@name");
    assert_eq!(
      parse(SAMPLE, &metric).expect("valid XML"),
      Some(MetricValue::String("mill-1".to_owned()))
    );
  }

  #[test]
  fn test_invalid_xml_is_error() {
    let metric = xml_metric(DataType::Double, "/a");
    assert!(parse("<unclosed", &metric).is_err());
  }

  #[test]
  fn test_missing_node_is_none() {
    let metric = xml_metric(DataType::Double, "/MTConnectStreams/Nope");
    assert_eq!(parse(SAMPLE, &metric).expect("valid XML"), None);
  }
}
