// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The metric model.
//!
//! A [Metric] is the atomic unit of translation: one named value on one
//! device, carrying the Sparkplug datatype, the southbound addressing
//! properties that tell a driver where the value lives, and the
//! value/timestamp pair that change detection operates on.

pub mod store;

use std::{collections::HashMap, fmt, str::FromStr};

use getset::{CopyGetters, Getters, MutGetters, Setters};
use serde::{Deserialize, Serialize};

use crate::util::unix_millis;

/// Sparkplug B datatypes, spelled the way the external configuration
/// document spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
  #[serde(rename = "boolean")]
  Boolean,
  #[serde(rename = "int8")]
  Int8,
  #[serde(rename = "int16")]
  Int16,
  #[serde(rename = "int32")]
  Int32,
  #[serde(rename = "int64")]
  Int64,
  #[serde(rename = "uInt8")]
  UInt8,
  #[serde(rename = "uInt16")]
  UInt16,
  #[serde(rename = "uInt32")]
  UInt32,
  #[serde(rename = "uInt64")]
  UInt64,
  #[serde(rename = "float")]
  Float,
  #[serde(rename = "double")]
  Double,
  #[serde(rename = "dateTime")]
  DateTime,
  #[serde(rename = "string")]
  String,
  #[serde(rename = "text")]
  Text,
  #[serde(rename = "uuid")]
  Uuid,
  #[serde(rename = "bytes")]
  Bytes,
  #[serde(rename = "file")]
  File,
  #[serde(rename = "dataSet")]
  DataSet,
  #[serde(rename = "template")]
  Template,
  #[serde(rename = "propertySet")]
  PropertySet,
  #[serde(rename = "propertySetList")]
  PropertySetList,
  #[serde(other, rename = "unknown")]
  #[default]
  Unknown,
}

impl DataType {
  /// Fixed wire width of this type inside a binary buffer, if it has one.
  pub fn buffer_size(&self) -> Option<usize> {
    match self {
      DataType::Boolean | DataType::Int8 | DataType::UInt8 => Some(1),
      DataType::Int16 | DataType::UInt16 => Some(2),
      DataType::Int32 | DataType::UInt32 | DataType::Float => Some(4),
      DataType::Int64 | DataType::UInt64 | DataType::Double | DataType::DateTime => Some(8),
      _ => None,
    }
  }

  pub fn is_signed_integer(&self) -> bool {
    matches!(
      self,
      DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
    )
  }

  pub fn is_unsigned_integer(&self) -> bool {
    matches!(
      self,
      DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
    )
  }

  pub fn config_name(&self) -> &'static str {
    match self {
      DataType::Boolean => "boolean",
      DataType::Int8 => "int8",
      DataType::Int16 => "int16",
      DataType::Int32 => "int32",
      DataType::Int64 => "int64",
      DataType::UInt8 => "uInt8",
      DataType::UInt16 => "uInt16",
      DataType::UInt32 => "uInt32",
      DataType::UInt64 => "uInt64",
      DataType::Float => "float",
      DataType::Double => "double",
      DataType::DateTime => "dateTime",
      DataType::String => "string",
      DataType::Text => "text",
      DataType::Uuid => "uuid",
      DataType::Bytes => "bytes",
      DataType::File => "file",
      DataType::DataSet => "dataSet",
      DataType::Template => "template",
      DataType::PropertySet => "propertySet",
      DataType::PropertySetList => "propertySetList",
      DataType::Unknown => "unknown",
    }
  }

  /// Parse a declared config type, which may carry a `BE`/`LE` endianness
  /// suffix (e.g. `uInt32BE`). The suffix selects the endianness and is
  /// stripped from the type itself.
  pub fn parse_declared(declared: &str) -> (DataType, Option<Endianness>) {
    if let Some(stripped) = declared.strip_suffix("BE") {
      if let Ok(dt) = stripped.parse() {
        return (dt, Some(Endianness::Big));
      }
    }
    if let Some(stripped) = declared.strip_suffix("LE") {
      if let Ok(dt) = stripped.parse() {
        return (dt, Some(Endianness::Little));
      }
    }
    (declared.parse().unwrap_or(DataType::Unknown), None)
  }
}

impl FromStr for DataType {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "boolean" => DataType::Boolean,
      "int8" => DataType::Int8,
      "int16" => DataType::Int16,
      "int32" => DataType::Int32,
      "int64" => DataType::Int64,
      "uInt8" => DataType::UInt8,
      "uInt16" => DataType::UInt16,
      "uInt32" => DataType::UInt32,
      "uInt64" => DataType::UInt64,
      "float" => DataType::Float,
      "double" => DataType::Double,
      "dateTime" => DataType::DateTime,
      "string" => DataType::String,
      "text" => DataType::Text,
      "uuid" => DataType::Uuid,
      "bytes" => DataType::Bytes,
      "file" => DataType::File,
      "dataSet" => DataType::DataSet,
      "template" => DataType::Template,
      "propertySet" => DataType::PropertySet,
      "propertySetList" => DataType::PropertySetList,
      _ => return Err(()),
    })
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.config_name())
  }
}

/// Byte order of a value inside a fixed binary buffer. The numeric codes
/// are the ones the configuration document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endianness {
  /// 4321
  #[default]
  Big,
  /// 1234
  Little,
  /// 3412, big-endian with a 16-bit word swap
  Pdp,
}

impl Endianness {
  pub fn from_code(code: u32) -> Option<Endianness> {
    match code {
      4321 => Some(Endianness::Big),
      1234 => Some(Endianness::Little),
      3412 => Some(Endianness::Pdp),
      _ => None,
    }
  }

  pub fn code(&self) -> u32 {
    match self {
      Endianness::Big => 4321,
      Endianness::Little => 1234,
      Endianness::Pdp => 3412,
    }
  }
}

/// A Sparkplug dataset value: named columns over ordered rows. Cell values
/// stay as JSON until a downstream consumer projects them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataSetValue {
  pub columns: Vec<String>,
  pub rows: Vec<Vec<serde_json::Value>>,
}

/// A decoded metric value in the native representation of its [DataType].
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
  Boolean(bool),
  Int8(i8),
  Int16(i16),
  Int32(i32),
  Int64(i64),
  UInt8(u8),
  UInt16(u16),
  UInt32(u32),
  UInt64(u64),
  Float(f32),
  Double(f64),
  /// Milliseconds since the Unix epoch.
  DateTime(u64),
  String(String),
  Bytes(Vec<u8>),
  DataSet(DataSetValue),
}

impl MetricValue {
  pub fn data_type(&self) -> DataType {
    match self {
      MetricValue::Boolean(_) => DataType::Boolean,
      MetricValue::Int8(_) => DataType::Int8,
      MetricValue::Int16(_) => DataType::Int16,
      MetricValue::Int32(_) => DataType::Int32,
      MetricValue::Int64(_) => DataType::Int64,
      MetricValue::UInt8(_) => DataType::UInt8,
      MetricValue::UInt16(_) => DataType::UInt16,
      MetricValue::UInt32(_) => DataType::UInt32,
      MetricValue::UInt64(_) => DataType::UInt64,
      MetricValue::Float(_) => DataType::Float,
      MetricValue::Double(_) => DataType::Double,
      MetricValue::DateTime(_) => DataType::DateTime,
      MetricValue::String(_) => DataType::String,
      MetricValue::Bytes(_) => DataType::Bytes,
      MetricValue::DataSet(_) => DataType::DataSet,
    }
  }

  pub fn as_u64(&self) -> Option<u64> {
    match self {
      MetricValue::UInt8(v) => Some(*v as u64),
      MetricValue::UInt16(v) => Some(*v as u64),
      MetricValue::UInt32(v) => Some(*v as u64),
      MetricValue::UInt64(v) => Some(*v),
      MetricValue::DateTime(v) => Some(*v),
      MetricValue::Int8(v) if *v >= 0 => Some(*v as u64),
      MetricValue::Int16(v) if *v >= 0 => Some(*v as u64),
      MetricValue::Int32(v) if *v >= 0 => Some(*v as u64),
      MetricValue::Int64(v) if *v >= 0 => Some(*v as u64),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      MetricValue::Int8(v) => Some(*v as f64),
      MetricValue::Int16(v) => Some(*v as f64),
      MetricValue::Int32(v) => Some(*v as f64),
      MetricValue::Int64(v) => Some(*v as f64),
      MetricValue::UInt8(v) => Some(*v as f64),
      MetricValue::UInt16(v) => Some(*v as f64),
      MetricValue::UInt32(v) => Some(*v as f64),
      MetricValue::UInt64(v) => Some(*v as f64),
      MetricValue::Float(v) => Some(*v as f64),
      MetricValue::Double(v) => Some(*v),
      MetricValue::DateTime(v) => Some(*v as f64),
      MetricValue::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
      _ => None,
    }
  }
}

/// The recognised metric properties as a typed record, with an
/// escape-hatch map for anything a future schema adds.
///
/// `method` drives read participation: only metrics whose method starts
/// with `GET` are read from the device; everything else is a write-only
/// command target.
#[derive(Debug, Clone, PartialEq, Default, Getters, CopyGetters, Setters, MutGetters)]
pub struct MetricProperties {
  #[getset(get = "pub", set = "pub")]
  method: String,
  /// Native device-side locator (PLC register, topic, HTTP path, node id).
  #[getset(get = "pub", set = "pub")]
  address: Option<String>,
  /// Sub-selector inside the payload returned for `address`: JSONPath,
  /// XPath, a byte offset, or a delimited-field index.
  #[getset(get = "pub", set = "pub")]
  path: Option<String>,
  #[getset(get = "pub", set = "pub")]
  friendly_name: Option<String>,
  #[getset(get = "pub", set = "pub")]
  tooltip: Option<String>,
  #[getset(get = "pub", set = "pub")]
  documentation: Option<String>,
  #[getset(get = "pub", set = "pub")]
  eng_unit: Option<String>,
  #[getset(get_copy = "pub", set = "pub")]
  eng_low: Option<f64>,
  #[getset(get_copy = "pub", set = "pub")]
  eng_high: Option<f64>,
  /// Change-suppression threshold. Carried through untouched; the engine
  /// does not enforce it numerically.
  #[getset(get_copy = "pub", set = "pub")]
  deadband: Option<f64>,
  #[getset(get_copy = "pub", set = "pub")]
  endianness: Endianness,
  #[getset(get = "pub", get_mut = "pub")]
  extra: HashMap<String, String>,
}

impl MetricProperties {
  pub fn new(method: &str, address: Option<String>, path: Option<String>) -> Self {
    Self {
      method: method.to_owned(),
      address,
      path,
      ..Default::default()
    }
  }
}

/// The atomic unit of the translation engine.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters, Setters, MutGetters)]
pub struct Metric {
  /// Unique per device, hierarchical with `/` separators.
  #[getset(get = "pub")]
  name: String,
  /// Assigned by the Sparkplug layer at BIRTH; later frames carry the
  /// alias instead of the name.
  #[getset(get_copy = "pub")]
  alias: Option<u64>,
  #[getset(get_copy = "pub", set = "pub")]
  data_type: DataType,
  value: Option<MetricValue>,
  #[getset(get_copy = "pub")]
  timestamp: u64,
  #[getset(get_copy = "pub", set = "pub")]
  is_transient: bool,
  #[getset(get = "pub", get_mut = "pub", set = "pub")]
  properties: MetricProperties,
}

impl Metric {
  /// A fresh metric is null with timestamp zero; the first update stamps
  /// it. Monotonicity is enforced across updates, not against creation
  /// time, so device-supplied timestamps behind our wall clock still
  /// land.
  pub fn new(name: &str, data_type: DataType) -> Self {
    Self {
      name: name.to_owned(),
      alias: None,
      data_type,
      value: None,
      timestamp: 0,
      is_transient: false,
      properties: MetricProperties::default(),
    }
  }

  pub fn value(&self) -> Option<&MetricValue> {
    self.value.as_ref()
  }

  pub fn is_null(&self) -> bool {
    self.value.is_none()
  }

  /// True when this metric participates in device reads.
  pub fn is_readable(&self) -> bool {
    self.properties.method().starts_with("GET")
  }

  /// Write value, timestamp and null flag together. A `None` timestamp
  /// takes the local wall clock; a timestamp earlier than the stored one
  /// is clamped so per-metric timestamps never move backwards.
  pub fn set_value(&mut self, value: Option<MetricValue>, timestamp: Option<u64>) {
    let ts = timestamp.unwrap_or_else(unix_millis);
    self.value = value;
    self.timestamp = ts.max(self.timestamp);
  }

  pub(crate) fn set_alias(&mut self, alias: u64) {
    self.alias = Some(alias);
  }

  /// Builder-style helpers used by the config rehasher and tests.
  pub fn with_properties(mut self, properties: MetricProperties) -> Self {
    self.properties = properties;
    self
  }

  pub fn with_value(mut self, value: Option<MetricValue>, timestamp: Option<u64>) -> Self {
    self.set_value(value, timestamp);
    self
  }

  pub fn with_transient(mut self, transient: bool) -> Self {
    self.is_transient = transient;
    self
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_declared_type_suffix() {
    assert_eq!(
      DataType::parse_declared("uInt32BE"),
      (DataType::UInt32, Some(Endianness::Big))
    );
    assert_eq!(
      DataType::parse_declared("int16LE"),
      (DataType::Int16, Some(Endianness::Little))
    );
    assert_eq!(DataType::parse_declared("float"), (DataType::Float, None));
    assert_eq!(
      DataType::parse_declared("gibberish"),
      (DataType::Unknown, None)
    );
  }

  #[test]
  fn test_timestamp_never_moves_backwards() {
    let mut m = Metric::new("Line 1/Speed", DataType::Double);
    m.set_value(Some(MetricValue::Double(1.0)), Some(2_000));
    m.set_value(Some(MetricValue::Double(2.0)), Some(1_000));
    assert_eq!(m.timestamp(), 2_000);
    assert_eq!(m.value(), Some(&MetricValue::Double(2.0)));
  }

  #[test]
  fn test_readable_method_prefixes() {
    let mut m = Metric::new("t", DataType::Boolean);
    m.properties_mut().set_method("GET_POLL".to_owned());
    assert!(m.is_readable());
    m.properties_mut().set_method("POST".to_owned());
    assert!(!m.is_readable());
  }

  #[test]
  fn test_endianness_codes() {
    assert_eq!(Endianness::from_code(3412), Some(Endianness::Pdp));
    assert_eq!(Endianness::from_code(1234), Some(Endianness::Little));
    assert_eq!(Endianness::from_code(4321), Some(Endianness::Big));
    assert_eq!(Endianness::from_code(1), None);
  }
}
