// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The payload codec layer.
//!
//! Southbound drivers hand the engine whatever their wire gave them; this
//! module turns that into typed metric values (and back). Four live
//! formats: delimited text, JSON with JSONPath selection, XML with XPath
//! selection, and fixed binary buffers with per-metric endianness.
//! `serialisedBuffer` is reserved.

pub mod buffer;
pub mod coerce;
pub mod delimited;
pub mod json;
pub mod opcua;
pub mod xml;

use std::{borrow::Cow, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
  errors::CodecError,
  metric::{Metric, MetricValue},
};

/// Payload formats, spelled the way the configuration document spells
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PayloadFormat {
  #[serde(rename = "delimited")]
  #[default]
  Delimited,
  #[serde(rename = "JSON")]
  Json,
  #[serde(rename = "XML")]
  Xml,
  #[serde(rename = "fixedBuffer")]
  FixedBuffer,
  #[serde(rename = "serialisedBuffer")]
  SerialisedBuffer,
}

impl PayloadFormat {
  pub fn config_name(&self) -> &'static str {
    match self {
      PayloadFormat::Delimited => "delimited",
      PayloadFormat::Json => "JSON",
      PayloadFormat::Xml => "XML",
      PayloadFormat::FixedBuffer => "fixedBuffer",
      PayloadFormat::SerialisedBuffer => "serialisedBuffer",
    }
  }
}

impl FromStr for PayloadFormat {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "delimited" => PayloadFormat::Delimited,
      "JSON" => PayloadFormat::Json,
      "XML" => PayloadFormat::Xml,
      "fixedBuffer" => PayloadFormat::FixedBuffer,
      "serialisedBuffer" => PayloadFormat::SerialisedBuffer,
      _ => return Err(()),
    })
  }
}

impl fmt::Display for PayloadFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.config_name())
  }
}

/// What a driver delivers for one address: raw wire bytes, text, or a
/// value it already decoded natively (codec bypass).
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
  Bytes(Vec<u8>),
  Text(String),
  Decoded(MetricValue),
}

impl RawValue {
  pub fn as_text(&self) -> Option<Cow<'_, str>> {
    match self {
      RawValue::Text(s) => Some(Cow::Borrowed(s)),
      RawValue::Bytes(b) => Some(String::from_utf8_lossy(b)),
      RawValue::Decoded(_) => None,
    }
  }

  pub fn as_bytes(&self) -> Option<&[u8]> {
    match self {
      RawValue::Bytes(b) => Some(b),
      RawValue::Text(s) => Some(s.as_bytes()),
      RawValue::Decoded(_) => None,
    }
  }
}

/// An encoded southbound payload ready for a driver write.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedPayload {
  Text(String),
  Bytes(Vec<u8>),
}

impl EncodedPayload {
  pub fn into_bytes(self) -> Vec<u8> {
    match self {
      EncodedPayload::Text(s) => s.into_bytes(),
      EncodedPayload::Bytes(b) => b,
    }
  }

  pub fn is_empty(&self) -> bool {
    match self {
      EncodedPayload::Text(s) => s.is_empty(),
      EncodedPayload::Bytes(b) => b.is_empty(),
    }
  }
}

/// Decode one metric's value out of a raw payload. `Ok(None)` means the
/// payload holds nothing for this metric (absent path, unparseable
/// number); the caller leaves the metric unchanged.
pub fn parse_value(
  raw: &RawValue,
  metric: &Metric,
  format: PayloadFormat,
  delimiter: &str,
) -> Result<Option<MetricValue>, CodecError> {
  if let RawValue::Decoded(value) = raw {
    return Ok(coerce::convert(value, metric.data_type()));
  }
  match format {
    PayloadFormat::Delimited => {
      let text = raw.as_text().unwrap_or_default();
      delimited::parse(&text, metric, delimiter)
    }
    PayloadFormat::Json => {
      let text = raw.as_text().unwrap_or_default();
      json::parse(&text, metric)
    }
    PayloadFormat::Xml => {
      let text = raw.as_text().unwrap_or_default();
      xml::parse(&text, metric)
    }
    PayloadFormat::FixedBuffer => {
      let bytes = raw.as_bytes().unwrap_or_default();
      buffer::parse(bytes, metric)
    }
    PayloadFormat::SerialisedBuffer => {
      debug!("serialisedBuffer decode is reserved, ignoring payload");
      Ok(None)
    }
  }
}

/// Payload-embedded timestamp, if the format carries one. JSON payloads
/// may put epoch milliseconds (or RFC-3339 text) at `$.timestamp`; every
/// other format defers to the receiver's wall clock.
pub fn parse_timestamp(raw: &RawValue, format: PayloadFormat) -> Option<u64> {
  match format {
    PayloadFormat::Json => json::parse_timestamp(&raw.as_text()?),
    _ => None,
  }
}

/// Encode metrics into one southbound payload, the inverse of
/// [parse_value]. XML and serialisedBuffer writes are reserved and
/// produce an empty payload with a warning.
pub fn encode(
  metrics: &[Metric],
  format: PayloadFormat,
  delimiter: &str,
) -> Result<EncodedPayload, CodecError> {
  match format {
    PayloadFormat::Delimited => Ok(EncodedPayload::Text(delimited::encode(metrics, delimiter))),
    PayloadFormat::Json => Ok(EncodedPayload::Text(json::encode(metrics)?)),
    PayloadFormat::FixedBuffer => Ok(EncodedPayload::Bytes(buffer::encode(metrics)?)),
    PayloadFormat::Xml => {
      warn!("XML encode is not implemented, producing an empty payload");
      Ok(EncodedPayload::Text(String::new()))
    }
    PayloadFormat::SerialisedBuffer => {
      warn!("serialisedBuffer encode is not implemented, producing an empty payload");
      Ok(EncodedPayload::Bytes(Vec::new()))
    }
  }
}
