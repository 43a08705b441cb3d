// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Edgelink error structs/enums, one enum per failure domain.

use displaydoc::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type EdgelinkResult<T = ()> = Result<T, EdgelinkError>;

/// Codec errors occur while decoding a southbound payload into a metric
/// value or while encoding metrics back into a wire payload. They are
/// confined to the metric being processed and never tear down a device.
#[derive(Debug, Error, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecError {
  /// Payload is not valid {0}: {1}
  InvalidPayload(String, String),
  /// JSONPath '{0}' failed: {1}
  JsonPath(String, String),
  /// XML/XPath failure: {0}
  Xml(String),
  /// Buffer read of {0} bytes at offset {1} exceeds payload of {2} bytes
  BufferOutOfRange(usize, usize, usize),
  /// Type {0} is not supported by the {1} payload format
  UnsupportedType(String, String),
  /// Invalid path selector '{0}'
  InvalidPath(String),
}

/// Connection errors are transient southbound I/O failures. Drivers log
/// them and reconnect; the device watchdog reports persistent silence
/// northbound as a DEATH.
#[derive(Debug, Error, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionError {
  /// Connection is not open
  NotOpen,
  /// Transport failure: {0}
  Transport(String),
  /// Driver does not support writes: {0}
  WriteNotSupported(String),
  /// Invalid device address '{0}': {1}
  InvalidAddress(String, String),
  /// Protocol error: {0}
  Protocol(String),
}

/// Sparkplug errors surface from the northbound node while publishing
/// BIRTH/DATA/DEATH frames.
#[derive(Debug, Error, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SparkplugError {
  /// Publish failed: {0}
  Publish(String),
  /// Sparkplug node has stopped
  Stopped,
}

/// Config errors cover the external configuration document and the local
/// persisted copy. An invalid remote document is retried indefinitely; a
/// local file error is logged and the write dropped.
#[derive(Debug, Error, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
  /// Malformed configuration document: {0}
  Malformed(String),
  /// Connection '{0}' is missing its '{1}' details block
  MissingDetails(String, String),
  /// Unknown connection type '{0}'
  UnknownConnectionType(String),
  /// Config file I/O failure: {0}
  Io(String),
}

/// Aggregate error for translator bringup and teardown.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgelinkError {
  #[error(transparent)]
  Codec(#[from] CodecError),
  #[error(transparent)]
  Connection(#[from] ConnectionError),
  #[error(transparent)]
  Sparkplug(#[from] SparkplugError),
  #[error(transparent)]
  Config(#[from] ConfigError),
}
