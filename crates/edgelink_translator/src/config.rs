// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The external configuration schema and the rehasher that folds it into
//! the internal device shape.
//!
//! The external document nests tags under devices under connections and
//! keeps polling/format settings at the connection level; the engine
//! wants self-contained per-device specs. Rehashing copies the
//! connection-level settings down and converts every tag into a metric.

use std::{fs, path::PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use edgelink_core::{
  codec::{opcua, PayloadFormat},
  errors::ConfigError,
  metric::{DataType, Metric, MetricProperties},
};

/// Default location of the locally persisted configuration copy.
pub const LOCAL_CONFIG_PATH: &str = "./config/conf.json";

const DEFAULT_POLL_INT_MS: u64 = 1_000;

fn default_poll_int() -> u64 {
  DEFAULT_POLL_INT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
  #[serde(default)]
  pub sparkplug: Option<Value>,
  #[serde(default)]
  pub device_connections: Vec<ConnectionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
  #[serde(default)]
  pub name: String,
  pub conn_type: String,
  #[serde(default = "default_poll_int")]
  pub poll_int: u64,
  #[serde(default)]
  pub payload_format: Option<PayloadFormat>,
  #[serde(default)]
  pub delimiter: Option<String>,
  #[serde(default)]
  pub devices: Vec<DeviceConfig>,
  /// Everything else, including the per-type `<details>` block keyed by
  /// names like `RESTConnDetails`. Driver factories pull their own block
  /// out via [ConnectionConfig::typed_details].
  #[serde(flatten)]
  pub extra: serde_json::Map<String, Value>,
}

impl ConnectionConfig {
  /// Deserialize this connection's details block.
  pub fn typed_details<T: DeserializeOwned>(&self, details_key: &str) -> Result<T, ConfigError> {
    let block = self
      .extra
      .get(details_key)
      .ok_or_else(|| ConfigError::MissingDetails(self.name.clone(), details_key.to_owned()))?;
    serde_json::from_value(block.clone()).map_err(|e| ConfigError::Malformed(e.to_string()))
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
  pub device_id: String,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub poll_int: Option<u64>,
  #[serde(default)]
  pub payload_format: Option<PayloadFormat>,
  #[serde(default)]
  pub delimiter: Option<String>,
  #[serde(default)]
  pub tags: Vec<TagConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagConfig {
  pub name: String,
  /// Declared datatype, possibly carrying a `BE`/`LE` endianness suffix.
  #[serde(rename = "type")]
  pub tag_type: String,
  #[serde(default)]
  pub method: Option<String>,
  #[serde(default)]
  pub address: Option<String>,
  #[serde(default)]
  pub path: Option<String>,
  #[serde(default)]
  pub eng_unit: Option<String>,
  #[serde(default)]
  pub eng_low: Option<f64>,
  #[serde(default)]
  pub eng_high: Option<f64>,
  #[serde(default)]
  pub dead_band: Option<f64>,
  #[serde(default)]
  pub tooltip: Option<String>,
  #[serde(default)]
  pub docs: Option<String>,
  #[serde(default, rename = "recordToDB")]
  pub record_to_db: Option<bool>,
}

// Typed details blocks, keyed by the names the configuration service
// uses. The OPC UA block exists so the document validates even though
// the client binding ships separately.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConnDetails {
  #[serde(rename = "baseURL")]
  pub base_url: String,
  #[serde(default)]
  pub auth_method: Option<String>,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtConnectConnDetails {
  #[serde(rename = "baseURL")]
  pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S7ConnDetails {
  pub hostname: String,
  #[serde(default = "S7ConnDetails::default_port")]
  pub port: u16,
  pub rack: u16,
  pub slot: u16,
  #[serde(default)]
  pub timeout: Option<u64>,
}

impl S7ConnDetails {
  fn default_port() -> u16 {
    102
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpcUaConnDetails {
  pub endpoint: String,
  #[serde(default)]
  pub security_mode: Option<String>,
  #[serde(default)]
  pub security_policy: Option<String>,
  #[serde(default)]
  pub use_credentials: bool,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub password: Option<String>,
}

impl OpcUaConnDetails {
  pub fn resolved_security(&self) -> (opcua::SecurityMode, opcua::SecurityPolicy) {
    (
      opcua::security_mode(self.security_mode.as_deref().unwrap_or("None")),
      opcua::security_policy(self.security_policy.as_deref().unwrap_or("None")),
    )
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConnDetails {
  pub host: String,
  pub port: u16,
  #[serde(default)]
  pub protocol: Option<String>,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub password: Option<String>,
  #[serde(default)]
  pub clean_session: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsocketConnDetails {
  pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConnDetails {
  pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsciiTcpConnDetails {
  pub host: String,
  pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenProtocolConnDetails {
  pub host: String,
  pub port: u16,
  #[serde(default)]
  pub keep_alive_secs: Option<u64>,
}

/// A self-contained device description consumed by the device actor.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
  pub device_id: String,
  pub poll_int_ms: u64,
  pub payload_format: PayloadFormat,
  pub delimiter: String,
  pub metrics: Vec<Metric>,
}

/// Parse and validate the raw document fetched from the config service.
/// An empty connection list is valid; an unparseable document is not.
pub fn validate(document: &Value) -> Result<ConfigDocument, ConfigError> {
  let parsed: ConfigDocument = serde_json::from_value(document.clone())
    .map_err(|e| ConfigError::Malformed(e.to_string()))?;
  for connection in &parsed.device_connections {
    if connection.conn_type.is_empty() {
      return Err(ConfigError::Malformed(format!(
        "connection '{}' has no connType",
        connection.name
      )));
    }
  }
  Ok(parsed)
}

/// Fold connection-level settings down into one spec per device and
/// convert every tag into a metric. Device-level settings win over
/// connection-level ones.
pub fn rehash_device(connection: &ConnectionConfig, device: &DeviceConfig) -> DeviceSpec {
  DeviceSpec {
    device_id: device.device_id.clone(),
    poll_int_ms: device.poll_int.unwrap_or(connection.poll_int),
    payload_format: device
      .payload_format
      .or(connection.payload_format)
      .unwrap_or_default(),
    delimiter: device
      .delimiter
      .clone()
      .or_else(|| connection.delimiter.clone())
      .unwrap_or_default(),
    metrics: device.tags.iter().map(tag_to_metric).collect(),
  }
}

/// One tag becomes one metric; the `BE`/`LE` suffix on the declared type
/// selects the endianness and is stripped from the type itself.
pub fn tag_to_metric(tag: &TagConfig) -> Metric {
  let (data_type, endianness) = DataType::parse_declared(&tag.tag_type);
  let mut properties = MetricProperties::new(
    tag.method.as_deref().unwrap_or("GET"),
    tag.address.clone(),
    tag.path.clone(),
  );
  properties.set_eng_unit(tag.eng_unit.clone());
  properties.set_eng_low(tag.eng_low);
  properties.set_eng_high(tag.eng_high);
  properties.set_deadband(tag.dead_band);
  properties.set_tooltip(tag.tooltip.clone());
  properties.set_documentation(tag.docs.clone());
  if let Some(endianness) = endianness {
    properties.set_endianness(endianness);
  }
  Metric::new(&tag.name, data_type)
    .with_properties(properties)
    .with_transient(!tag.record_to_db.unwrap_or(false))
}

/// The locally persisted copy of the configuration document. The engine
/// rewrites exactly one thing in it: a device's `pollInt` after a
/// polling-interval command.
#[derive(Debug, Clone)]
pub struct LocalConfigFile {
  path: PathBuf,
}

impl LocalConfigFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn load(&self) -> Result<Value, ConfigError> {
    let raw = fs::read_to_string(&self.path).map_err(|e| ConfigError::Io(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed(e.to_string()))
  }

  pub fn save(&self, document: &Value) -> Result<(), ConfigError> {
    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
    }
    let raw =
      serde_json::to_string_pretty(document).map_err(|e| ConfigError::Malformed(e.to_string()))?;
    fs::write(&self.path, raw).map_err(|e| ConfigError::Io(e.to_string()))
  }

  /// Rewrite `pollInt` under the matching device entry, leaving the rest
  /// of the document byte-for-byte alone.
  pub fn update_poll_interval(&self, device_id: &str, poll_int_ms: u64) -> Result<(), ConfigError> {
    let mut document = self.load()?;
    let mut found = false;
    if let Some(connections) = document
      .get_mut("deviceConnections")
      .and_then(Value::as_array_mut)
    {
      for connection in connections {
        if let Some(devices) = connection.get_mut("devices").and_then(Value::as_array_mut) {
          for device in devices {
            if device.get("deviceId").and_then(Value::as_str) == Some(device_id) {
              device["pollInt"] = Value::from(poll_int_ms);
              found = true;
            }
          }
        }
      }
    }
    if !found {
      return Err(ConfigError::Malformed(format!(
        "no device entry '{device_id}' in local config"
      )));
    }
    self.save(&document)
  }
}
