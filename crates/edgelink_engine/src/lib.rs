// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Engine assembly: the registry wiring connection-type strings to
//! driver factories and their config details keys. A deployment builds
//! its [TranslatorBuilder](edgelink_translator::translator::TranslatorBuilder)
//! with [default_registry] (or a subset) and the service implementations
//! of its environment.

#[macro_use]
extern crate log;

use std::sync::Arc;

use edgelink_conn_http::RestConnection;
use edgelink_conn_mqtt::MqttConnection;
use edgelink_conn_openprotocol::OpenProtocolConnection;
use edgelink_conn_s7::S7Connection;
use edgelink_conn_socket::{AsciiTcpConnection, UdpConnection};
use edgelink_conn_websocket::WebsocketConnection;
use edgelink_translator::{
  config::ConnectionConfig,
  connection::DeviceConnection,
  translator::{ConnectionRegistry, RegistryEntry},
};

pub use edgelink_translator::translator::{Translator, TranslatorBuilder};

macro_rules! registry_entry {
  ($registry:expr, $conn_type:literal, $details_key:literal, $build:expr) => {
    $registry.insert(
      $conn_type.to_owned(),
      RegistryEntry {
        details_key: $details_key,
        factory: Box::new($build),
      },
    );
  };
}

/// Every driver this build of the engine carries.
///
/// `OPC UA` is intentionally absent: its client binding is an external
/// collaborator, so a deployment that needs it registers its own entry
/// here. The translator logs and skips connection types it cannot
/// resolve.
pub fn default_registry() -> ConnectionRegistry {
  let mut registry = ConnectionRegistry::new();
  registry_entry!(registry, "REST", "RESTConnDetails", |config: &ConnectionConfig| {
    let details = config
      .typed_details("RESTConnDetails")
      .map_err(details_error)?;
    Ok(Arc::new(RestConnection::new(&config.name, details)?) as Arc<dyn DeviceConnection>)
  });
  registry_entry!(registry, "MTConnect", "MTConnectConnDetails", |config: &ConnectionConfig| {
    let details = config
      .typed_details("MTConnectConnDetails")
      .map_err(details_error)?;
    Ok(Arc::new(RestConnection::mtconnect(&config.name, details)?) as Arc<dyn DeviceConnection>)
  });
  registry_entry!(registry, "MQTT", "MQTTConnDetails", |config: &ConnectionConfig| {
    let details = config
      .typed_details("MQTTConnDetails")
      .map_err(details_error)?;
    Ok(Arc::new(MqttConnection::new(&config.name, details)) as Arc<dyn DeviceConnection>)
  });
  registry_entry!(registry, "Websocket", "WebsocketConnDetails", |config: &ConnectionConfig| {
    let details = config
      .typed_details("WebsocketConnDetails")
      .map_err(details_error)?;
    Ok(Arc::new(WebsocketConnection::new(&config.name, details)) as Arc<dyn DeviceConnection>)
  });
  registry_entry!(registry, "UDP", "UDPConnDetails", |config: &ConnectionConfig| {
    let details = config
      .typed_details("UDPConnDetails")
      .map_err(details_error)?;
    Ok(Arc::new(UdpConnection::new(&config.name, details)) as Arc<dyn DeviceConnection>)
  });
  registry_entry!(registry, "ASCIITCP", "ASCIITCPConnDetails", |config: &ConnectionConfig| {
    let details = config
      .typed_details("ASCIITCPConnDetails")
      .map_err(details_error)?;
    Ok(Arc::new(AsciiTcpConnection::new(&config.name, details)) as Arc<dyn DeviceConnection>)
  });
  registry_entry!(registry, "S7", "s7ConnDetails", |config: &ConnectionConfig| {
    let details = config
      .typed_details("s7ConnDetails")
      .map_err(details_error)?;
    Ok(Arc::new(S7Connection::new(&config.name, details)) as Arc<dyn DeviceConnection>)
  });
  registry_entry!(registry, "OpenProtocol", "OpenProtocolConnDetails", |config: &ConnectionConfig| {
    let details = config
      .typed_details("OpenProtocolConnDetails")
      .map_err(details_error)?;
    Ok(Arc::new(OpenProtocolConnection::new(&config.name, details)) as Arc<dyn DeviceConnection>)
  });
  debug!("driver registry carries {} connection type(s)", registry.len());
  registry
}

fn details_error(e: edgelink_core::errors::ConfigError) -> edgelink_core::errors::ConnectionError {
  edgelink_core::errors::ConnectionError::Protocol(e.to_string())
}

#[cfg(test)]
mod test {
  use super::*;

  fn connection(conn_type: &str, details_key: &str, details: serde_json::Value) -> ConnectionConfig {
    let mut document = serde_json::json!({
      "name": "test",
      "connType": conn_type,
    });
    document[details_key] = details;
    serde_json::from_value(document).expect("valid connection config")
  }

  #[test]
  fn test_registry_covers_declared_types() {
    let registry = default_registry();
    for conn_type in [
      "REST",
      "MTConnect",
      "MQTT",
      "Websocket",
      "UDP",
      "ASCIITCP",
      "S7",
      "OpenProtocol",
    ] {
      assert!(registry.contains_key(conn_type), "missing {conn_type}");
    }
    assert!(!registry.contains_key("OPC UA"), "OPC UA needs its binding");
  }

  #[test]
  fn test_factories_construct_from_config() {
    let registry = default_registry();
    let cases = vec![
      connection("REST", "RESTConnDetails", serde_json::json!({"baseURL": "http://gw/api"})),
      connection("MQTT", "MQTTConnDetails", serde_json::json!({"host": "broker", "port": 1883})),
      connection(
        "S7",
        "s7ConnDetails",
        serde_json::json!({"hostname": "plc", "rack": 0, "slot": 1}),
      ),
      connection("Websocket", "WebsocketConnDetails", serde_json::json!({"url": "ws://dev:9000"})),
      connection("UDP", "UDPConnDetails", serde_json::json!({"port": 9100})),
      connection(
        "ASCIITCP",
        "ASCIITCPConnDetails",
        serde_json::json!({"host": "reader", "port": 4001}),
      ),
      connection(
        "OpenProtocol",
        "OpenProtocolConnDetails",
        serde_json::json!({"host": "ctrl", "port": 4545}),
      ),
    ];
    for config in cases {
      let entry = registry.get(&config.conn_type).expect("registered");
      let built = (entry.factory)(&config);
      assert!(built.is_ok(), "{} factory failed", config.conn_type);
    }
  }

  #[test]
  fn test_factory_rejects_missing_details() {
    let registry = default_registry();
    let config: ConnectionConfig = serde_json::from_value(serde_json::json!({
      "name": "test",
      "connType": "REST",
    }))
    .expect("valid connection config");
    let entry = registry.get("REST").expect("registered");
    assert!((entry.factory)(&config).is_err());
  }
}
