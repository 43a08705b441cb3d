// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Supervisor bringup and routing against stub services.

mod util;

use std::sync::{
  atomic::{AtomicU32, Ordering},
  Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use edgelink_translator::{
  config::LocalConfigFile,
  connection::DeviceConnection,
  services::{ConfigSource, IdentityProvider, Principal},
  sparkplug::{CommandMetric, CommandPayload, SparkplugEvent},
  translator::{ConnectionRegistry, RegistryEntry, TranslatorBuilder},
};

use util::{MockConnection, MockSparkplug};

struct StubIdentity {
  attempts: AtomicU32,
}

#[async_trait]
impl IdentityProvider for StubIdentity {
  async fn find_principal(&self) -> Option<Principal> {
    // Unavailable for the first two polls.
    if self.attempts.fetch_add(1, Ordering::SeqCst) < 2 {
      return None;
    }
    Some(Principal::new(Uuid::new_v4(), "Plant/Edge1"))
  }
}

struct StubConfig {
  attempts: AtomicU32,
}

#[async_trait]
impl ConfigSource for StubConfig {
  async fn fetch_config(&self, _application: Uuid, _node: Uuid) -> Option<serde_json::Value> {
    match self.attempts.fetch_add(1, Ordering::SeqCst) {
      0 => None,
      // An invalid document must be retried, not accepted.
      1 => Some(serde_json::json!({"deviceConnections": [{"name": "broken"}]})),
      _ => Some(serde_json::json!({
        "sparkplug": {"serverUrl": "mqtt://broker:1883"},
        "deviceConnections": [
          {
            "name": "line-1",
            "connType": "Mock",
            "pollInt": 1000,
            "payloadFormat": "JSON",
            "MockConnDetails": {},
            "devices": [
              {
                "deviceId": "oven-1",
                "tags": [
                  {
                    "name": "Zone 1/Temperature",
                    "type": "float",
                    "method": "GET",
                    "address": "probe",
                    "path": "$.temp"
                  }
                ]
              }
            ]
          },
          {
            "name": "mystery",
            "connType": "OPC UA",
            "OPCUAConnDetails": {"endpoint": "opc.tcp://plc:4840"},
            "devices": [{"deviceId": "ghost"}]
          }
        ]
      })),
    }
  }
}

fn mock_registry(slot: Arc<Mutex<Option<Arc<MockConnection>>>>) -> ConnectionRegistry {
  let mut registry = ConnectionRegistry::new();
  registry.insert(
    "Mock".to_owned(),
    RegistryEntry {
      details_key: "MockConnDetails",
      factory: Box::new(move |_config| {
        let connection = MockConnection::new();
        *slot.lock().expect("not poisoned") = Some(connection.clone());
        Ok(connection as Arc<dyn DeviceConnection>)
      }),
    },
  );
  registry
}

#[tokio::test(start_paused = true)]
async fn test_bringup_routing_and_stop() {
  let local_path = std::env::temp_dir().join(format!("edgelink-bringup-{}.json", Uuid::new_v4()));
  let connection_slot: Arc<Mutex<Option<Arc<MockConnection>>>> = Arc::new(Mutex::new(None));
  let sparkplug = MockSparkplug::new();
  let sparkplug_for_factory = sparkplug.clone();

  let builder = TranslatorBuilder::new(
    Arc::new(StubIdentity {
      attempts: AtomicU32::new(0),
    }),
    Arc::new(StubConfig {
      attempts: AtomicU32::new(0),
    }),
    Box::new(move |_principal, _sparkplug_config| Ok(sparkplug_for_factory.clone())),
    mock_registry(connection_slot.clone()),
  )
  .retry_interval(Duration::from_secs(1))
  .local_config(LocalConfigFile::new(&local_path));

  let translator = builder.start().await.expect("bringup succeeds");
  let mut device_ids = translator.device_ids();
  device_ids.sort();
  // The unknown connection type was skipped, not fatal.
  assert_eq!(device_ids, vec!["oven-1"]);

  // The fetched document was persisted locally.
  let saved: serde_json::Value = serde_json::from_str(
    &std::fs::read_to_string(&local_path).expect("local config written"),
  )
  .expect("valid JSON");
  assert_eq!(
    saved["deviceConnections"][0]["devices"][0]["deviceId"],
    serde_json::json!("oven-1")
  );

  // Device came up against the opened mock connection.
  tokio::time::sleep(Duration::from_millis(500)).await;
  let connection = connection_slot
    .lock()
    .expect("not poisoned")
    .clone()
    .expect("factory ran");
  assert_eq!(connection.intervals(), vec![1_000]);
  assert_eq!(sparkplug.births(), 1);

  let mut translator = translator;
  let run = tokio::spawn(async move {
    translator.run().await;
  });

  // A polling-interval command flows node -> supervisor -> device, and
  // the accepted value lands in the local file.
  sparkplug.emit(SparkplugEvent::DeviceCommand {
    device_id: "oven-1".to_owned(),
    payload: CommandPayload {
      metrics: vec![CommandMetric {
        name: Some("Device Control/Polling Interval".to_owned()),
        alias: None,
        data_type: None,
        value: serde_json::json!(2_500),
        timestamp: None,
      }],
      timestamp: None,
    },
  });
  tokio::time::sleep(Duration::from_millis(500)).await;
  assert_eq!(connection.intervals(), vec![1_000, 2_500]);
  let saved: serde_json::Value = serde_json::from_str(
    &std::fs::read_to_string(&local_path).expect("local config present"),
  )
  .expect("valid JSON");
  assert_eq!(
    saved["deviceConnections"][0]["devices"][0]["pollInt"],
    serde_json::json!(2_500)
  );

  // Rebirth request fans out to the device.
  sparkplug.emit(SparkplugEvent::RebirthAll);
  tokio::time::sleep(Duration::from_millis(200)).await;
  assert_eq!(sparkplug.births(), 2);

  // Stop tears everything down.
  sparkplug.emit(SparkplugEvent::Stop);
  run.await.expect("run loop exits");

  let _ = std::fs::remove_file(&local_path);
}
