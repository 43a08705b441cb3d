// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! End-to-end device actor scenarios against mocked driver and node.

mod util;

use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;

use edgelink_core::{
  codec::{PayloadFormat, RawValue},
  metric::{DataType, Metric, MetricProperties, MetricValue},
};
use edgelink_translator::{
  DeviceConnection,
  config::DeviceSpec,
  device::{Device, DeviceCommand, DeviceHandle, PollIntervalUpdate, POLLING_INTERVAL_METRIC, REBIRTH_METRIC},
  sparkplug::{CommandMetric, CommandPayload},
};

use util::{Frame, MockConnection, MockSparkplug};

fn temp_metric() -> Metric {
  Metric::new("Sensors/Temp", DataType::Float).with_properties(MetricProperties::new(
    "GET",
    Some("probe".to_owned()),
    Some("$.sensor.temp".to_owned()),
  ))
}

fn setpoint_metric() -> Metric {
  Metric::new("Setpoint", DataType::UInt16).with_properties(MetricProperties::new(
    "POST",
    Some("set".to_owned()),
    None,
  ))
}

fn spec() -> DeviceSpec {
  DeviceSpec {
    device_id: "oven-1".to_owned(),
    poll_int_ms: 1_000,
    payload_format: PayloadFormat::Json,
    delimiter: String::new(),
    metrics: vec![temp_metric(), setpoint_metric()],
  }
}

struct Rig {
  connection: Arc<MockConnection>,
  sparkplug: Arc<MockSparkplug>,
  device: DeviceHandle,
  poll_updates: mpsc::Receiver<PollIntervalUpdate>,
}

/// Spawn a device, open the connection, and wait for the subscription
/// handshake plus the initial BIRTH.
async fn born_device() -> Rig {
  let connection = MockConnection::new();
  let sparkplug = MockSparkplug::new();
  let (poll_sender, poll_updates) = mpsc::channel(8);
  let device = Device::spawn(
    spec(),
    connection.clone(),
    sparkplug.clone(),
    poll_sender,
  );
  connection.open().await.expect("mock open");
  tokio::time::sleep(Duration::from_millis(500)).await;
  assert_eq!(connection.intervals(), vec![1_000], "subscription armed once");
  assert_eq!(sparkplug.births(), 1, "initial BIRTH");
  Rig {
    connection,
    sparkplug,
    device,
    poll_updates,
  }
}

fn json_payload(temp: &str) -> RawValue {
  RawValue::Text(format!(r#"{{"sensor":{{"temp":"{temp}"}}}}"#))
}

fn command(name: &str, value: serde_json::Value) -> CommandPayload {
  CommandPayload {
    metrics: vec![CommandMetric {
      name: Some(name.to_owned()),
      alias: None,
      data_type: None,
      value,
      timestamp: None,
    }],
    timestamp: None,
  }
}

#[tokio::test(start_paused = true)]
async fn test_birth_precedes_data_and_change_filter_dedups() {
  let rig = born_device().await;

  rig.connection.emit_data("probe", json_payload("23.5"), true);
  tokio::time::sleep(Duration::from_millis(50)).await;

  let data = rig.sparkplug.data_frames();
  assert_eq!(data.len(), 1, "one DATA for the first value");
  assert_eq!(
    data[0],
    vec![("Sensors/Temp".to_owned(), Some(MetricValue::Float(23.5)))]
  );
  match rig.sparkplug.frames().first() {
    Some(Frame::Birth(device, metrics)) => {
      assert_eq!(device, "oven-1");
      // Control surface prepended before user metrics.
      assert_eq!(metrics[0], POLLING_INTERVAL_METRIC);
      assert_eq!(metrics.len(), 5);
    }
    other => panic!("expected BIRTH first, got {other:?}"),
  }

  // The identical payload again: change filter drops it.
  rig.connection.emit_data("probe", json_payload("23.5"), true);
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(rig.sparkplug.data_frames().len(), 1, "no DATA for an unchanged value");

  // A changed payload passes.
  rig.connection.emit_data("probe", json_payload("24.0"), true);
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(rig.sparkplug.data_frames().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_death_then_fresh_birth() {
  let rig = born_device().await;

  rig.connection.emit_data("probe", json_payload("23.5"), true);
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(rig.sparkplug.deaths(), 0);

  // Silence. The watchdog reports the device dead within its period.
  tokio::time::sleep(Duration::from_secs(11)).await;
  assert_eq!(rig.sparkplug.deaths(), 1, "exactly one DEATH");
  tokio::time::sleep(Duration::from_secs(20)).await;
  assert_eq!(rig.sparkplug.deaths(), 1, "still exactly one DEATH");

  // Recovery: the next accepted update births a fresh epoch before DATA.
  rig.connection.emit_data("probe", json_payload("25.0"), true);
  tokio::time::sleep(Duration::from_millis(50)).await;
  let frames = rig.sparkplug.frames();
  assert_eq!(rig.sparkplug.births(), 2, "fresh BIRTH after DEATH");
  let death_at = frames
    .iter()
    .position(|f| matches!(f, Frame::Death(_)))
    .expect("death recorded");
  let rebirth_at = frames
    .iter()
    .rposition(|f| matches!(f, Frame::Birth(_, _)))
    .expect("rebirth recorded");
  let last_data_at = frames
    .iter()
    .rposition(|f| matches!(f, Frame::Data(_, _)))
    .expect("data recorded");
  assert!(death_at < rebirth_at && rebirth_at < last_data_at, "BIRTH before epoch DATA");
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_quiet_while_fed() {
  let rig = born_device().await;
  for i in 0..20 {
    rig
      .connection
      .emit_data("probe", json_payload(&format!("2{i}.0")), true);
    tokio::time::sleep(Duration::from_secs(5)).await;
  }
  assert_eq!(rig.sparkplug.deaths(), 0, "a fed watchdog never fires");
}

#[tokio::test(start_paused = true)]
async fn test_polling_interval_command() {
  let mut rig = born_device().await;

  rig
    .device
    .send(DeviceCommand::Sparkplug(command(
      POLLING_INTERVAL_METRIC,
      serde_json::json!(2_500),
    )))
    .await;
  tokio::time::sleep(Duration::from_millis(50)).await;

  assert_eq!(
    rig.connection.subscription_stops.load(std::sync::atomic::Ordering::SeqCst),
    1,
    "old subscription stopped"
  );
  assert_eq!(
    rig.connection.intervals(),
    vec![1_000, 2_500],
    "subscription restarted at the new interval"
  );
  let data = rig.sparkplug.data_frames();
  assert_eq!(data.len(), 1, "one DATA for the accepted interval");
  assert_eq!(
    data[0],
    vec![(
      POLLING_INTERVAL_METRIC.to_owned(),
      Some(MetricValue::UInt16(2_500))
    )]
  );
  assert_eq!(
    rig.poll_updates.try_recv().expect("persistence requested"),
    PollIntervalUpdate {
      device_id: "oven-1".to_owned(),
      poll_int_ms: 2_500,
    }
  );
}

#[tokio::test(start_paused = true)]
async fn test_rebirth_command_keeps_device_alive() {
  let rig = born_device().await;

  rig
    .device
    .send(DeviceCommand::Sparkplug(command(
      REBIRTH_METRIC,
      serde_json::json!(true),
    )))
    .await;
  tokio::time::sleep(Duration::from_millis(50)).await;

  assert_eq!(rig.sparkplug.births(), 2, "BIRTH re-published");
  assert_eq!(rig.sparkplug.deaths(), 0, "no DEATH around a rebirth");

  // Still alive: a change goes straight out as DATA without another BIRTH.
  rig.connection.emit_data("probe", json_payload("30.0"), true);
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(rig.sparkplug.births(), 2);
  assert_eq!(rig.sparkplug.data_frames().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_write_to_read_only_metric_is_rejected() {
  let rig = born_device().await;

  rig
    .device
    .send(DeviceCommand::Sparkplug(command(
      "Sensors/Temp",
      serde_json::json!(99.0),
    )))
    .await;
  tokio::time::sleep(Duration::from_millis(50)).await;

  assert_eq!(rig.connection.write_count(), 0, "no driver write");
  assert_eq!(rig.sparkplug.data_frames().len(), 0, "no DATA frame");
}

#[tokio::test(start_paused = true)]
async fn test_alias_command_writes_and_mirrors() {
  let rig = born_device().await;

  // The mock node aliases metrics 1..=n in BIRTH order; Setpoint is the
  // fifth metric (three control metrics, then Temp, then Setpoint).
  rig
    .device
    .send(DeviceCommand::Sparkplug(CommandPayload {
      metrics: vec![CommandMetric {
        name: None,
        alias: Some(5),
        data_type: None,
        value: serde_json::json!(42),
        timestamp: None,
      }],
      timestamp: None,
    }))
    .await;
  tokio::time::sleep(Duration::from_millis(50)).await;

  let writes = rig.connection.writes.lock().expect("not poisoned").clone();
  assert_eq!(writes.len(), 1, "one write batch");
  assert_eq!(writes[0].len(), 1);
  assert_eq!(writes[0][0].name(), "Setpoint");
  // 64-bit command value narrowed to the metric's native width.
  assert_eq!(writes[0][0].value(), Some(&MetricValue::UInt16(42)));

  let data = rig.sparkplug.data_frames();
  assert_eq!(data.len(), 1, "written value mirrored northbound");
  assert_eq!(
    data[0],
    vec![("Setpoint".to_owned(), Some(MetricValue::UInt16(42)))]
  );
}

#[tokio::test(start_paused = true)]
async fn test_unknown_alias_command_is_skipped() {
  let rig = born_device().await;
  rig
    .device
    .send(DeviceCommand::Sparkplug(CommandPayload {
      metrics: vec![CommandMetric {
        name: None,
        alias: Some(77),
        data_type: None,
        value: serde_json::json!(1),
        timestamp: None,
      }],
      timestamp: None,
    }))
    .await;
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(rig.connection.write_count(), 0);
  assert_eq!(rig.sparkplug.data_frames().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_decoded_raw_bypasses_codec() {
  let rig = born_device().await;
  rig.connection.emit_data(
    "probe",
    RawValue::Decoded(MetricValue::Float(19.25)),
    false,
  );
  tokio::time::sleep(Duration::from_millis(50)).await;
  let data = rig.sparkplug.data_frames();
  assert_eq!(data.len(), 1);
  assert_eq!(
    data[0],
    vec![("Sensors/Temp".to_owned(), Some(MetricValue::Float(19.25)))]
  );
}

#[tokio::test(start_paused = true)]
async fn test_driver_close_publishes_death() {
  let rig = born_device().await;
  rig.connection.close().await.expect("mock close");
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(rig.sparkplug.deaths(), 1, "DEATH on driver close");

  // Reconnect: readiness poll re-arms the subscription and re-births.
  rig.connection.open().await.expect("mock open");
  tokio::time::sleep(Duration::from_millis(500)).await;
  assert_eq!(rig.connection.intervals(), vec![1_000, 1_000]);
  assert_eq!(rig.sparkplug.births(), 2, "fresh BIRTH after reconnect");
}

#[tokio::test(start_paused = true)]
async fn test_epoch_sequences_match_birth_data_death() {
  let rig = born_device().await;
  rig.connection.emit_data("probe", json_payload("21.0"), true);
  tokio::time::sleep(Duration::from_millis(50)).await;
  tokio::time::sleep(Duration::from_secs(11)).await;
  rig.connection.emit_data("probe", json_payload("22.0"), true);
  tokio::time::sleep(Duration::from_millis(50)).await;

  // Flatten to a tag string and check the frame grammar per epoch.
  let tags: String = rig
    .sparkplug
    .frames()
    .iter()
    .map(|f| match f {
      Frame::Birth(_, _) => 'B',
      Frame::Data(_, _) => 'D',
      Frame::Death(_) => 'X',
    })
    .collect();
  assert_eq!(tags, "BDXBD");
}
