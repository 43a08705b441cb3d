// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Interface to the Sparkplug node, an external collaborator. The engine
//! only ever publishes device-scoped frames and consumes the node's
//! command events; alias allocation, sequence numbers and primary-host
//! state live behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use edgelink_core::{errors::SparkplugError, metric::{DataType, Metric}};

/// One metric inside an inbound command payload. After BIRTH the node
/// usually sends only the alias; the device resolves it back to a name
/// through its store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMetric {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub alias: Option<u64>,
  #[serde(default, rename = "type")]
  pub data_type: Option<DataType>,
  pub value: serde_json::Value,
  #[serde(default)]
  pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandPayload {
  #[serde(default)]
  pub metrics: Vec<CommandMetric>,
  #[serde(default)]
  pub timestamp: Option<u64>,
}

/// Events the node raises towards the translator.
#[derive(Debug, Clone)]
pub enum SparkplugEvent {
  /// The primary host asked one device to re-announce itself.
  DeviceBirthRequest(String),
  /// The primary host asked every device to re-announce itself.
  RebirthAll,
  /// A DCMD frame for one device.
  DeviceCommand {
    device_id: String,
    payload: CommandPayload,
  },
  /// The node is going away; the translator must shut down.
  Stop,
}

#[async_trait]
pub trait SparkplugNode: Send + Sync {
  /// Publish a DBIRTH carrying the full metric schema. Returns the alias
  /// the node assigned to each metric, in metric order.
  async fn publish_device_birth(
    &self,
    device_id: &str,
    metrics: &[Metric],
  ) -> Result<Vec<Option<u64>>, SparkplugError>;

  async fn publish_device_data(
    &self,
    device_id: &str,
    metrics: &[Metric],
  ) -> Result<(), SparkplugError>;

  async fn publish_device_death(&self, device_id: &str) -> Result<(), SparkplugError>;

  async fn stop(&self) -> Result<(), SparkplugError>;

  fn event_stream(&self) -> broadcast::Receiver<SparkplugEvent>;
}
