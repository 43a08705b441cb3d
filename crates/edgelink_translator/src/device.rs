// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! One logical device: the actor between a southbound connection and the
//! Sparkplug node.
//!
//! All mutable device state (the metric store, the lifecycle flags) is
//! owned by a single task consuming a fan-in of connection events,
//! Sparkplug commands, watchdog expiries and the readiness poll, so no
//! state ever needs a lock.
//!
//! Lifecycle: constructed → connection opens → subscription armed →
//! BIRTH published (`is_alive`) → DATA on change → DEATH on driver close
//! or watchdog expiry → fresh BIRTH before the next DATA.

use std::{
  collections::HashMap,
  sync::{Arc, Weak},
  time::Duration,
};

use tokio::{select, sync::{broadcast, mpsc}};

use edgelink_core::{
  codec::{self, coerce, PayloadFormat, RawValue},
  metric::{store::MetricStore, DataType, Metric, MetricValue},
  util::spawn_task,
};

use crate::{
  config::DeviceSpec,
  connection::{ConnectionEvent, DeviceConnection},
  sparkplug::{CommandMetric, CommandPayload, SparkplugNode},
  watchdog::Watchdog,
};

pub const POLLING_INTERVAL_METRIC: &str = "Device Control/Polling Interval";
pub const REBOOT_METRIC: &str = "Device Control/Reboot";
pub const REBIRTH_METRIC: &str = "Device Control/Rebirth";

/// The dead-man interval: a device silent this long is reported
/// northbound as a DEATH.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Cadence of the connection-readiness poll between construction and the
/// subscription handshake.
const READINESS_POLL: Duration = Duration::from_millis(100);

/// Inputs a device accepts from its supervisor.
#[derive(Debug)]
pub enum DeviceCommand {
  /// A Sparkplug DCMD payload for this device.
  Sparkplug(CommandPayload),
  /// Re-announce the metric schema (DBIRTH request).
  Rebirth,
  /// Graceful shutdown.
  Stop,
}

/// An update the device wants persisted into the local config file. The
/// translator serialises these; the device never touches the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollIntervalUpdate {
  pub device_id: String,
  pub poll_int_ms: u64,
}

/// Handle held by the translator; dropping it stops the actor.
pub struct DeviceHandle {
  device_id: String,
  commands: mpsc::Sender<DeviceCommand>,
}

impl DeviceHandle {
  pub fn device_id(&self) -> &str {
    &self.device_id
  }

  pub async fn send(&self, command: DeviceCommand) {
    if self.commands.send(command).await.is_err() {
      warn!("device {} is gone, command dropped", self.device_id);
    }
  }
}

pub struct Device {
  device_id: String,
  store: MetricStore,
  /// Non-owning handles: the translator controls both lifetimes, and a
  /// device that outlives its owner must not keep the driver or the
  /// node alive. Upgraded per use.
  connection: Weak<dyn DeviceConnection>,
  sparkplug: Weak<dyn SparkplugNode>,
  payload_format: PayloadFormat,
  delimiter: String,
  poll_int: Duration,
  is_connected: bool,
  is_alive: bool,
  subscribed: bool,
  poll_updates: mpsc::Sender<PollIntervalUpdate>,
}

impl Device {
  /// Build the actor and spawn its event loop. The returned handle is
  /// the only way to reach it.
  pub fn spawn(
    spec: DeviceSpec,
    connection: Arc<dyn DeviceConnection>,
    sparkplug: Arc<dyn SparkplugNode>,
    poll_updates: mpsc::Sender<PollIntervalUpdate>,
  ) -> DeviceHandle {
    let mut store = MetricStore::new();
    store.add(default_metrics(spec.poll_int_ms));
    store.add(spec.metrics);

    let (command_sender, command_receiver) = mpsc::channel(64);
    let connection_events = connection.event_stream();
    let device = Device {
      device_id: spec.device_id.clone(),
      store,
      connection: Arc::downgrade(&connection),
      sparkplug: Arc::downgrade(&sparkplug),
      payload_format: spec.payload_format,
      delimiter: spec.delimiter,
      poll_int: Duration::from_millis(spec.poll_int_ms),
      is_connected: false,
      is_alive: false,
      subscribed: false,
      poll_updates,
    };
    spawn_task(device.run(connection_events, command_receiver));
    DeviceHandle {
      device_id: spec.device_id,
      commands: command_sender,
    }
  }

  async fn run(
    mut self,
    mut connection_events: broadcast::Receiver<ConnectionEvent>,
    mut commands: mpsc::Receiver<DeviceCommand>,
  ) {
    let (expiry_sender, mut expiries) = mpsc::channel(1);
    let watchdog = Watchdog::new(WATCHDOG_TIMEOUT, expiry_sender);
    let mut readiness = tokio::time::interval(READINESS_POLL);
    readiness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!("device {} constructed", self.device_id);
    loop {
      select! {
        // Connection-readiness loop: decoupled from the driver's own
        // open-event timing, stops as soon as the subscription is armed.
        _ = readiness.tick(), if !self.subscribed => {
          if self.is_connected {
            self.start_subscription().await;
          }
        }
        event = connection_events.recv() => match event {
          Ok(ConnectionEvent::Open) => {
            debug!("device {} connected", self.device_id);
            self.is_connected = true;
          }
          Ok(ConnectionEvent::Close) => self.handle_disconnect(&watchdog).await,
          Ok(ConnectionEvent::Error(e)) => {
            warn!("device {} driver error: {e}", self.device_id);
          }
          Ok(ConnectionEvent::Data { values, parse_vals }) => {
            self.handle_data(values, parse_vals, &watchdog).await;
          }
          Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!("device {} dropped {n} driver event(s) under backpressure", self.device_id);
          }
          Err(broadcast::error::RecvError::Closed) => {
            debug!("device {} connection stream closed", self.device_id);
            break;
          }
        },
        command = commands.recv() => match command {
          Some(DeviceCommand::Sparkplug(payload)) => {
            self.handle_device_command(payload, &watchdog).await;
          }
          Some(DeviceCommand::Rebirth) => self.publish_birth(false).await,
          Some(DeviceCommand::Stop) | None => break,
        },
        _ = expiries.recv() => {
          warn!("device {} watchdog expired", self.device_id);
          self.publish_death().await;
        }
      }
    }
    self.shutdown(&watchdog).await;
  }

  /// Arm the periodic read and announce the device. The BIRTH carries a
  /// forced one-shot read so the schema goes out with fresh values.
  async fn start_subscription(&mut self) {
    let Some(connection) = self.connection.upgrade() else {
      debug!("device {} connection torn down, not subscribing", self.device_id);
      return;
    };
    let readable = self.readable_metrics();
    match connection
      .start_subscription(
        &readable,
        self.payload_format,
        &self.delimiter,
        self.poll_int,
        &self.device_id,
      )
      .await
    {
      Ok(()) => {
        info!(
          "device {} subscribed at {}ms",
          self.device_id,
          self.poll_int.as_millis()
        );
        self.subscribed = true;
        self.publish_birth(true).await;
      }
      Err(e) => warn!("device {} subscription failed: {e}", self.device_id),
    }
  }

  /// Process one inbound batch: for every address in the batch, for
  /// every path registered under it, decode, change-filter, store, and
  /// finally publish a single DATA frame with exactly the accepted
  /// updates.
  async fn handle_data(
    &mut self,
    values: HashMap<String, RawValue>,
    parse_vals: bool,
    watchdog: &Watchdog,
  ) {
    let single_address = values.len() == 1;
    let mut changed: Vec<Metric> = Vec::new();
    for (address, raw) in &values {
      for path in self.store.paths_for_address(address) {
        let Some(metric) = self.store.get_by_address_path(address, &path) else {
          continue;
        };
        if !metric.is_readable() {
          continue;
        }
        // A structured multi-address payload with no path selector is
        // ambiguous; skip rather than guess.
        if parse_vals && !single_address && path.is_empty() {
          debug!(
            "device {} metric '{}' has no path selector for a multi-address batch, skipping",
            self.device_id,
            metric.name()
          );
          continue;
        }
        let new_value = if parse_vals {
          match codec::parse_value(raw, metric, self.payload_format, &self.delimiter) {
            Ok(value) => value,
            Err(e) => {
              warn!(
                "device {} failed to decode '{}' from {address}: {e}",
                self.device_id,
                metric.name()
              );
              continue;
            }
          }
        } else if let RawValue::Decoded(value) = raw {
          coerce::convert(value, metric.data_type())
        } else {
          raw
            .as_text()
            .and_then(|text| coerce::string_to_value(&text, metric.data_type()))
        };
        // Change filter: zero is a valid value, only absence is not.
        let Some(new_value) = new_value else {
          debug!(
            "device {} ignoring empty update for '{}'",
            self.device_id,
            metric.name()
          );
          continue;
        };
        if metric.value() == Some(&new_value) {
          continue;
        }
        let timestamp = codec::parse_timestamp(raw, self.payload_format);
        if let Some(updated) =
          self
            .store
            .set_value_by_address_path(address, &path, Some(new_value), timestamp)
        {
          changed.push(updated.clone());
        }
      }
    }
    if !changed.is_empty() {
      self.publish_data(&changed).await;
    }
    watchdog.feed().await;
  }

  /// Route one DCMD payload. Unknown metrics and read-only targets are
  /// logged and skipped; everything writable is flushed as one batch.
  async fn handle_device_command(&mut self, payload: CommandPayload, watchdog: &Watchdog) {
    let mut write_batch: Vec<Metric> = Vec::new();
    for command in payload.metrics {
      let Some(name) = self.resolve_command_name(&command) else {
        warn!(
          "device {} command for unknown metric (alias {:?}), skipping",
          self.device_id, command.alias
        );
        continue;
      };
      match name.as_str() {
        REBOOT_METRIC => {
          if truthy(&command.value) {
            info!("device {} reboot requested: not yet implemented", self.device_id);
          }
        }
        REBIRTH_METRIC => {
          if truthy(&command.value) {
            self.publish_birth(false).await;
          }
        }
        POLLING_INTERVAL_METRIC => self.apply_polling_interval(&command).await,
        _ => {
          let Some(metric) = self.store.get_by_name(&name) else {
            warn!("device {} command for unknown metric '{name}', skipping", self.device_id);
            continue;
          };
          if metric.is_readable() {
            info!("device {} metric '{name}' is read only", self.device_id);
            continue;
          }
          // Command values ride in as 64-bit integers; narrow to the
          // metric's native width before writing.
          let Some(value) = coerce::json_to_value(&command.value, metric.data_type()) else {
            warn!(
              "device {} command value {:?} does not fit metric '{name}'",
              self.device_id, command.value
            );
            continue;
          };
          let staged = metric.clone().with_value(Some(value), command.timestamp);
          write_batch.push(staged);
        }
      }
    }
    if !write_batch.is_empty() {
      self.write_metrics(write_batch, watchdog).await;
    }
  }

  fn resolve_command_name(&self, command: &CommandMetric) -> Option<String> {
    if let Some(name) = &command.name {
      return Some(name.clone());
    }
    command
      .alias
      .and_then(|alias| self.store.name_for_alias(alias))
      .map(str::to_owned)
  }

  /// Polling-interval command: restart the subscription at the new
  /// cadence, report the accepted value northbound, and persist it.
  async fn apply_polling_interval(&mut self, command: &CommandMetric) {
    let Some(MetricValue::UInt16(interval_ms)) =
      coerce::json_to_value(&command.value, DataType::UInt16)
    else {
      warn!(
        "device {} polling-interval command with unusable value {:?}",
        self.device_id, command.value
      );
      return;
    };
    let Some(connection) = self.connection.upgrade() else {
      debug!("device {} connection torn down, interval dropped", self.device_id);
      return;
    };
    if let Err(e) = connection.stop_subscription(&self.device_id).await {
      warn!("device {} failed to stop subscription: {e}", self.device_id);
    }
    let updated = self
      .store
      .set_value_by_name(
        POLLING_INTERVAL_METRIC,
        Some(MetricValue::UInt16(interval_ms)),
        command.timestamp,
      )
      .cloned();
    if let Some(updated) = updated {
      self.publish_data(std::slice::from_ref(&updated)).await;
    }
    self.poll_int = Duration::from_millis(interval_ms as u64);
    let readable = self.readable_metrics();
    if let Err(e) = connection
      .start_subscription(
        &readable,
        self.payload_format,
        &self.delimiter,
        self.poll_int,
        &self.device_id,
      )
      .await
    {
      warn!("device {} failed to restart subscription: {e}", self.device_id);
    }
    let update = PollIntervalUpdate {
      device_id: self.device_id.clone(),
      poll_int_ms: interval_ms as u64,
    };
    if self.poll_updates.send(update).await.is_err() {
      warn!("device {} could not persist polling interval", self.device_id);
    }
  }

  /// Write a batch through the driver; on success mirror the written
  /// values into the store and report them northbound.
  async fn write_metrics(&mut self, batch: Vec<Metric>, watchdog: &Watchdog) {
    let Some(connection) = self.connection.upgrade() else {
      warn!("device {} connection torn down, write dropped", self.device_id);
      return;
    };
    match connection
      .write_metrics(&batch, self.payload_format, &self.delimiter)
      .await
    {
      Ok(()) => {
        let mut mirrored = Vec::new();
        for metric in &batch {
          if let Some(updated) = self.store.set_value_by_name(
            metric.name(),
            metric.value().cloned(),
            Some(metric.timestamp()),
          ) {
            mirrored.push(updated.clone());
          }
        }
        if !mirrored.is_empty() {
          self.publish_data(&mirrored).await;
        }
        watchdog.feed().await;
      }
      Err(e) => warn!("device {} write failed: {e}", self.device_id),
    }
  }

  /// DATA while dead re-announces the device first, so every epoch
  /// northbound reads BIRTH (DATA)* DEATH?.
  async fn publish_data(&mut self, metrics: &[Metric]) {
    if !self.is_alive {
      self.publish_birth(true).await;
      if !self.is_alive {
        return;
      }
    }
    let Some(sparkplug) = self.sparkplug.upgrade() else {
      warn!("device {} sparkplug node torn down, DATA dropped", self.device_id);
      return;
    };
    if let Err(e) = sparkplug.publish_device_data(&self.device_id, metrics).await {
      warn!("device {} DATA publish failed: {e}", self.device_id);
    }
  }

  async fn publish_birth(&mut self, read_required: bool) {
    if read_required && self.is_connected {
      if let Some(connection) = self.connection.upgrade() {
        let readable = self.readable_metrics();
        if let Err(e) = connection
          .read_metrics(&readable, self.payload_format, &self.delimiter)
          .await
        {
          warn!("device {} pre-birth read failed: {e}", self.device_id);
        }
      }
    }
    let Some(sparkplug) = self.sparkplug.upgrade() else {
      warn!("device {} sparkplug node torn down, BIRTH dropped", self.device_id);
      return;
    };
    match sparkplug
      .publish_device_birth(&self.device_id, self.store.metrics())
      .await
    {
      Ok(aliases) => {
        for (index, alias) in aliases.into_iter().enumerate() {
          if let Some(alias) = alias {
            self.store.set_alias(index, alias);
          }
        }
        self.is_alive = true;
        info!("device {} born", self.device_id);
      }
      Err(e) => warn!("device {} BIRTH publish failed: {e}", self.device_id),
    }
  }

  async fn publish_death(&mut self) {
    match self.sparkplug.upgrade() {
      Some(sparkplug) => {
        if let Err(e) = sparkplug.publish_device_death(&self.device_id).await {
          warn!("device {} DEATH publish failed: {e}", self.device_id);
        }
      }
      None => debug!("device {} sparkplug node torn down, DEATH dropped", self.device_id),
    }
    self.is_alive = false;
    info!("device {} dead", self.device_id);
  }

  async fn handle_disconnect(&mut self, watchdog: &Watchdog) {
    info!("device {} disconnected", self.device_id);
    self.is_connected = false;
    self.subscribed = false;
    watchdog.stop().await;
    if self.is_alive {
      self.publish_death().await;
    }
  }

  async fn shutdown(&mut self, watchdog: &Watchdog) {
    debug!("device {} stopping", self.device_id);
    watchdog.stop().await;
    if let Some(connection) = self.connection.upgrade() {
      if let Err(e) = connection.stop_subscription(&self.device_id).await {
        debug!("device {} subscription teardown: {e}", self.device_id);
      }
    }
    if self.is_alive {
      self.publish_death().await;
    }
  }

  fn readable_metrics(&self) -> Vec<Metric> {
    self
      .store
      .metrics()
      .iter()
      .filter(|m| m.is_readable() && m.properties().address().is_some())
      .cloned()
      .collect()
  }
}

/// The mandatory northbound control surface, prepended before user
/// metrics on every device.
fn default_metrics(poll_int_ms: u64) -> Vec<Metric> {
  let poll_int = Metric::new(POLLING_INTERVAL_METRIC, DataType::UInt16)
    .with_transient(true)
    .with_value(
      Some(MetricValue::UInt16(poll_int_ms.min(u16::MAX as u64) as u16)),
      None,
    );
  let reboot = Metric::new(REBOOT_METRIC, DataType::Boolean)
    .with_transient(true)
    .with_value(Some(MetricValue::Boolean(false)), None);
  let rebirth = Metric::new(REBIRTH_METRIC, DataType::Boolean)
    .with_transient(true)
    .with_value(Some(MetricValue::Boolean(false)), None);
  vec![poll_int, reboot, rebirth]
}

fn truthy(value: &serde_json::Value) -> bool {
  match value {
    serde_json::Value::Bool(b) => *b,
    serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    serde_json::Value::String(s) => coerce::string_to_bool(s),
    _ => false,
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_default_metrics_prepended_shape() {
    let metrics = default_metrics(1_000);
    assert_eq!(metrics.len(), 3);
    assert_eq!(metrics[0].name(), POLLING_INTERVAL_METRIC);
    assert_eq!(metrics[0].data_type(), DataType::UInt16);
    assert!(metrics.iter().all(|m| m.is_transient()));
    assert_eq!(
      metrics[0].value(),
      Some(&MetricValue::UInt16(1_000))
    );
  }

  #[test]
  fn test_truthy() {
    assert!(truthy(&serde_json::json!(true)));
    assert!(truthy(&serde_json::json!(1)));
    assert!(!truthy(&serde_json::json!(false)));
    assert!(!truthy(&serde_json::json!(0)));
    assert!(!truthy(&serde_json::json!("no")));
    assert!(truthy(&serde_json::json!("yes")));
  }
}
