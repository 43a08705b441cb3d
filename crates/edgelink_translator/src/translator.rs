// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The supervisor.
//!
//! Owns every connection and every device, wires driver events to device
//! actors, routes Sparkplug command events to the right device, and runs
//! graceful shutdown. Devices hold non-owning handles to their
//! connection and the Sparkplug node; lifetimes all end here.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{select, sync::{broadcast, mpsc}};

use edgelink_core::errors::{ConnectionError, EdgelinkError};

use crate::{
  config::{self, ConfigDocument, ConnectionConfig, LocalConfigFile},
  connection::DeviceConnection,
  device::{Device, DeviceCommand, DeviceHandle, PollIntervalUpdate},
  services::{retry_until, ConfigSource, IdentityProvider, Principal, EDGE_AGENT_APP_UUID},
  sparkplug::{SparkplugEvent, SparkplugNode},
};

/// Builds one connection from its config block.
pub type ConnectionFactory =
  Box<dyn Fn(&ConnectionConfig) -> Result<Arc<dyn DeviceConnection>, ConnectionError> + Send + Sync>;

/// What the registry knows about one connection type.
pub struct RegistryEntry {
  /// Key of the `<details>` block inside the connection config.
  pub details_key: &'static str,
  pub factory: ConnectionFactory,
}

/// connType string -> driver construction recipe. Unknown types are
/// logged and skipped.
pub type ConnectionRegistry = HashMap<String, RegistryEntry>;

/// Constructs the Sparkplug node once identity and config are known.
pub type SparkplugFactory = Box<
  dyn Fn(&Principal, Option<&serde_json::Value>) -> Result<Arc<dyn SparkplugNode>, EdgelinkError>
    + Send
    + Sync,
>;

pub struct TranslatorBuilder {
  identity: Arc<dyn IdentityProvider>,
  config_source: Arc<dyn ConfigSource>,
  sparkplug_factory: SparkplugFactory,
  registry: ConnectionRegistry,
  retry_interval: Duration,
  local_config: LocalConfigFile,
}

impl TranslatorBuilder {
  pub fn new(
    identity: Arc<dyn IdentityProvider>,
    config_source: Arc<dyn ConfigSource>,
    sparkplug_factory: SparkplugFactory,
    registry: ConnectionRegistry,
  ) -> Self {
    Self {
      identity,
      config_source,
      sparkplug_factory,
      registry,
      retry_interval: Duration::from_secs(10),
      local_config: LocalConfigFile::new(config::LOCAL_CONFIG_PATH),
    }
  }

  pub fn retry_interval(mut self, interval: Duration) -> Self {
    self.retry_interval = interval;
    self
  }

  pub fn local_config(mut self, local_config: LocalConfigFile) -> Self {
    self.local_config = local_config;
    self
  }

  /// Bring the translator up: identity, config, Sparkplug node, then
  /// one connection per declared endpoint and one device per declared
  /// device. Blocks until identity and config yield. A driver
  /// constructor failure aborts the whole start.
  pub async fn start(self) -> Result<Translator, EdgelinkError> {
    let identity = self.identity.clone();
    let principal = retry_until("identity", self.retry_interval, || {
      let identity = identity.clone();
      async move { identity.find_principal().await }
    })
    .await;
    info!("principal {} ({})", principal.uuid(), principal.sparkplug());

    let config_source = self.config_source.clone();
    let node_uuid = *principal.uuid();
    let document = retry_until("edge agent config", self.retry_interval, || {
      let config_source = config_source.clone();
      async move {
        let raw = config_source
          .fetch_config(EDGE_AGENT_APP_UUID, node_uuid)
          .await?;
        match config::validate(&raw) {
          Ok(parsed) => Some((raw, parsed)),
          Err(e) => {
            warn!("config rejected: {e}");
            None
          }
        }
      }
    })
    .await;
    let (raw_document, parsed) = document;
    if let Err(e) = self.local_config.save(&raw_document) {
      warn!("could not persist config locally: {e}");
    }

    let sparkplug = (self.sparkplug_factory)(&principal, parsed.sparkplug.as_ref())?;
    let sparkplug_events = sparkplug.event_stream();

    let (poll_update_sender, poll_updates) = mpsc::channel(64);
    let mut translator = Translator {
      sparkplug,
      sparkplug_events,
      connections: Vec::new(),
      devices: HashMap::new(),
      local_config: self.local_config,
      poll_updates,
      _poll_update_sender: poll_update_sender.clone(),
      stopped_events: broadcast::channel(4).0,
      stopped: false,
    };

    if let Err(e) = translator
      .build_connections(&parsed, &self.registry, poll_update_sender)
      .await
    {
      error!("translator bringup failed: {e}");
      translator.stop().await;
      return Err(e.into());
    }

    for connection in &translator.connections {
      if let Err(e) = connection.open().await {
        warn!("connection '{}' failed to open: {e}", connection.name());
      }
    }
    info!(
      "translator started with {} connection(s), {} device(s)",
      translator.connections.len(),
      translator.devices.len()
    );
    Ok(translator)
  }
}

pub struct Translator {
  sparkplug: Arc<dyn SparkplugNode>,
  sparkplug_events: broadcast::Receiver<SparkplugEvent>,
  connections: Vec<Arc<dyn DeviceConnection>>,
  devices: HashMap<String, DeviceHandle>,
  local_config: LocalConfigFile,
  poll_updates: mpsc::Receiver<PollIntervalUpdate>,
  /// Keeps the update channel open even if every device actor exits, so
  /// the run loop never spins on a closed receiver.
  _poll_update_sender: mpsc::Sender<PollIntervalUpdate>,
  stopped_events: broadcast::Sender<()>,
  stopped: bool,
}

impl Translator {
  async fn build_connections(
    &mut self,
    document: &ConfigDocument,
    registry: &ConnectionRegistry,
    poll_update_sender: mpsc::Sender<PollIntervalUpdate>,
  ) -> Result<(), ConnectionError> {
    for connection_config in &document.device_connections {
      let Some(entry) = registry.get(&connection_config.conn_type) else {
        warn!(
          "unknown connection type '{}' for '{}', skipping",
          connection_config.conn_type, connection_config.name
        );
        continue;
      };
      if !connection_config.extra.contains_key(entry.details_key) {
        warn!(
          "connection '{}' is missing its '{}' block, skipping",
          connection_config.name, entry.details_key
        );
        continue;
      }
      let connection = (entry.factory)(connection_config)?;
      for device_config in &connection_config.devices {
        let spec = config::rehash_device(connection_config, device_config);
        let device_id = spec.device_id.clone();
        let handle = Device::spawn(
          spec,
          connection.clone(),
          self.sparkplug.clone(),
          poll_update_sender.clone(),
        );
        if self.devices.insert(device_id.clone(), handle).is_some() {
          warn!("duplicate device id '{device_id}', previous device replaced");
        }
      }
      self.connections.push(connection);
    }
    Ok(())
  }

  /// Consume Sparkplug events and poll-interval persistence requests
  /// until the node says stop. Run this as the translator's main loop.
  pub async fn run(&mut self) {
    loop {
      select! {
        event = self.sparkplug_events.recv() => match event {
          Ok(SparkplugEvent::DeviceCommand { device_id, payload }) => {
            match self.devices.get(&device_id) {
              Some(device) => device.send(DeviceCommand::Sparkplug(payload)).await,
              None => warn!("command for unknown device '{device_id}', skipping"),
            }
          }
          Ok(SparkplugEvent::DeviceBirthRequest(device_id)) => {
            match self.devices.get(&device_id) {
              Some(device) => device.send(DeviceCommand::Rebirth).await,
              None => warn!("birth request for unknown device '{device_id}', skipping"),
            }
          }
          Ok(SparkplugEvent::RebirthAll) => {
            for device in self.devices.values() {
              device.send(DeviceCommand::Rebirth).await;
            }
          }
          Ok(SparkplugEvent::Stop) => {
            info!("sparkplug node requested stop");
            break;
          }
          Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!("dropped {n} sparkplug event(s) under backpressure");
          }
          Err(broadcast::error::RecvError::Closed) => {
            warn!("sparkplug event stream closed");
            break;
          }
        },
        update = self.poll_updates.recv() => {
          if let Some(update) = update {
            // Serialised here so concurrent devices never race the file.
            if let Err(e) = self
              .local_config
              .update_poll_interval(&update.device_id, update.poll_int_ms)
            {
              warn!("could not persist pollInt for '{}': {e}", update.device_id);
            }
          }
        }
      }
    }
    self.stop().await;
  }

  /// Stop every device, close every connection, stop the node. Safe to
  /// call more than once.
  pub async fn stop(&mut self) {
    if self.stopped {
      return;
    }
    self.stopped = true;
    info!("translator stopping");
    for device in self.devices.values() {
      device.send(DeviceCommand::Stop).await;
    }
    self.devices.clear();
    for connection in &self.connections {
      if let Err(e) = connection.close().await {
        warn!("connection '{}' close failed: {e}", connection.name());
      }
    }
    self.connections.clear();
    if let Err(e) = self.sparkplug.stop().await {
      warn!("sparkplug node stop failed: {e}");
    }
    let _ = self.stopped_events.send(());
    info!("translator stopped");
  }

  /// Observers of the terminal `stopped` signal, fired once teardown
  /// completes.
  pub fn stopped_stream(&self) -> broadcast::Receiver<()> {
    self.stopped_events.subscribe()
  }

  pub fn device_ids(&self) -> Vec<&str> {
    self.devices.keys().map(String::as_str).collect()
  }
}
