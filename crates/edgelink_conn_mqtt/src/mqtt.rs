// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use edgelink_core::{
  codec::{self, RawValue},
  errors::ConnectionError,
  metric::Metric,
  util::{sleep, spawn_task},
  PayloadFormat,
};
use edgelink_translator::{
  config::MqttConnDetails,
  connection::{ConnectionEvent, DeviceConnection, EVENT_CHANNEL_CAPACITY},
};

use crate::topic;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

pub struct MqttConnection {
  name: String,
  details: MqttConnDetails,
  client: Mutex<Option<AsyncClient>>,
  events: broadcast::Sender<ConnectionEvent>,
  /// Topic filters of interest per device id; inbound publishes are
  /// keyed back to the matching filter, which is the address the device
  /// declared.
  filters: Arc<DashMap<String, Vec<String>>>,
  cancel: Mutex<Option<CancellationToken>>,
}

impl MqttConnection {
  pub fn new(name: &str, details: MqttConnDetails) -> Self {
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self {
      name: name.to_owned(),
      details,
      client: Mutex::new(None),
      events,
      filters: Arc::new(DashMap::new()),
      cancel: Mutex::new(None),
    }
  }

  fn distinct_filters(metrics: &[Metric]) -> Vec<String> {
    let mut filters: Vec<String> = metrics
      .iter()
      .filter(|m| m.is_readable())
      .filter_map(|m| m.properties().address().clone())
      .collect();
    filters.sort();
    filters.dedup();
    filters
  }

  /// Broker event pump. Lives from `open` to `close`, emitting `Open`
  /// on (re)connect, `Data` per publish, and backing off on errors.
  async fn event_pump(
    name: String,
    mut event_loop: rumqttc::EventLoop,
    events: broadcast::Sender<ConnectionEvent>,
    filters: Arc<DashMap<String, Vec<String>>>,
    cancel: CancellationToken,
  ) {
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        polled = event_loop.poll() => match polled {
          Ok(Event::Incoming(Packet::ConnAck(_))) => {
            debug!("{name} broker session established");
            let _ = events.send(ConnectionEvent::Open);
          }
          Ok(Event::Incoming(Packet::Publish(publish))) => {
            let mut values = HashMap::new();
            for entry in filters.iter() {
              for filter in entry.value() {
                if topic::matches(filter, &publish.topic) {
                  values.insert(
                    filter.clone(),
                    RawValue::Bytes(publish.payload.to_vec()),
                  );
                }
              }
            }
            if values.is_empty() {
              // Nothing subscribed this topic; deliver it raw so a
              // whole-payload metric on the exact topic still sees it.
              values.insert(
                publish.topic.clone(),
                RawValue::Bytes(publish.payload.to_vec()),
              );
            }
            let _ = events.send(ConnectionEvent::Data {
              values,
              parse_vals: true,
            });
          }
          Ok(_) => {}
          Err(e) => {
            warn!("{name} broker connection lost: {e}");
            let _ = events.send(ConnectionEvent::Error(e.to_string()));
            sleep(RECONNECT_BACKOFF).await;
          }
        }
      }
    }
    let _ = events.send(ConnectionEvent::Close);
    debug!("{name} event pump stopped");
  }
}

#[async_trait]
impl DeviceConnection for MqttConnection {
  fn name(&self) -> &str {
    &self.name
  }

  async fn open(&self) -> Result<(), ConnectionError> {
    let mut client_slot = self.client.lock().await;
    if client_slot.is_some() {
      return Ok(());
    }
    let mut options = MqttOptions::new(
      format!("edgelink-{}", self.name),
      self.details.host.clone(),
      self.details.port,
    );
    options.set_keep_alive(Duration::from_secs(30));
    options.set_clean_session(self.details.clean_session.unwrap_or(true));
    if let (Some(user), Some(password)) = (&self.details.username, &self.details.password) {
      options.set_credentials(user.clone(), password.clone());
    }
    let (client, event_loop) = AsyncClient::new(options, 64);
    let cancel = CancellationToken::new();
    spawn_task(Self::event_pump(
      self.name.clone(),
      event_loop,
      self.events.clone(),
      self.filters.clone(),
      cancel.clone(),
    ));
    *client_slot = Some(client);
    *self.cancel.lock().await = Some(cancel);
    Ok(())
  }

  async fn close(&self) -> Result<(), ConnectionError> {
    let client = self.client.lock().await.take();
    if let Some(client) = client {
      let _ = client.disconnect().await;
    }
    if let Some(cancel) = self.cancel.lock().await.take() {
      cancel.cancel();
    }
    Ok(())
  }

  fn event_stream(&self) -> broadcast::Receiver<ConnectionEvent> {
    self.events.subscribe()
  }

  /// MQTT has nothing to poll; values arrive when the broker pushes
  /// them. A one-shot read is a no-op.
  async fn read_metrics(
    &self,
    _metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
  ) -> Result<(), ConnectionError> {
    Ok(())
  }

  async fn write_metrics(
    &self,
    metrics: &[Metric],
    format: PayloadFormat,
    delimiter: &str,
  ) -> Result<(), ConnectionError> {
    let client_slot = self.client.lock().await;
    let client = client_slot.as_ref().ok_or(ConnectionError::NotOpen)?;
    for metric in metrics {
      let Some(topic) = metric.properties().address().clone() else {
        continue;
      };
      let payload = codec::encode(std::slice::from_ref(metric), format, delimiter)
        .map_err(|e| ConnectionError::Transport(e.to_string()))?;
      client
        .publish(topic, QoS::AtLeastOnce, false, payload.into_bytes())
        .await
        .map_err(|e| ConnectionError::Transport(e.to_string()))?;
    }
    Ok(())
  }

  /// Arm the push pipeline: subscribe this device's topic filters. The
  /// polling interval has no meaning here.
  async fn start_subscription(
    &self,
    metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
    _interval: Duration,
    device_id: &str,
  ) -> Result<(), ConnectionError> {
    let client_slot = self.client.lock().await;
    let client = client_slot.as_ref().ok_or(ConnectionError::NotOpen)?;
    let filters = Self::distinct_filters(metrics);
    for filter in &filters {
      client
        .subscribe(filter.clone(), QoS::AtLeastOnce)
        .await
        .map_err(|e| ConnectionError::Transport(e.to_string()))?;
    }
    self.filters.insert(device_id.to_owned(), filters);
    Ok(())
  }

  async fn stop_subscription(&self, device_id: &str) -> Result<(), ConnectionError> {
    let Some((_, filters)) = self.filters.remove(device_id) else {
      return Ok(());
    };
    let client_slot = self.client.lock().await;
    if let Some(client) = client_slot.as_ref() {
      for filter in filters {
        // Another device may still want this filter.
        let still_wanted = self
          .filters
          .iter()
          .any(|entry| entry.value().contains(&filter));
        if !still_wanted {
          let _ = client.unsubscribe(filter).await;
        }
      }
    }
    Ok(())
  }
}
