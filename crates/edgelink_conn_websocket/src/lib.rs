// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! WebSocket southbound driver.
//!
//! One socket per connection, push-based. Inbound frames are delivered
//! under every address the subscribed devices registered (each metric
//! then selects inside the frame via its `path`); with nothing
//! registered yet, frames land under the empty address. Writes send
//! frames down the same socket.

#[macro_use]
extern crate log;

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use edgelink_core::{
  codec::{self, RawValue},
  errors::ConnectionError,
  metric::Metric,
  util::spawn_task,
  PayloadFormat,
};
use edgelink_translator::{
  config::WebsocketConnDetails,
  connection::{ConnectionEvent, DeviceConnection, EVENT_CHANNEL_CAPACITY},
};

pub struct WebsocketConnection {
  name: String,
  details: WebsocketConnDetails,
  events: broadcast::Sender<ConnectionEvent>,
  writer: Mutex<Option<mpsc::Sender<Message>>>,
  addresses: Arc<DashMap<String, Vec<String>>>,
  cancel: Mutex<Option<CancellationToken>>,
}

impl WebsocketConnection {
  pub fn new(name: &str, details: WebsocketConnDetails) -> Self {
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self {
      name: name.to_owned(),
      details,
      events,
      writer: Mutex::new(None),
      addresses: Arc::new(DashMap::new()),
      cancel: Mutex::new(None),
    }
  }

  fn distinct_addresses(metrics: &[Metric]) -> Vec<String> {
    let mut addresses: Vec<String> = metrics
      .iter()
      .filter(|m| m.is_readable())
      .map(|m| m.properties().address().clone().unwrap_or_default())
      .collect();
    addresses.sort();
    addresses.dedup();
    addresses
  }

  async fn socket_pump(
    name: String,
    url: String,
    events: broadcast::Sender<ConnectionEvent>,
    addresses: Arc<DashMap<String, Vec<String>>>,
    mut writes: mpsc::Receiver<Message>,
    cancel: CancellationToken,
  ) {
    let stream = match connect_async(url.as_str()).await {
      Ok((stream, _)) => stream,
      Err(e) => {
        warn!("{name} could not reach {url}: {e}");
        let _ = events.send(ConnectionEvent::Error(e.to_string()));
        let _ = events.send(ConnectionEvent::Close);
        return;
      }
    };
    let _ = events.send(ConnectionEvent::Open);
    let (mut sink, mut source) = stream.split();
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        outbound = writes.recv() => match outbound {
          Some(message) => {
            if let Err(e) = sink.send(message).await {
              warn!("{name} write failed: {e}");
              let _ = events.send(ConnectionEvent::Error(e.to_string()));
            }
          }
          None => break,
        },
        inbound = source.next() => match inbound {
          Some(Ok(message)) => {
            let raw = match message {
              Message::Text(text) => RawValue::Text(text.to_string()),
              Message::Binary(body) => RawValue::Bytes(body.to_vec()),
              _ => continue,
            };
            let mut values: HashMap<String, RawValue> = HashMap::new();
            for entry in addresses.iter() {
              for address in entry.value() {
                values.insert(address.clone(), raw.clone());
              }
            }
            if values.is_empty() {
              values.insert(String::new(), raw);
            }
            let _ = events.send(ConnectionEvent::Data { values, parse_vals: true });
          }
          Some(Err(e)) => {
            warn!("{name} socket error: {e}");
            let _ = events.send(ConnectionEvent::Error(e.to_string()));
            break;
          }
          None => break,
        },
      }
    }
    let _ = events.send(ConnectionEvent::Close);
    debug!("{name} socket pump stopped");
  }
}

#[async_trait]
impl DeviceConnection for WebsocketConnection {
  fn name(&self) -> &str {
    &self.name
  }

  async fn open(&self) -> Result<(), ConnectionError> {
    let mut writer = self.writer.lock().await;
    if writer.is_some() {
      return Ok(());
    }
    let (write_sender, write_receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    spawn_task(Self::socket_pump(
      self.name.clone(),
      self.details.url.clone(),
      self.events.clone(),
      self.addresses.clone(),
      write_receiver,
      cancel.clone(),
    ));
    *writer = Some(write_sender);
    *self.cancel.lock().await = Some(cancel);
    Ok(())
  }

  async fn close(&self) -> Result<(), ConnectionError> {
    self.writer.lock().await.take();
    if let Some(cancel) = self.cancel.lock().await.take() {
      cancel.cancel();
    }
    Ok(())
  }

  fn event_stream(&self) -> broadcast::Receiver<ConnectionEvent> {
    self.events.subscribe()
  }

  /// Push transport: a read cannot be demanded, values arrive when the
  /// peer sends them.
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
    let writer = self.writer.lock().await;
    let writer = writer.as_ref().ok_or(ConnectionError::NotOpen)?;
    let payload =
      codec::encode(metrics, format, delimiter).map_err(|e| ConnectionError::Transport(e.to_string()))?;
    let message = match payload {
      codec::EncodedPayload::Text(text) => Message::Text(text.into()),
      codec::EncodedPayload::Bytes(body) => Message::Binary(body.into()),
    };
    writer
      .send(message)
      .await
      .map_err(|_| ConnectionError::Transport("socket writer gone".to_owned()))
  }

  async fn start_subscription(
    &self,
    metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
    _interval: Duration,
    device_id: &str,
  ) -> Result<(), ConnectionError> {
    self
      .addresses
      .insert(device_id.to_owned(), Self::distinct_addresses(metrics));
    Ok(())
  }

  async fn stop_subscription(&self, device_id: &str) -> Result<(), ConnectionError> {
    self.addresses.remove(device_id);
    Ok(())
  }
}
