// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! S7 connection glue.
//!
//! One PLC session shared by every device on the connection. The item
//! group is connection-level and last-writer-wins: each
//! `start_subscription` replaces it, so sibling devices on one PLC must
//! poll disjoint item sets. Values are decoded here from the PLC's own
//! byte order, so data events carry `parse_vals: false`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use edgelink_core::{
  codec::RawValue,
  errors::ConnectionError,
  metric::Metric,
  PayloadFormat,
};
use edgelink_translator::{
  config::S7ConnDetails,
  connection::{ConnectionEvent, DeviceConnection, SubscriptionTasks, EVENT_CHANNEL_CAPACITY},
};

use crate::{address::{S7Address, S7Area}, client::S7Client};

type SharedClient = Arc<Mutex<Option<S7Client>>>;

pub struct S7Connection {
  name: String,
  details: S7ConnDetails,
  client: SharedClient,
  events: broadcast::Sender<ConnectionEvent>,
  /// Shared item group, replaced wholesale by each subscription.
  item_group: Arc<Mutex<Vec<(String, S7Address)>>>,
  subscriptions: SubscriptionTasks,
}

impl S7Connection {
  pub fn new(name: &str, details: S7ConnDetails) -> Self {
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self {
      name: name.to_owned(),
      details,
      client: Arc::new(Mutex::new(None)),
      events,
      item_group: Arc::new(Mutex::new(Vec::new())),
      subscriptions: SubscriptionTasks::new(),
    }
  }

  fn parse_items(metrics: &[Metric]) -> Vec<(String, S7Address)> {
    let mut items = Vec::new();
    for metric in metrics {
      if !metric.is_readable() {
        continue;
      }
      let Some(address) = metric.properties().address().clone() else {
        continue;
      };
      match S7Address::parse(&address) {
        Ok(parsed) => items.push((address, parsed)),
        Err(e) => warn!("unusable S7 address on '{}': {e}", metric.name()),
      }
    }
    items.sort_by(|a, b| a.0.cmp(&b.0));
    items.dedup_by(|a, b| a.0 == b.0);
    items
  }

  /// Read every item in the group over the shared session and emit one
  /// natively-decoded batch. A transport failure drops the session (the
  /// next poll reconnects) and surfaces as `Close`.
  async fn poll_items(
    name: String,
    details: S7ConnDetails,
    client: SharedClient,
    item_group: Arc<Mutex<Vec<(String, S7Address)>>>,
    events: broadcast::Sender<ConnectionEvent>,
  ) {
    let items = item_group.lock().await.clone();
    if items.is_empty() {
      return;
    }
    let mut session = client.lock().await;
    if session.is_none() {
      match S7Client::connect(&details.hostname, details.port, details.rack, details.slot).await {
        Ok(connected) => {
          *session = Some(connected);
          let _ = events.send(ConnectionEvent::Open);
        }
        Err(e) => {
          warn!("{name} PLC unreachable: {e}");
          let _ = events.send(ConnectionEvent::Error(e.to_string()));
          return;
        }
      }
    }
    let Some(active) = session.as_mut() else {
      return;
    };
    let mut values = HashMap::new();
    for (address, parsed) in &items {
      match active.read(parsed).await {
        Ok(bytes) => {
          if let Some(value) = parsed.decode(&bytes) {
            values.insert(address.clone(), RawValue::Decoded(value));
          }
        }
        Err(e @ ConnectionError::Transport(_)) => {
          warn!("{name} PLC session lost: {e}");
          *session = None;
          let _ = events.send(ConnectionEvent::Close);
          return;
        }
        Err(e) => {
          let _ = events.send(ConnectionEvent::Error(format!("{address}: {e}")));
        }
      }
    }
    if !values.is_empty() {
      let _ = events.send(ConnectionEvent::Data {
        values,
        parse_vals: false,
      });
    }
  }
}

#[async_trait]
impl DeviceConnection for S7Connection {
  fn name(&self) -> &str {
    &self.name
  }

  async fn open(&self) -> Result<(), ConnectionError> {
    let mut session = self.client.lock().await;
    if session.is_some() {
      return Ok(());
    }
    let connected = S7Client::connect(
      &self.details.hostname,
      self.details.port,
      self.details.rack,
      self.details.slot,
    )
    .await?;
    *session = Some(connected);
    let _ = self.events.send(ConnectionEvent::Open);
    Ok(())
  }

  async fn close(&self) -> Result<(), ConnectionError> {
    self.subscriptions.stop_all();
    if self.client.lock().await.take().is_some() {
      let _ = self.events.send(ConnectionEvent::Close);
    }
    Ok(())
  }

  fn event_stream(&self) -> broadcast::Receiver<ConnectionEvent> {
    self.events.subscribe()
  }

  async fn read_metrics(
    &self,
    metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
  ) -> Result<(), ConnectionError> {
    *self.item_group.lock().await = Self::parse_items(metrics);
    Self::poll_items(
      self.name.clone(),
      self.details.clone(),
      self.client.clone(),
      self.item_group.clone(),
      self.events.clone(),
    )
    .await;
    Ok(())
  }

  async fn write_metrics(
    &self,
    metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
  ) -> Result<(), ConnectionError> {
    let mut session = self.client.lock().await;
    let active = session.as_mut().ok_or(ConnectionError::NotOpen)?;
    for metric in metrics {
      let Some(address) = metric.properties().address().clone() else {
        continue;
      };
      let parsed = S7Address::parse(&address)?;
      if parsed.area == S7Area::Input {
        // Writing process inputs is unreliable on most firmwares; known
        // limitation, attempted anyway.
        warn!("{} writing process-input register {address}", self.name);
      }
      let Some(value) = metric.value() else {
        continue;
      };
      let payload = parsed.encode(value).ok_or_else(|| {
        ConnectionError::InvalidAddress(
          address.clone(),
          format!("value type {} does not fit this item", value.data_type()),
        )
      })?;
      active.write(&parsed, &payload).await?;
    }
    Ok(())
  }

  async fn start_subscription(
    &self,
    metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
    interval: Duration,
    device_id: &str,
  ) -> Result<(), ConnectionError> {
    // Last writer wins on the shared item group.
    *self.item_group.lock().await = Self::parse_items(metrics);
    let name = self.name.clone();
    let details = self.details.clone();
    let client = self.client.clone();
    let item_group = self.item_group.clone();
    let events = self.events.clone();
    self.subscriptions.start(device_id, interval, move || {
      Self::poll_items(
        name.clone(),
        details.clone(),
        client.clone(),
        item_group.clone(),
        events.clone(),
      )
    });
    Ok(())
  }

  async fn stop_subscription(&self, device_id: &str) -> Result<(), ConnectionError> {
    self.subscriptions.stop(device_id);
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use edgelink_core::metric::{DataType, MetricProperties};

  #[test]
  fn test_item_group_parses_and_skips_bad_addresses() {
    let good = Metric::new("flag", DataType::Boolean).with_properties(MetricProperties::new(
      "GET",
      Some("DB1,X0.0".to_owned()),
      None,
    ));
    let bad = Metric::new("broken", DataType::Double).with_properties(MetricProperties::new(
      "GET",
      Some("DB1,Z9".to_owned()),
      None,
    ));
    let write_only = Metric::new("cmd", DataType::Int16).with_properties(MetricProperties::new(
      "POST",
      Some("DB1,INT2".to_owned()),
      None,
    ));
    let items = S7Connection::parse_items(&[good, bad, write_only]);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].0, "DB1,X0.0");
  }
}
