// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use std::{
  collections::HashMap,
  sync::atomic::{AtomicBool, Ordering},
  time::Duration,
};

use async_trait::async_trait;
use reqwest::{Client, Method};
use tokio::sync::broadcast;

use edgelink_core::{
  codec::{self, RawValue},
  errors::ConnectionError,
  metric::Metric,
  PayloadFormat,
};
use edgelink_translator::{
  config::{MtConnectConnDetails, RestConnDetails},
  connection::{ConnectionEvent, DeviceConnection, SubscriptionTasks, EVENT_CHANNEL_CAPACITY},
};

/// Polling driver for HTTP endpoints. One instance serves every device
/// declared on the connection; each device's subscription is its own
/// timer task sharing the client.
pub struct RestConnection {
  name: String,
  base_url: String,
  auth: Option<(String, Option<String>)>,
  client: Client,
  events: broadcast::Sender<ConnectionEvent>,
  connected: AtomicBool,
  subscriptions: SubscriptionTasks,
}

impl RestConnection {
  pub fn new(name: &str, details: RestConnDetails) -> Result<Self, ConnectionError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| ConnectionError::Transport(e.to_string()))?;
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let auth = details
      .username
      .as_ref()
      .map(|user| (user.clone(), details.password.clone()));
    Ok(Self {
      name: name.to_owned(),
      base_url: details.base_url.trim_end_matches('/').to_owned(),
      auth,
      client,
      events,
      connected: AtomicBool::new(false),
      subscriptions: SubscriptionTasks::new(),
    })
  }

  /// MTConnect rides the same transport; agents answer XML on `current`
  /// and metrics select with XPath.
  pub fn mtconnect(name: &str, details: MtConnectConnDetails) -> Result<Self, ConnectionError> {
    Self::new(
      name,
      RestConnDetails {
        base_url: details.base_url,
        auth_method: None,
        username: None,
        password: None,
      },
    )
  }

  fn request_url(base_url: &str, address: &str) -> String {
    if address.is_empty() {
      base_url.to_owned()
    } else {
      format!("{}/{}", base_url, address.trim_start_matches('/'))
    }
  }

  fn distinct_addresses(metrics: &[Metric]) -> Vec<String> {
    let mut addresses: Vec<String> = metrics
      .iter()
      .filter(|m| m.is_readable())
      .filter_map(|m| m.properties().address().clone())
      .collect();
    addresses.sort();
    addresses.dedup();
    addresses
  }

  /// GET every address once and deliver the batch as one `Data` event.
  /// Per-address failures are reported as `Error` events and the rest of
  /// the batch still goes out.
  async fn fetch_once(
    client: Client,
    base_url: String,
    auth: Option<(String, Option<String>)>,
    addresses: Vec<String>,
    events: broadcast::Sender<ConnectionEvent>,
  ) {
    let mut values = HashMap::new();
    for address in addresses {
      let url = Self::request_url(&base_url, &address);
      let mut request = client.get(url.as_str());
      if let Some((user, password)) = &auth {
        request = request.basic_auth(user, password.as_deref());
      }
      match request.send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => match response.bytes().await {
          Ok(body) => {
            values.insert(address, RawValue::Bytes(body.to_vec()));
          }
          Err(e) => {
            let _ = events.send(ConnectionEvent::Error(format!("{url}: {e}")));
          }
        },
        Err(e) => {
          let _ = events.send(ConnectionEvent::Error(format!("{url}: {e}")));
        }
      }
    }
    if !values.is_empty() {
      let _ = events.send(ConnectionEvent::Data {
        values,
        parse_vals: true,
      });
    }
  }
}

#[async_trait]
impl DeviceConnection for RestConnection {
  fn name(&self) -> &str {
    &self.name
  }

  async fn open(&self) -> Result<(), ConnectionError> {
    if !self.connected.swap(true, Ordering::SeqCst) {
      debug!("{} open against {}", self.name, self.base_url);
      let _ = self.events.send(ConnectionEvent::Open);
    }
    Ok(())
  }

  async fn close(&self) -> Result<(), ConnectionError> {
    if self.connected.swap(false, Ordering::SeqCst) {
      self.subscriptions.stop_all();
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
    if !self.connected.load(Ordering::SeqCst) {
      return Err(ConnectionError::NotOpen);
    }
    Self::fetch_once(
      self.client.clone(),
      self.base_url.clone(),
      self.auth.clone(),
      Self::distinct_addresses(metrics),
      self.events.clone(),
    )
    .await;
    Ok(())
  }

  /// Writes go metric-by-metric: each target address receives the
  /// encoded payload with the metric's own HTTP method (POST unless the
  /// config says PUT).
  async fn write_metrics(
    &self,
    metrics: &[Metric],
    format: PayloadFormat,
    delimiter: &str,
  ) -> Result<(), ConnectionError> {
    if !self.connected.load(Ordering::SeqCst) {
      return Err(ConnectionError::NotOpen);
    }
    for metric in metrics {
      let Some(address) = metric.properties().address().clone() else {
        continue;
      };
      let payload = codec::encode(std::slice::from_ref(metric), format, delimiter)
        .map_err(|e| ConnectionError::Transport(e.to_string()))?;
      let url = Self::request_url(&self.base_url, &address);
      let method = match metric.properties().method().as_str() {
        "PUT" => Method::PUT,
        _ => Method::POST,
      };
      let mut request = self.client.request(method, url.as_str()).body(payload.into_bytes());
      if let Some((user, password)) = &self.auth {
        request = request.basic_auth(user, password.as_deref());
      }
      request
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ConnectionError::Transport(format!("{url}: {e}")))?;
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
    let client = self.client.clone();
    let base_url = self.base_url.clone();
    let auth = self.auth.clone();
    let addresses = Self::distinct_addresses(metrics);
    let events = self.events.clone();
    self.subscriptions.start(device_id, interval, move || {
      Self::fetch_once(
        client.clone(),
        base_url.clone(),
        auth.clone(),
        addresses.clone(),
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

  #[test]
  fn test_request_url_joins_cleanly() {
    assert_eq!(
      RestConnection::request_url("http://gw/api", "/ovens/1"),
      "http://gw/api/ovens/1"
    );
    assert_eq!(
      RestConnection::request_url("http://gw/api", "ovens/1"),
      "http://gw/api/ovens/1"
    );
    assert_eq!(RestConnection::request_url("http://gw/api", ""), "http://gw/api");
  }

  #[test]
  fn test_distinct_addresses_skips_write_only() {
    use edgelink_core::metric::{DataType, MetricProperties};
    let read = Metric::new("a", DataType::Double).with_properties(MetricProperties::new(
      "GET",
      Some("/x".to_owned()),
      None,
    ));
    let read_same = Metric::new("b", DataType::Double).with_properties(MetricProperties::new(
      "GET",
      Some("/x".to_owned()),
      Some("$.b".to_owned()),
    ));
    let write = Metric::new("c", DataType::Double).with_properties(MetricProperties::new(
      "POST",
      Some("/w".to_owned()),
      None,
    ));
    assert_eq!(
      RestConnection::distinct_addresses(&[read, read_same, write]),
      vec!["/x".to_owned()]
    );
  }
}
