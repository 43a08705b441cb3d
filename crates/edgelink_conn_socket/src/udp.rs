// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! UDP southbound driver. Devices that spray datagrams at a known port;
//! reads are push-only. A datagram lands under the sender's source-port
//! key when some metric registered it as an address, else under the
//! wildcard empty address. Writes answer the last-seen peer of the
//! target address, so a device can only be written to once it has
//! spoken.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::{net::UdpSocket, sync::{broadcast, Mutex}};
use tokio_util::sync::CancellationToken;

use edgelink_core::{
  codec::{self, RawValue},
  errors::ConnectionError,
  metric::Metric,
  util::spawn_task,
  PayloadFormat,
};
use edgelink_translator::{
  config::UdpConnDetails,
  connection::{ConnectionEvent, DeviceConnection, EVENT_CHANNEL_CAPACITY},
};

const MAX_DATAGRAM: usize = 64 * 1024;

pub struct UdpConnection {
  name: String,
  details: UdpConnDetails,
  events: broadcast::Sender<ConnectionEvent>,
  socket: Mutex<Option<Arc<UdpSocket>>>,
  known_addresses: Arc<DashSet<String>>,
  /// Last peer observed per delivered address key; write targets.
  peers: Arc<DashMap<String, SocketAddr>>,
  cancel: Mutex<Option<CancellationToken>>,
}

impl UdpConnection {
  pub fn new(name: &str, details: UdpConnDetails) -> Self {
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self {
      name: name.to_owned(),
      details,
      events,
      socket: Mutex::new(None),
      known_addresses: Arc::new(DashSet::new()),
      peers: Arc::new(DashMap::new()),
      cancel: Mutex::new(None),
    }
  }

  async fn recv_pump(
    name: String,
    socket: Arc<UdpSocket>,
    events: broadcast::Sender<ConnectionEvent>,
    known_addresses: Arc<DashSet<String>>,
    peers: Arc<DashMap<String, SocketAddr>>,
    cancel: CancellationToken,
  ) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        received = socket.recv_from(&mut buf) => match received {
          Ok((len, peer)) => {
            let source_port = peer.port().to_string();
            let address = if known_addresses.contains(&source_port) {
              source_port
            } else {
              String::new()
            };
            peers.insert(address.clone(), peer);
            let mut values = HashMap::new();
            values.insert(address, RawValue::Bytes(buf[..len].to_vec()));
            let _ = events.send(ConnectionEvent::Data { values, parse_vals: true });
          }
          Err(e) => {
            warn!("{name} receive failed: {e}");
            let _ = events.send(ConnectionEvent::Error(e.to_string()));
          }
        }
      }
    }
    let _ = events.send(ConnectionEvent::Close);
    debug!("{name} receive pump stopped");
  }
}

#[async_trait]
impl DeviceConnection for UdpConnection {
  fn name(&self) -> &str {
    &self.name
  }

  async fn open(&self) -> Result<(), ConnectionError> {
    let mut socket_slot = self.socket.lock().await;
    if socket_slot.is_some() {
      return Ok(());
    }
    let socket = Arc::new(
      UdpSocket::bind(("0.0.0.0", self.details.port))
        .await
        .map_err(|e| ConnectionError::Transport(e.to_string()))?,
    );
    info!("{} listening on udp:{}", self.name, self.details.port);
    let cancel = CancellationToken::new();
    spawn_task(Self::recv_pump(
      self.name.clone(),
      socket.clone(),
      self.events.clone(),
      self.known_addresses.clone(),
      self.peers.clone(),
      cancel.clone(),
    ));
    *socket_slot = Some(socket);
    *self.cancel.lock().await = Some(cancel);
    let _ = self.events.send(ConnectionEvent::Open);
    Ok(())
  }

  async fn close(&self) -> Result<(), ConnectionError> {
    self.socket.lock().await.take();
    if let Some(cancel) = self.cancel.lock().await.take() {
      cancel.cancel();
    }
    Ok(())
  }

  fn event_stream(&self) -> broadcast::Receiver<ConnectionEvent> {
    self.events.subscribe()
  }

  async fn read_metrics(
    &self,
    _metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
  ) -> Result<(), ConnectionError> {
    Ok(())
  }

  /// Send each metric's encoded payload as one datagram to the last
  /// peer seen under the metric's address.
  async fn write_metrics(
    &self,
    metrics: &[Metric],
    format: PayloadFormat,
    delimiter: &str,
  ) -> Result<(), ConnectionError> {
    let socket = self
      .socket
      .lock()
      .await
      .clone()
      .ok_or(ConnectionError::NotOpen)?;
    for metric in metrics {
      let address = metric.properties().address().clone().unwrap_or_default();
      let Some(peer) = self.peers.get(&address).map(|entry| *entry.value()) else {
        return Err(ConnectionError::Transport(format!(
          "no datagram seen for '{address}' yet, peer unknown"
        )));
      };
      let payload = codec::encode(std::slice::from_ref(metric), format, delimiter)
        .map_err(|e| ConnectionError::Transport(e.to_string()))?;
      socket
        .send_to(&payload.into_bytes(), peer)
        .await
        .map_err(|e| ConnectionError::Transport(e.to_string()))?;
    }
    Ok(())
  }

  async fn start_subscription(
    &self,
    metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
    _interval: Duration,
    _device_id: &str,
  ) -> Result<(), ConnectionError> {
    for metric in metrics {
      if let Some(address) = metric.properties().address() {
        if !address.is_empty() {
          self.known_addresses.insert(address.clone());
        }
      }
    }
    Ok(())
  }

  async fn stop_subscription(&self, _device_id: &str) -> Result<(), ConnectionError> {
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use edgelink_core::metric::{DataType, MetricProperties, MetricValue};

  #[tokio::test]
  async fn test_write_requires_open_socket() {
    let connection = UdpConnection::new("udp-test", UdpConnDetails { port: 0 });
    let metric = Metric::new("cmd", DataType::UInt8)
      .with_properties(MetricProperties::new("SET", Some("9100".to_owned()), Some("0".to_owned())))
      .with_value(Some(MetricValue::UInt8(1)), Some(1));
    let outcome = connection
      .write_metrics(&[metric], PayloadFormat::FixedBuffer, "")
      .await;
    assert_eq!(outcome, Err(ConnectionError::NotOpen));
  }

  #[tokio::test]
  async fn test_write_requires_a_seen_peer() {
    let connection = UdpConnection::new("udp-test", UdpConnDetails { port: 0 });
    connection.open().await.expect("binds an ephemeral port");
    let metric = Metric::new("cmd", DataType::UInt8)
      .with_properties(MetricProperties::new("SET", Some("9100".to_owned()), Some("0".to_owned())))
      .with_value(Some(MetricValue::UInt8(1)), Some(1));
    let outcome = connection
      .write_metrics(&[metric], PayloadFormat::FixedBuffer, "")
      .await;
    assert!(matches!(outcome, Err(ConnectionError::Transport(_))));
    connection.close().await.expect("close is idempotent");
  }
}
