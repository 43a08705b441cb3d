// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! ASCII-over-TCP southbound driver.
//!
//! Line-oriented request/response gear (barcode readers, scales, legacy
//! controllers): a poll sends each readable address as a request line,
//! replies come back as lines and are delivered under the wildcard empty
//! address for the metrics' `path` selectors to pick apart.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::{broadcast, mpsc, Mutex}};
use tokio_util::{
  codec::{Framed, LinesCodec},
  sync::CancellationToken,
};

use edgelink_core::{
  codec::{self, RawValue},
  errors::ConnectionError,
  metric::Metric,
  util::spawn_task,
  PayloadFormat,
};
use edgelink_translator::{
  config::AsciiTcpConnDetails,
  connection::{ConnectionEvent, DeviceConnection, SubscriptionTasks, EVENT_CHANNEL_CAPACITY},
};

type LineSink = SplitSink<Framed<TcpStream, LinesCodec>, String>;

pub struct AsciiTcpConnection {
  name: String,
  details: AsciiTcpConnDetails,
  events: broadcast::Sender<ConnectionEvent>,
  writer: Mutex<Option<mpsc::Sender<String>>>,
  subscriptions: SubscriptionTasks,
  cancel: Mutex<Option<CancellationToken>>,
}

impl AsciiTcpConnection {
  pub fn new(name: &str, details: AsciiTcpConnDetails) -> Self {
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self {
      name: name.to_owned(),
      details,
      events,
      writer: Mutex::new(None),
      subscriptions: SubscriptionTasks::new(),
      cancel: Mutex::new(None),
    }
  }

  fn request_lines(metrics: &[Metric]) -> Vec<String> {
    let mut lines: Vec<String> = metrics
      .iter()
      .filter(|m| m.is_readable())
      .filter_map(|m| m.properties().address().clone())
      .filter(|a| !a.is_empty())
      .collect();
    lines.sort();
    lines.dedup();
    lines
  }

  async fn write_pump(
    name: String,
    mut sink: LineSink,
    mut lines: mpsc::Receiver<String>,
    events: broadcast::Sender<ConnectionEvent>,
  ) {
    while let Some(line) = lines.recv().await {
      if let Err(e) = sink.send(line).await {
        warn!("{name} line write failed: {e}");
        let _ = events.send(ConnectionEvent::Error(e.to_string()));
        return;
      }
    }
  }

  async fn send_lines(&self, lines: Vec<String>) -> Result<(), ConnectionError> {
    let writer = self.writer.lock().await;
    let writer = writer.as_ref().ok_or(ConnectionError::NotOpen)?;
    for line in lines {
      writer
        .send(line)
        .await
        .map_err(|_| ConnectionError::Transport("line writer gone".to_owned()))?;
    }
    Ok(())
  }
}

#[async_trait]
impl DeviceConnection for AsciiTcpConnection {
  fn name(&self) -> &str {
    &self.name
  }

  async fn open(&self) -> Result<(), ConnectionError> {
    let mut writer_slot = self.writer.lock().await;
    if writer_slot.is_some() {
      return Ok(());
    }
    let stream = TcpStream::connect((self.details.host.as_str(), self.details.port))
      .await
      .map_err(|e| ConnectionError::Transport(e.to_string()))?;
    info!("{} connected to {}:{}", self.name, self.details.host, self.details.port);
    let framed = Framed::new(stream, LinesCodec::new());
    let (sink, mut source) = framed.split();
    let (line_sender, line_receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    spawn_task(Self::write_pump(
      self.name.clone(),
      sink,
      line_receiver,
      self.events.clone(),
    ));

    let name = self.name.clone();
    let events = self.events.clone();
    let read_cancel = cancel.clone();
    spawn_task(async move {
      loop {
        tokio::select! {
          _ = read_cancel.cancelled() => break,
          line = source.next() => match line {
            Some(Ok(line)) => {
              let mut values = HashMap::new();
              values.insert(String::new(), RawValue::Text(line));
              let _ = events.send(ConnectionEvent::Data { values, parse_vals: true });
            }
            Some(Err(e)) => {
              warn!("{name} line read failed: {e}");
              let _ = events.send(ConnectionEvent::Error(e.to_string()));
              break;
            }
            None => break,
          }
        }
      }
      let _ = events.send(ConnectionEvent::Close);
      debug!("{name} read pump stopped");
    });

    *writer_slot = Some(line_sender);
    *self.cancel.lock().await = Some(cancel);
    let _ = self.events.send(ConnectionEvent::Open);
    Ok(())
  }

  async fn close(&self) -> Result<(), ConnectionError> {
    self.subscriptions.stop_all();
    self.writer.lock().await.take();
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
    metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
  ) -> Result<(), ConnectionError> {
    self.send_lines(Self::request_lines(metrics)).await
  }

  async fn write_metrics(
    &self,
    metrics: &[Metric],
    format: PayloadFormat,
    delimiter: &str,
  ) -> Result<(), ConnectionError> {
    let payload =
      codec::encode(metrics, format, delimiter).map_err(|e| ConnectionError::Transport(e.to_string()))?;
    let line = match payload {
      codec::EncodedPayload::Text(text) => text,
      codec::EncodedPayload::Bytes(body) => String::from_utf8_lossy(&body).into_owned(),
    };
    self.send_lines(vec![line]).await
  }

  async fn start_subscription(
    &self,
    metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
    interval: Duration,
    device_id: &str,
  ) -> Result<(), ConnectionError> {
    let writer = self
      .writer
      .lock()
      .await
      .clone()
      .ok_or(ConnectionError::NotOpen)?;
    let lines = Self::request_lines(metrics);
    self.subscriptions.start(device_id, interval, move || {
      let writer = writer.clone();
      let lines = lines.clone();
      async move {
        for line in lines {
          if writer.send(line).await.is_err() {
            return;
          }
        }
      }
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
  fn test_request_lines_deduplicate() {
    let m1 = Metric::new("a", DataType::Double).with_properties(MetricProperties::new(
      "GET",
      Some("RD M100".to_owned()),
      Some("0".to_owned()),
    ));
    let m2 = Metric::new("b", DataType::Double).with_properties(MetricProperties::new(
      "GET",
      Some("RD M100".to_owned()),
      Some("1".to_owned()),
    ));
    let m3 = Metric::new("c", DataType::Double).with_properties(MetricProperties::new(
      "SET",
      Some("WR M200".to_owned()),
      None,
    ));
    assert_eq!(
      AsciiTcpConnection::request_lines(&[m1, m2, m3]),
      vec!["RD M100".to_owned()]
    );
  }
}
