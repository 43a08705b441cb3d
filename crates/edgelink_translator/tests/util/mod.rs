// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Shared mocks: a scriptable southbound connection and a recording
//! Sparkplug node.

// Each test binary uses its own slice of these helpers.
#![allow(dead_code)]

use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  },
  time::Duration,
};

use async_trait::async_trait;
use tokio::sync::broadcast;

use edgelink_core::{
  codec::{PayloadFormat, RawValue},
  errors::{ConnectionError, SparkplugError},
  metric::{Metric, MetricValue},
};
use edgelink_translator::{
  connection::{ConnectionEvent, DeviceConnection},
  sparkplug::{SparkplugEvent, SparkplugNode},
};

pub struct MockConnection {
  events: broadcast::Sender<ConnectionEvent>,
  pub writes: Mutex<Vec<Vec<Metric>>>,
  pub reads: AtomicUsize,
  pub subscription_intervals: Mutex<Vec<u64>>,
  pub subscription_stops: AtomicUsize,
}

impl MockConnection {
  pub fn new() -> Arc<Self> {
    let (events, _) = broadcast::channel(64);
    Arc::new(Self {
      events,
      writes: Mutex::new(Vec::new()),
      reads: AtomicUsize::new(0),
      subscription_intervals: Mutex::new(Vec::new()),
      subscription_stops: AtomicUsize::new(0),
    })
  }

  pub fn emit(&self, event: ConnectionEvent) {
    let _ = self.events.send(event);
  }

  pub fn emit_data(&self, address: &str, raw: RawValue, parse_vals: bool) {
    let mut values = HashMap::new();
    values.insert(address.to_owned(), raw);
    self.emit(ConnectionEvent::Data { values, parse_vals });
  }

  pub fn write_count(&self) -> usize {
    self.writes.lock().expect("not poisoned").len()
  }

  pub fn intervals(&self) -> Vec<u64> {
    self
      .subscription_intervals
      .lock()
      .expect("not poisoned")
      .clone()
  }
}

#[async_trait]
impl DeviceConnection for MockConnection {
  fn name(&self) -> &str {
    "mock"
  }

  async fn open(&self) -> Result<(), ConnectionError> {
    self.emit(ConnectionEvent::Open);
    Ok(())
  }

  async fn close(&self) -> Result<(), ConnectionError> {
    self.emit(ConnectionEvent::Close);
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
    self.reads.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  async fn write_metrics(
    &self,
    metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
  ) -> Result<(), ConnectionError> {
    self
      .writes
      .lock()
      .expect("not poisoned")
      .push(metrics.to_vec());
    Ok(())
  }

  async fn start_subscription(
    &self,
    _metrics: &[Metric],
    _format: PayloadFormat,
    _delimiter: &str,
    interval: Duration,
    _device_id: &str,
  ) -> Result<(), ConnectionError> {
    self
      .subscription_intervals
      .lock()
      .expect("not poisoned")
      .push(interval.as_millis() as u64);
    Ok(())
  }

  async fn stop_subscription(&self, _device_id: &str) -> Result<(), ConnectionError> {
    self.subscription_stops.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

/// A recorded northbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
  Birth(String, Vec<String>),
  Data(String, Vec<(String, Option<MetricValue>)>),
  Death(String),
}

pub struct MockSparkplug {
  events: broadcast::Sender<SparkplugEvent>,
  pub frames: Mutex<Vec<Frame>>,
}

impl MockSparkplug {
  pub fn new() -> Arc<Self> {
    let (events, _) = broadcast::channel(64);
    Arc::new(Self {
      events,
      frames: Mutex::new(Vec::new()),
    })
  }

  pub fn emit(&self, event: SparkplugEvent) {
    let _ = self.events.send(event);
  }

  pub fn frames(&self) -> Vec<Frame> {
    self.frames.lock().expect("not poisoned").clone()
  }

  pub fn births(&self) -> usize {
    self
      .frames()
      .iter()
      .filter(|f| matches!(f, Frame::Birth(_, _)))
      .count()
  }

  pub fn deaths(&self) -> usize {
    self
      .frames()
      .iter()
      .filter(|f| matches!(f, Frame::Death(_)))
      .count()
  }

  pub fn data_frames(&self) -> Vec<Vec<(String, Option<MetricValue>)>> {
    self
      .frames()
      .into_iter()
      .filter_map(|f| match f {
        Frame::Data(_, metrics) => Some(metrics),
        _ => None,
      })
      .collect()
  }
}

#[async_trait]
impl SparkplugNode for MockSparkplug {
  async fn publish_device_birth(
    &self,
    device_id: &str,
    metrics: &[Metric],
  ) -> Result<Vec<Option<u64>>, SparkplugError> {
    self.frames.lock().expect("not poisoned").push(Frame::Birth(
      device_id.to_owned(),
      metrics.iter().map(|m| m.name().clone()).collect(),
    ));
    Ok((1..=metrics.len() as u64).map(Some).collect())
  }

  async fn publish_device_data(
    &self,
    device_id: &str,
    metrics: &[Metric],
  ) -> Result<(), SparkplugError> {
    self.frames.lock().expect("not poisoned").push(Frame::Data(
      device_id.to_owned(),
      metrics
        .iter()
        .map(|m| (m.name().clone(), m.value().cloned()))
        .collect(),
    ));
    Ok(())
  }

  async fn publish_device_death(&self, device_id: &str) -> Result<(), SparkplugError> {
    self
      .frames
      .lock()
      .expect("not poisoned")
      .push(Frame::Death(device_id.to_owned()));
    Ok(())
  }

  async fn stop(&self) -> Result<(), SparkplugError> {
    Ok(())
  }

  fn event_stream(&self) -> broadcast::Receiver<SparkplugEvent> {
    self.events.subscribe()
  }
}
