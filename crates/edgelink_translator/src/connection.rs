// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The device-connection contract every southbound driver implements.
//!
//! A connection is shared by every device declared on the same endpoint
//! and speaks to its devices exclusively through a broadcast event
//! stream; devices never call back into driver internals.

use std::{collections::HashMap, future::Future, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{select, sync::broadcast};
use tokio_util::sync::CancellationToken;

use edgelink_core::{
  codec::RawValue,
  errors::ConnectionError,
  metric::Metric,
  util::{sleep, spawn_task},
  PayloadFormat,
};

/// Capacity of every driver's broadcast event channel. Receivers that
/// fall further behind than this drop the oldest events and log.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events a driver may emit, consumed by the owning devices.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
  /// The driver is usable.
  Open,
  /// The driver lost its transport; devices treat this as disconnect.
  Close,
  /// Non-fatal driver error.
  Error(String),
  /// A batch of readings keyed by device address. `parse_vals: false`
  /// signals the driver already decoded the values natively and the
  /// codec layer must be bypassed.
  Data {
    values: HashMap<String, RawValue>,
    parse_vals: bool,
  },
}

/// Abstract southbound driver.
///
/// `open`/`close` are idempotent. `read_metrics` is a one-shot read that
/// reports through the event stream rather than a return value, so push
/// and poll drivers look identical to a device. `write_metrics` resolves
/// exactly once with the write outcome.
#[async_trait]
pub trait DeviceConnection: Send + Sync {
  /// Connection name from the configuration, for logging.
  fn name(&self) -> &str;

  async fn open(&self) -> Result<(), ConnectionError>;

  async fn close(&self) -> Result<(), ConnectionError>;

  /// Subscribe to this driver's events. May be called any number of
  /// times; each call gets an independent stream.
  fn event_stream(&self) -> broadcast::Receiver<ConnectionEvent>;

  /// One-shot read of every readable metric; results arrive as a `Data`
  /// event.
  async fn read_metrics(
    &self,
    metrics: &[Metric],
    format: PayloadFormat,
    delimiter: &str,
  ) -> Result<(), ConnectionError>;

  async fn write_metrics(
    &self,
    metrics: &[Metric],
    format: PayloadFormat,
    delimiter: &str,
  ) -> Result<(), ConnectionError>;

  /// Begin a periodic read for one device. Poll drivers arm a timer task
  /// that repeats the `read_metrics` fetch; push drivers arm their push
  /// pipeline and return immediately.
  async fn start_subscription(
    &self,
    metrics: &[Metric],
    format: PayloadFormat,
    delimiter: &str,
    interval: Duration,
    device_id: &str,
  ) -> Result<(), ConnectionError>;

  /// Cancel the periodic read armed for `device_id`.
  async fn stop_subscription(&self, device_id: &str) -> Result<(), ConnectionError>;
}

/// Per-device polling tasks for drivers that subscribe by timer. Arming
/// a device that already has a task replaces (cancels) the old one.
#[derive(Debug, Default)]
pub struct SubscriptionTasks {
  tasks: DashMap<String, CancellationToken>,
}

impl SubscriptionTasks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Spawn a cancellable poll loop for `device_id` that runs `poll`
  /// every `interval`.
  pub fn start<F, Fut>(&self, device_id: &str, interval: Duration, poll: F)
  where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
  {
    let token = CancellationToken::new();
    if let Some(previous) = self.tasks.insert(device_id.to_owned(), token.clone()) {
      previous.cancel();
    }
    spawn_task(async move {
      loop {
        select! {
          _ = token.cancelled() => break,
          _ = sleep(interval) => poll().await,
        }
      }
    });
  }

  pub fn stop(&self, device_id: &str) {
    if let Some((_, token)) = self.tasks.remove(device_id) {
      token.cancel();
    }
  }

  pub fn stop_all(&self) {
    for entry in self.tasks.iter() {
      entry.value().cancel();
    }
    self.tasks.clear();
  }
}

impl Drop for SubscriptionTasks {
  fn drop(&mut self) {
    self.stop_all();
  }
}
