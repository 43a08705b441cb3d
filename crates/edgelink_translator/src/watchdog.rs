// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Per-device dead-man timer.
//!
//! A monotonic deadline pushed forward by every `feed`. When the
//! deadline passes while armed, one expiry notification is sent and the
//! timer disarms itself; the next feed re-arms it. This is the sole
//! mechanism reporting a silent driver northbound.

use std::time::Duration;

use edgelink_core::util::spawn_task;
use tokio::{
  select,
  sync::mpsc,
  time::{sleep_until, Instant},
};

pub enum WatchdogMessage {
  Feed,
  Stop,
  End,
}

async fn watchdog_loop(
  timeout: Duration,
  mut control: mpsc::Receiver<WatchdogMessage>,
  expired: mpsc::Sender<()>,
) {
  let mut armed = false;
  let mut deadline = Instant::now() + timeout;
  loop {
    select! {
      _ = sleep_until(deadline) => {
        if armed {
          armed = false;
          if expired.send(()).await.is_err() {
            return;
          }
        }
        deadline = Instant::now() + timeout;
      }
      msg = control.recv() => {
        match msg {
          Some(WatchdogMessage::Feed) => {
            armed = true;
            deadline = Instant::now() + timeout;
          }
          Some(WatchdogMessage::Stop) => armed = false,
          Some(WatchdogMessage::End) | None => return,
        }
      }
    }
  }
}

pub struct Watchdog {
  sender: mpsc::Sender<WatchdogMessage>,
}

impl Watchdog {
  /// Spawn the timer task. Expiries arrive on `expired`; nothing fires
  /// until the first `feed`.
  pub fn new(timeout: Duration, expired: mpsc::Sender<()>) -> Self {
    let (sender, receiver) = mpsc::channel(64);
    spawn_task(watchdog_loop(timeout, receiver, expired));
    Self { sender }
  }

  pub async fn feed(&self) {
    if self.sender.send(WatchdogMessage::Feed).await.is_err() {
      debug!("watchdog task already gone, feed dropped");
    }
  }

  pub async fn stop(&self) {
    if self.sender.send(WatchdogMessage::Stop).await.is_err() {
      debug!("watchdog task already gone, stop dropped");
    }
  }
}

impl Drop for Watchdog {
  fn drop(&mut self) {
    let sender = self.sender.clone();
    spawn_task(async move {
      if sender.send(WatchdogMessage::End).await.is_err() {
        debug!("watchdog task already gone");
      }
    });
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_expires_once_after_silence() {
    let (tx, mut rx) = mpsc::channel(1);
    let watchdog = Watchdog::new(Duration::from_secs(10), tx);
    watchdog.feed().await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(rx.try_recv().is_ok(), "expected an expiry");
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(rx.try_recv().is_err(), "expiry must fire once per silence");
  }

  #[tokio::test(start_paused = true)]
  async fn test_no_expiry_while_fed() {
    let (tx, mut rx) = mpsc::channel(1);
    let watchdog = Watchdog::new(Duration::from_secs(10), tx);
    for _ in 0..10 {
      watchdog.feed().await;
      tokio::time::sleep(Duration::from_secs(5)).await;
    }
    assert!(rx.try_recv().is_err(), "fed watchdog must stay quiet");
  }

  #[tokio::test(start_paused = true)]
  async fn test_refeeding_rearms_after_expiry() {
    let (tx, mut rx) = mpsc::channel(1);
    let watchdog = Watchdog::new(Duration::from_secs(10), tx);
    watchdog.feed().await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(rx.try_recv().is_ok());
    watchdog.feed().await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(rx.try_recv().is_ok(), "watchdog must re-arm on feed");
  }

  #[tokio::test(start_paused = true)]
  async fn test_stop_disarms() {
    let (tx, mut rx) = mpsc::channel(1);
    let watchdog = Watchdog::new(Duration::from_secs(10), tx);
    watchdog.feed().await;
    watchdog.stop().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(rx.try_recv().is_err(), "stopped watchdog must stay quiet");
  }
}
