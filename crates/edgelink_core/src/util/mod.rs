// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use std::{future::Future, time::Duration};

/// Detach a long-lived engine task: a device actor, a driver socket
/// pump, a watchdog, a poll loop. Every task the engine spawns funnels
/// through here so the runtime binding lives in exactly one place.
///
/// Tasks are expected to end themselves when their input channel closes
/// or their cancellation token fires; nothing holds a join handle.
pub fn spawn_task<Fut>(future: Fut)
where
  Fut: Future<Output = ()> + Send + 'static,
{
  tokio::spawn(future);
}

pub async fn sleep(duration: Duration) {
  tokio::time::sleep(duration).await;
}

/// Milliseconds since the Unix epoch, the timestamp base of every
/// Sparkplug frame and metric update.
pub fn unix_millis() -> u64 {
  chrono::Utc::now().timestamp_millis().max(0) as u64
}
