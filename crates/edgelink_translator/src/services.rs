// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The identity and configuration services the translator polls at
//! bringup, plus the retry loop both share. Neither service is optional:
//! bringup blocks until both yield.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use getset::Getters;
use uuid::{uuid, Uuid};

use edgelink_core::util::sleep;

/// The well-known application UUID of the edge agent, the key under
/// which the config service files this node's document.
pub const EDGE_AGENT_APP_UUID: Uuid = uuid!("aac6f843-cfee-4683-b121-6943bfdf9173");

/// This node's identity as the auth service knows it.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Principal {
  uuid: Uuid,
  /// Sparkplug group/node address assigned to this principal.
  sparkplug: String,
}

impl Principal {
  pub fn new(uuid: Uuid, sparkplug: &str) -> Self {
    Self {
      uuid,
      sparkplug: sparkplug.to_owned(),
    }
  }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
  /// Returns this node's principal, or `None` while the auth service
  /// has nothing for us yet.
  async fn find_principal(&self) -> Option<Principal>;
}

#[async_trait]
pub trait ConfigSource: Send + Sync {
  /// Fetch the configuration document for `(application, node)`, or
  /// `None` while the service is unreachable or has no config.
  async fn fetch_config(&self, application: Uuid, node: Uuid) -> Option<serde_json::Value>;
}

/// Poll `probe` until it yields, waiting `interval` between attempts.
/// Every attempt and failure is logged; the loop never gives up.
pub async fn retry_until<T, F, Fut>(name: &str, interval: Duration, mut probe: F) -> T
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Option<T>>,
{
  let mut attempt = 0u64;
  loop {
    attempt += 1;
    debug!("fetching {name} (attempt {attempt})");
    if let Some(value) = probe().await {
      info!("{name} available after {attempt} attempt(s)");
      return value;
    }
    warn!("{name} unavailable, retrying in {}s", interval.as_secs());
    sleep(interval).await;
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
  };

  #[tokio::test(start_paused = true)]
  async fn test_retry_until_polls_until_defined() {
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();
    let value = retry_until("thing", Duration::from_secs(5), move || {
      let attempts = attempts_clone.clone();
      async move {
        if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
          None
        } else {
          Some(42)
        }
      }
    })
    .await;
    assert_eq!(value, 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
  }
}
