// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Ordered metric sequence with the four lookup indices the translation
//! engine needs: by name, by Sparkplug alias, by device address, and by
//! (address, path).
//!
//! The store lives inside a single device actor, so the indices are plain
//! maps; there is no cross-task sharing to defend against.

use std::collections::HashMap;

use super::{Metric, MetricValue};

#[derive(Debug, Default)]
pub struct MetricStore {
  metrics: Vec<Metric>,
  by_name: HashMap<String, usize>,
  by_alias: HashMap<u64, usize>,
  by_address: HashMap<String, Vec<usize>>,
  /// (address, path) -> index, GET metrics only. `path` is the empty
  /// string for metrics that read the whole payload at their address.
  by_address_path: HashMap<(String, String), usize>,
}

impl MetricStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append metrics and rebuild every index.
  pub fn add(&mut self, metrics: Vec<Metric>) {
    self.metrics.extend(metrics);
    self.rebuild_indices();
  }

  fn rebuild_indices(&mut self) {
    self.by_name.clear();
    self.by_alias.clear();
    self.by_address.clear();
    self.by_address_path.clear();
    for (i, metric) in self.metrics.iter().enumerate() {
      if self.by_name.insert(metric.name().clone(), i).is_some() {
        warn!("duplicate metric name '{}', later definition wins", metric.name());
      }
      if let Some(alias) = metric.alias() {
        self.by_alias.insert(alias, i);
      }
      if let Some(address) = metric.properties().address() {
        self
          .by_address
          .entry(address.clone())
          .or_default()
          .push(i);
        if metric.is_readable() {
          let path = metric.properties().path().clone().unwrap_or_default();
          let key = (address.clone(), path);
          if self.by_address_path.insert(key, i).is_some() {
            warn!(
              "duplicate (address, path) binding for '{}', later definition wins",
              metric.name()
            );
          }
        }
      }
    }
  }

  pub fn len(&self) -> usize {
    self.metrics.len()
  }

  pub fn is_empty(&self) -> bool {
    self.metrics.is_empty()
  }

  /// The ordered view, as declared (default metrics first).
  pub fn metrics(&self) -> &[Metric] {
    &self.metrics
  }

  /// Distinct addresses that participate in reads, enumerated from the
  /// (address, path) index rather than the plain address index, so
  /// write-only addresses never leak into a subscription.
  pub fn addresses(&self) -> Vec<String> {
    let mut out: Vec<String> = self
      .by_address_path
      .keys()
      .map(|(address, _)| address.clone())
      .collect();
    out.sort();
    out.dedup();
    out
  }

  /// Assign the Sparkplug alias for the metric at ordinal `index`.
  pub fn set_alias(&mut self, index: usize, alias: u64) {
    if let Some(metric) = self.metrics.get_mut(index) {
      metric.set_alias(alias);
      self.by_alias.insert(alias, index);
    }
  }

  pub fn name_for_alias(&self, alias: u64) -> Option<&str> {
    self
      .by_alias
      .get(&alias)
      .and_then(|i| self.metrics.get(*i))
      .map(|m| m.name().as_str())
  }

  pub fn get_by_name(&self, name: &str) -> Option<&Metric> {
    self.by_name.get(name).and_then(|i| self.metrics.get(*i))
  }

  pub fn get_by_alias(&self, alias: u64) -> Option<&Metric> {
    self.by_alias.get(&alias).and_then(|i| self.metrics.get(*i))
  }

  /// Every metric bound to `address`, readable or not.
  pub fn get_by_address(&self, address: &str) -> Vec<&Metric> {
    self
      .by_address
      .get(address)
      .map(|indices| indices.iter().filter_map(|i| self.metrics.get(*i)).collect())
      .unwrap_or_default()
  }

  /// The paths registered under `address` in the read index.
  pub fn paths_for_address(&self, address: &str) -> Vec<String> {
    let mut out: Vec<String> = self
      .by_address_path
      .keys()
      .filter(|(a, _)| a == address)
      .map(|(_, path)| path.clone())
      .collect();
    out.sort();
    out
  }

  pub fn get_by_address_path(&self, address: &str, path: &str) -> Option<&Metric> {
    self
      .by_address_path
      .get(&(address.to_owned(), path.to_owned()))
      .and_then(|i| self.metrics.get(*i))
  }

  pub fn set_value_by_name(
    &mut self,
    name: &str,
    value: Option<MetricValue>,
    timestamp: Option<u64>,
  ) -> Option<&Metric> {
    let index = *self.by_name.get(name)?;
    self.set_value_at(index, value, timestamp)
  }

  pub fn set_value_by_alias(
    &mut self,
    alias: u64,
    value: Option<MetricValue>,
    timestamp: Option<u64>,
  ) -> Option<&Metric> {
    let index = *self.by_alias.get(&alias)?;
    self.set_value_at(index, value, timestamp)
  }

  pub fn set_value_by_address_path(
    &mut self,
    address: &str,
    path: &str,
    value: Option<MetricValue>,
    timestamp: Option<u64>,
  ) -> Option<&Metric> {
    let index = *self
      .by_address_path
      .get(&(address.to_owned(), path.to_owned()))?;
    self.set_value_at(index, value, timestamp)
  }

  fn set_value_at(
    &mut self,
    index: usize,
    value: Option<MetricValue>,
    timestamp: Option<u64>,
  ) -> Option<&Metric> {
    let metric = self.metrics.get_mut(index)?;
    metric.set_value(value, timestamp);
    Some(&self.metrics[index])
  }
}
