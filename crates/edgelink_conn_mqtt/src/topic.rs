// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! MQTT topic filter matching (`+` single level, `#` multi level).

pub fn matches(filter: &str, topic: &str) -> bool {
  let mut filter_levels = filter.split('/');
  let mut topic_levels = topic.split('/');
  loop {
    match (filter_levels.next(), topic_levels.next()) {
      (Some("#"), _) => return true,
      (Some("+"), Some(_)) => continue,
      (Some(f), Some(t)) if f == t => continue,
      (None, None) => return true,
      _ => return false,
    }
  }
}
