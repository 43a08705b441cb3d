// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! MQTT southbound driver.
//!
//! Push-based: a metric's `address` is a topic filter subscribed at
//! `start_subscription`; inbound publishes fan out to every matching
//! filter so the device store finds its metrics under the address it
//! declared. Writes publish to the metric's topic.

#[macro_use]
extern crate log;

mod mqtt;
pub(crate) mod topic;

pub use mqtt::MqttConnection;
