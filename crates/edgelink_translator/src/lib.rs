// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The device-translation engine.
//!
//! This crate owns the moving parts between a southbound driver and the
//! northbound Sparkplug node: the [connection] contract every driver
//! implements, the per-device actor with its birth/data/death lifecycle
//! and [watchdog], the [translator] supervisor that wires connections to
//! devices and routes events between them, and the [config] rehasher that
//! turns the external configuration document into device specs.
//!
//! ## Engine lifetime
//!
//! - Bringup
//!   - [TranslatorBuilder::start](translator::TranslatorBuilder::start)
//!     polls the identity and config services until both yield, rehashes the
//!     document, constructs the Sparkplug node through the injected
//!     factory, then builds one connection per declared southbound
//!     endpoint and one device actor per declared device.
//! - Translation
//!   - Each device actor consumes its connection's event stream, runs
//!     change detection against its metric store, and publishes
//!     BIRTH/DATA/DEATH northbound. Sparkplug commands flow the other
//!     way through the supervisor into the owning device.
//! - Teardown
//!   - [Translator::stop](translator::Translator::stop) stops every
//!     device (cancelling watchdogs and subscriptions), closes every
//!     connection, and stops the Sparkplug node.

#[macro_use]
extern crate log;

pub mod config;
pub mod connection;
pub mod device;
pub mod services;
pub mod sparkplug;
pub mod translator;
pub mod watchdog;

pub use connection::{ConnectionEvent, DeviceConnection, SubscriptionTasks};
pub use device::{DeviceCommand, DeviceHandle};
pub use sparkplug::{CommandMetric, CommandPayload, SparkplugEvent, SparkplugNode};
pub use translator::{ConnectionFactory, ConnectionRegistry, RegistryEntry, Translator};
