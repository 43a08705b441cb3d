// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Siemens S7 southbound driver.
//!
//! Speaks S7comm over ISO-on-TCP (TPKT/COTP) directly: connect, setup
//! communication, read/write var. Metric addresses use the widespread
//! node-7 grammar (`DB1,X0.0`, `DB5,REAL4`, `IW2`, `MB0`). Values are
//! decoded natively here, so data events bypass the codec layer.

#[macro_use]
extern crate log;

pub mod address;
mod client;
mod connection;

pub use address::{S7Address, S7Area, S7Type};
pub use client::S7Client;
pub use connection::S7Connection;
