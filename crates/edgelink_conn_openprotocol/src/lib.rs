// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Open Protocol southbound driver (tightening controllers).
//!
//! ASCII MID frames over TCP: communication start (MID 0001/0002),
//! tightening result subscription (MID 0060/0061/0062) and keep-alive
//! (MID 9999). Result payloads arrive under the MID number as address,
//! positional ASCII for `fixedBuffer`/delimited metric paths to pick
//! apart.

#[macro_use]
extern crate log;

mod connection;
pub mod mid;

pub use connection::OpenProtocolConnection;
