// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Raw-socket southbound drivers: UDP datagram listeners and
//! line-oriented ASCII-over-TCP.

#[macro_use]
extern crate log;

mod ascii_tcp;
mod udp;

pub use ascii_tcp::AsciiTcpConnection;
pub use udp::UdpConnection;
