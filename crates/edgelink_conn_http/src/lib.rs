// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! REST and MTConnect southbound drivers.
//!
//! Both poll HTTP endpoints under a base URL: a metric's `address` is
//! the request path, its `path` selects inside the response body
//! (JSONPath for REST, XPath for MTConnect streams). MTConnect is the
//! same transport pointed at an agent's `current` document.

#[macro_use]
extern crate log;

mod rest;

pub use rest::RestConnection;
