// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Core library for the Edgelink edge protocol translator.
//!
//! This crate carries everything the translation engine shares across
//! southbound drivers: the Sparkplug-flavoured metric model and its
//! multi-key store, the payload codec layer (delimited, JSON/JSONPath,
//! XML/XPath, fixed binary buffers), the error vocabulary, and the async
//! utilities the rest of the workspace spawns tasks through.

#[macro_use]
extern crate log;

pub mod codec;
pub mod errors;
pub mod metric;
pub mod util;

pub use codec::{EncodedPayload, PayloadFormat, RawValue};
pub use metric::{
  DataSetValue,
  DataType,
  Endianness,
  Metric,
  MetricProperties,
  MetricValue,
  store::MetricStore,
};
