// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Textual OPC UA security lookups used when validating connection
//! details. Unknown values resolve to `Invalid` rather than erroring so a
//! bad config surfaces as a logged, skippable connection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityMode {
  None,
  Sign,
  SignAndEncrypt,
  Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityPolicy {
  None,
  Basic128Rsa15,
  Basic256,
  Basic256Sha256,
  Aes128Sha256RsaOaep,
  Aes256Sha256RsaPss,
  Invalid,
}

pub fn security_mode(value: &str) -> SecurityMode {
  match value {
    "None" => SecurityMode::None,
    "Sign" => SecurityMode::Sign,
    "SignAndEncrypt" => SecurityMode::SignAndEncrypt,
    _ => SecurityMode::Invalid,
  }
}

pub fn security_policy(value: &str) -> SecurityPolicy {
  match value {
    "None" => SecurityPolicy::None,
    "Basic128Rsa15" => SecurityPolicy::Basic128Rsa15,
    "Basic256" => SecurityPolicy::Basic256,
    "Basic256Sha256" => SecurityPolicy::Basic256Sha256,
    "Aes128_Sha256_RsaOaep" => SecurityPolicy::Aes128Sha256RsaOaep,
    "Aes256_Sha256_RsaPss" => SecurityPolicy::Aes256Sha256RsaPss,
    _ => SecurityPolicy::Invalid,
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_unknown_values_resolve_to_invalid() {
    assert_eq!(security_mode("SignAndEncrypt"), SecurityMode::SignAndEncrypt);
    assert_eq!(security_mode("signandencrypt"), SecurityMode::Invalid);
    assert_eq!(security_policy("Basic256Sha256"), SecurityPolicy::Basic256Sha256);
    assert_eq!(security_policy("TripleROT13"), SecurityPolicy::Invalid);
  }
}
