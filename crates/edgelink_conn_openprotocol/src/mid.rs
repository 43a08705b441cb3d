// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Open Protocol MID framing.
//!
//! Every frame is ASCII: a 20-character header (4-digit length, 4-digit
//! MID, 3-digit revision, then flags/spindle/station/sequence fields)
//! followed by the data field, terminated by a NUL. The length counts
//! header plus data, excluding the terminator.

use edgelink_core::errors::ConnectionError;

pub const HEADER_LEN: usize = 20;
pub const TERMINATOR: u8 = 0x00;

pub const MID_COMM_START: u16 = 1;
pub const MID_COMM_START_ACK: u16 = 2;
pub const MID_COMM_NEGATIVE_ACK: u16 = 4;
pub const MID_RESULT_SUBSCRIBE: u16 = 60;
pub const MID_RESULT: u16 = 61;
pub const MID_RESULT_ACK: u16 = 62;
pub const MID_RESULT_UNSUBSCRIBE: u16 = 63;
pub const MID_KEEP_ALIVE: u16 = 9999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidFrame {
  pub mid: u16,
  pub revision: u16,
  pub data: String,
}

impl MidFrame {
  pub fn new(mid: u16, revision: u16, data: &str) -> Self {
    Self {
      mid,
      revision,
      data: data.to_owned(),
    }
  }

  /// Serialize to the wire form, including the NUL terminator.
  pub fn encode(&self) -> Vec<u8> {
    let length = HEADER_LEN + self.data.len();
    let header = format!(
      "{length:04}{mid:04}{revision:03}         ",
      mid = self.mid,
      revision = self.revision,
    );
    let mut out = Vec::with_capacity(length + 1);
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(self.data.as_bytes());
    out.push(TERMINATOR);
    out
  }

  /// Parse one frame (without the NUL terminator).
  pub fn decode(frame: &[u8]) -> Result<MidFrame, ConnectionError> {
    let text = std::str::from_utf8(frame)
      .map_err(|_| ConnectionError::Protocol("MID frame is not ASCII".to_owned()))?;
    if !text.is_ascii() {
      return Err(ConnectionError::Protocol("MID frame is not ASCII".to_owned()));
    }
    if text.len() < HEADER_LEN {
      return Err(ConnectionError::Protocol(format!(
        "MID frame shorter than its header ({} chars)",
        text.len()
      )));
    }
    let declared: usize = text[0..4]
      .trim()
      .parse()
      .map_err(|_| ConnectionError::Protocol("bad MID length field".to_owned()))?;
    if declared != text.len() {
      return Err(ConnectionError::Protocol(format!(
        "MID length field {declared} does not match frame of {}",
        text.len()
      )));
    }
    let mid: u16 = text[4..8]
      .trim()
      .parse()
      .map_err(|_| ConnectionError::Protocol("bad MID number field".to_owned()))?;
    let revision: u16 = text[8..11].trim().parse().unwrap_or(1);
    Ok(MidFrame {
      mid,
      revision,
      data: text[HEADER_LEN..].to_owned(),
    })
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_round_trip() {
    let frame = MidFrame::new(MID_RESULT_ACK, 1, "");
    let wire = frame.encode();
    assert_eq!(wire.len(), HEADER_LEN + 1);
    assert_eq!(*wire.last().expect("terminator"), TERMINATOR);
    let decoded = MidFrame::decode(&wire[..wire.len() - 1]).expect("decodes");
    assert_eq!(decoded, frame);
  }

  #[test]
  fn test_comm_start_wire_form() {
    let wire = MidFrame::new(MID_COMM_START, 1, "").encode();
    assert_eq!(&wire[..11], b"00200001001");
  }

  #[test]
  fn test_data_field_round_trip() {
    let frame = MidFrame::new(MID_RESULT, 1, "020001030001");
    let wire = frame.encode();
    let decoded = MidFrame::decode(&wire[..wire.len() - 1]).expect("decodes");
    assert_eq!(decoded.data, "020001030001");
    assert_eq!(decoded.mid, MID_RESULT);
  }

  #[test]
  fn test_rejects_length_mismatch() {
    let mut wire = MidFrame::new(MID_COMM_START, 1, "").encode();
    wire.truncate(wire.len() - 1); // drop terminator
    wire.extend_from_slice(b"junk");
    assert!(MidFrame::decode(&wire).is_err());
  }
}
