// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! node-7 style S7 address grammar.
//!
//! `DB<n>,<TYPE><byte>[.<bit>]` for data blocks (`DB1,X0.0`, `DB5,REAL4`,
//! `DB2,INT2`), and `<AREA>[<SIZE>]<byte>[.<bit>]` for process inputs,
//! outputs and flags (`I0.1`, `IW2`, `QB0`, `MD4`).

use byteorder::{BigEndian, ByteOrder};

use edgelink_core::{errors::ConnectionError, metric::MetricValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7Area {
  DataBlock,
  Input,
  Output,
  Flag,
}

impl S7Area {
  /// S7comm area code.
  pub fn code(&self) -> u8 {
    match self {
      S7Area::DataBlock => 0x84,
      S7Area::Input => 0x81,
      S7Area::Output => 0x82,
      S7Area::Flag => 0x83,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7Type {
  Bit,
  Byte,
  Char,
  Int,
  DInt,
  Word,
  DWord,
  Real,
}

impl S7Type {
  pub fn width(&self) -> u16 {
    match self {
      S7Type::Bit | S7Type::Byte | S7Type::Char => 1,
      S7Type::Int | S7Type::Word => 2,
      S7Type::DInt | S7Type::DWord | S7Type::Real => 4,
    }
  }

  fn from_db_token(token: &str) -> Option<S7Type> {
    Some(match token {
      "X" => S7Type::Bit,
      "B" | "BYTE" => S7Type::Byte,
      "C" | "CHAR" => S7Type::Char,
      "I" | "INT" => S7Type::Int,
      "DI" | "DINT" => S7Type::DInt,
      "W" | "WORD" => S7Type::Word,
      "DW" | "DWORD" => S7Type::DWord,
      "R" | "REAL" => S7Type::Real,
      _ => return None,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S7Address {
  pub area: S7Area,
  pub db: u16,
  pub kind: S7Type,
  pub byte: u32,
  pub bit: u8,
}

impl S7Address {
  /// Parse a node-7 address string.
  pub fn parse(address: &str) -> Result<S7Address, ConnectionError> {
    let invalid = |why: &str| ConnectionError::InvalidAddress(address.to_owned(), why.to_owned());
    let trimmed = address.trim();
    if let Some(rest) = trimmed.strip_prefix("DB") {
      let (db_str, item) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing ',' after the DB number"))?;
      let db: u16 = db_str.trim().parse().map_err(|_| invalid("bad DB number"))?;
      let split = item
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| invalid("missing byte offset"))?;
      let (type_token, offset) = item.split_at(split);
      let kind = S7Type::from_db_token(type_token.trim())
        .ok_or_else(|| invalid("unknown DB item type"))?;
      let (byte, bit) = parse_offset(offset).ok_or_else(|| invalid("bad byte offset"))?;
      if kind == S7Type::Bit && bit > 7 {
        return Err(invalid("bit offset out of range"));
      }
      return Ok(S7Address {
        area: S7Area::DataBlock,
        db,
        kind,
        byte,
        bit,
      });
    }

    let mut chars = trimmed.chars();
    let area = match chars.next() {
      Some('I') | Some('E') => S7Area::Input,
      Some('Q') | Some('A') => S7Area::Output,
      Some('M') => S7Area::Flag,
      _ => return Err(invalid("unknown area")),
    };
    let rest = chars.as_str();
    let (kind, offset) = match rest.chars().next() {
      Some('B') => (S7Type::Byte, &rest[1..]),
      Some('W') => (S7Type::Word, &rest[1..]),
      Some('D') => (S7Type::DWord, &rest[1..]),
      Some(c) if c.is_ascii_digit() => (S7Type::Bit, rest),
      _ => return Err(invalid("unknown size marker")),
    };
    let (byte, bit) = parse_offset(offset).ok_or_else(|| invalid("bad byte offset"))?;
    if kind == S7Type::Bit && bit > 7 {
      return Err(invalid("bit offset out of range"));
    }
    Ok(S7Address {
      area,
      db: 0,
      kind,
      byte,
      bit,
    })
  }

  /// Decode the on-wire bytes for this item into a native value.
  pub fn decode(&self, data: &[u8]) -> Option<MetricValue> {
    if data.len() < self.kind.width() as usize {
      return None;
    }
    Some(match self.kind {
      S7Type::Bit => MetricValue::Boolean(data[0] & 1 == 1),
      S7Type::Byte => MetricValue::UInt8(data[0]),
      S7Type::Char => MetricValue::String((data[0] as char).to_string()),
      S7Type::Int => MetricValue::Int16(BigEndian::read_i16(data)),
      S7Type::Word => MetricValue::UInt16(BigEndian::read_u16(data)),
      S7Type::DInt => MetricValue::Int32(BigEndian::read_i32(data)),
      S7Type::DWord => MetricValue::UInt32(BigEndian::read_u32(data)),
      S7Type::Real => MetricValue::Float(BigEndian::read_f32(data)),
    })
  }

  /// Encode a native value into the on-wire bytes for this item.
  pub fn encode(&self, value: &MetricValue) -> Option<Vec<u8>> {
    let mut out = vec![0u8; self.kind.width() as usize];
    match (self.kind, value) {
      (S7Type::Bit, MetricValue::Boolean(b)) => out[0] = *b as u8,
      (S7Type::Byte, MetricValue::UInt8(v)) => out[0] = *v,
      (S7Type::Char, MetricValue::String(s)) => out[0] = *s.as_bytes().first()?,
      (S7Type::Int, MetricValue::Int16(v)) => BigEndian::write_i16(&mut out, *v),
      (S7Type::Word, MetricValue::UInt16(v)) => BigEndian::write_u16(&mut out, *v),
      (S7Type::DInt, MetricValue::Int32(v)) => BigEndian::write_i32(&mut out, *v),
      (S7Type::DWord, MetricValue::UInt32(v)) => BigEndian::write_u32(&mut out, *v),
      (S7Type::Real, MetricValue::Float(v)) => BigEndian::write_f32(&mut out, *v),
      _ => return None,
    }
    Some(out)
  }
}

fn parse_offset(offset: &str) -> Option<(u32, u8)> {
  let trimmed = offset.trim();
  match trimmed.split_once('.') {
    Some((byte, bit)) => Some((byte.parse().ok()?, bit.parse().ok()?)),
    None => Some((trimmed.parse().ok()?, 0)),
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_db_bit_address() {
    let parsed = S7Address::parse("DB1,X0.3").expect("parses");
    assert_eq!(
      parsed,
      S7Address {
        area: S7Area::DataBlock,
        db: 1,
        kind: S7Type::Bit,
        byte: 0,
        bit: 3,
      }
    );
  }

  #[test]
  fn test_db_typed_addresses() {
    assert_eq!(
      S7Address::parse("DB5,REAL4").expect("parses").kind,
      S7Type::Real
    );
    assert_eq!(
      S7Address::parse("DB2,INT2").expect("parses").byte,
      2
    );
    assert_eq!(
      S7Address::parse("DB10,DWORD0").expect("parses").kind,
      S7Type::DWord
    );
  }

  #[test]
  fn test_process_area_addresses() {
    let input_bit = S7Address::parse("I0.1").expect("parses");
    assert_eq!(input_bit.area, S7Area::Input);
    assert_eq!(input_bit.kind, S7Type::Bit);
    assert_eq!(input_bit.bit, 1);

    let flag_dword = S7Address::parse("MD4").expect("parses");
    assert_eq!(flag_dword.area, S7Area::Flag);
    assert_eq!(flag_dword.kind, S7Type::DWord);
    assert_eq!(flag_dword.byte, 4);

    let output_byte = S7Address::parse("QB0").expect("parses");
    assert_eq!(output_byte.area, S7Area::Output);
    assert_eq!(output_byte.kind, S7Type::Byte);
  }

  #[test]
  fn test_rejects_malformed_addresses() {
    assert!(S7Address::parse("DB1").is_err());
    assert!(S7Address::parse("DB1,Z0").is_err());
    assert!(S7Address::parse("DB1,X0.9").is_err());
    assert!(S7Address::parse("T5").is_err());
  }

  #[test]
  fn test_decode_encode_round_trip() {
    let real = S7Address::parse("DB5,REAL4").expect("parses");
    let encoded = real.encode(&MetricValue::Float(23.5)).expect("encodes");
    assert_eq!(real.decode(&encoded), Some(MetricValue::Float(23.5)));

    let word = S7Address::parse("MW2").expect("parses");
    let encoded = word.encode(&MetricValue::UInt16(1234)).expect("encodes");
    assert_eq!(word.decode(&encoded), Some(MetricValue::UInt16(1234)));
  }
}
