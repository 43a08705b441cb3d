// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Fixed binary buffer codec.
//!
//! A metric's `path` is its byte offset inside the buffer (`byte.bit` for
//! booleans); `endianness` selects the byte order. PDP ("middle-endian")
//! is realised exactly as the legacy devices produce it: swap the bytes
//! of every 16-bit word, then read little-endian, which lands on the
//! 3-4-1-2 order.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{
  errors::CodecError,
  metric::{DataType, Endianness, Metric, MetricValue},
};

/// Byte offset plus optional bit offset parsed out of a metric path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct BufferOffset {
  pub byte: usize,
  pub bit: u8,
}

pub(super) fn parse_offset(path: &str) -> Result<BufferOffset, CodecError> {
  let invalid = || CodecError::InvalidPath(path.to_owned());
  match path.split_once('.') {
    Some((byte, bit)) => {
      let byte = byte.trim().parse::<usize>().map_err(|_| invalid())?;
      let bit = bit.trim().parse::<u8>().map_err(|_| invalid())?;
      if bit > 7 {
        return Err(invalid());
      }
      Ok(BufferOffset { byte, bit })
    }
    None => {
      let byte = path.trim().parse::<usize>().map_err(|_| invalid())?;
      Ok(BufferOffset { byte, bit: 0 })
    }
  }
}

fn swap16(buf: &[u8]) -> Vec<u8> {
  let mut out = buf.to_vec();
  for pair in out.chunks_exact_mut(2) {
    pair.swap(0, 1);
  }
  out
}

fn checked_slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], CodecError> {
  buf
    .get(offset..offset + len)
    .ok_or(CodecError::BufferOutOfRange(len, offset, buf.len()))
}

macro_rules! read_int {
  ($buf:expr, $endianness:expr, $read:ident) => {
    match $endianness {
      Endianness::Big => BigEndian::$read($buf),
      Endianness::Little => LittleEndian::$read($buf),
      Endianness::Pdp => LittleEndian::$read(&swap16($buf)),
    }
  };
}

pub fn parse(buf: &[u8], metric: &Metric) -> Result<Option<MetricValue>, CodecError> {
  let path = metric.properties().path().clone().unwrap_or_default();
  let offset = parse_offset(&path)?;
  let endianness = metric.properties().endianness();
  let data_type = metric.data_type();
  let value = match data_type {
    DataType::Boolean => {
      let byte = checked_slice(buf, offset.byte, 1)?[0];
      MetricValue::Boolean((byte >> offset.bit) & 1 == 1)
    }
    DataType::Int8 => MetricValue::Int8(checked_slice(buf, offset.byte, 1)?[0] as i8),
    DataType::UInt8 => MetricValue::UInt8(checked_slice(buf, offset.byte, 1)?[0]),
    DataType::Int16 => {
      let b = checked_slice(buf, offset.byte, 2)?;
      MetricValue::Int16(read_int!(b, endianness, read_i16))
    }
    DataType::UInt16 => {
      let b = checked_slice(buf, offset.byte, 2)?;
      MetricValue::UInt16(read_int!(b, endianness, read_u16))
    }
    DataType::Int32 => {
      let b = checked_slice(buf, offset.byte, 4)?;
      MetricValue::Int32(read_int!(b, endianness, read_i32))
    }
    DataType::UInt32 => {
      let b = checked_slice(buf, offset.byte, 4)?;
      MetricValue::UInt32(read_int!(b, endianness, read_u32))
    }
    DataType::Int64 => {
      let b = checked_slice(buf, offset.byte, 8)?;
      MetricValue::Int64(read_int!(b, endianness, read_i64))
    }
    DataType::UInt64 => {
      let b = checked_slice(buf, offset.byte, 8)?;
      MetricValue::UInt64(read_int!(b, endianness, read_u64))
    }
    DataType::DateTime => {
      let b = checked_slice(buf, offset.byte, 8)?;
      MetricValue::DateTime(read_int!(b, endianness, read_u64))
    }
    DataType::Float => {
      let b = checked_slice(buf, offset.byte, 4)?;
      MetricValue::Float(read_int!(b, endianness, read_f32))
    }
    DataType::Double => {
      let b = checked_slice(buf, offset.byte, 8)?;
      MetricValue::Double(read_int!(b, endianness, read_f64))
    }
    DataType::String | DataType::Text => {
      let tail = buf
        .get(offset.byte..)
        .ok_or(CodecError::BufferOutOfRange(1, offset.byte, buf.len()))?;
      let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
      MetricValue::String(String::from_utf8_lossy(&tail[..end]).into_owned())
    }
    other => {
      return Err(CodecError::UnsupportedType(
        other.to_string(),
        "fixedBuffer".to_owned(),
      ));
    }
  };
  Ok(Some(value))
}

macro_rules! write_int {
  ($buf:expr, $endianness:expr, $write:ident, $value:expr) => {
    match $endianness {
      Endianness::Big => BigEndian::$write($buf, $value),
      // PDP fields are written little-endian; the caller applies one
      // trailing word swap over the whole frame.
      Endianness::Little | Endianness::Pdp => LittleEndian::$write($buf, $value),
    }
  };
}

/// Assemble one binary frame from every metric's (offset, endianness,
/// value). Returns the frame, padded to even length when a trailing PDP
/// word swap is required.
pub fn encode(metrics: &[Metric]) -> Result<Vec<u8>, CodecError> {
  let mut size = 0usize;
  let mut any_pdp = false;
  for metric in metrics {
    let path = metric.properties().path().clone().unwrap_or_default();
    let offset = parse_offset(&path)?;
    let width = match metric.data_type() {
      DataType::String | DataType::Text => match metric.value() {
        Some(MetricValue::String(s)) => s.len(),
        _ => 0,
      },
      other => other.buffer_size().ok_or(CodecError::UnsupportedType(
        other.to_string(),
        "fixedBuffer".to_owned(),
      ))?,
    };
    size = size.max(offset.byte + width);
    any_pdp |= metric.properties().endianness() == Endianness::Pdp;
  }
  if any_pdp && size % 2 == 1 {
    size += 1;
  }

  let mut frame = vec![0u8; size];
  for metric in metrics {
    let Some(value) = metric.value() else {
      continue;
    };
    let path = metric.properties().path().clone().unwrap_or_default();
    let offset = parse_offset(&path)?;
    let endianness = metric.properties().endianness();
    match value {
      MetricValue::Boolean(b) => {
        if *b {
          frame[offset.byte] |= 1 << offset.bit;
        }
      }
      MetricValue::Int8(v) => frame[offset.byte] = *v as u8,
      MetricValue::UInt8(v) => frame[offset.byte] = *v,
      MetricValue::Int16(v) => {
        write_int!(&mut frame[offset.byte..offset.byte + 2], endianness, write_i16, *v)
      }
      MetricValue::UInt16(v) => {
        write_int!(&mut frame[offset.byte..offset.byte + 2], endianness, write_u16, *v)
      }
      MetricValue::Int32(v) => {
        write_int!(&mut frame[offset.byte..offset.byte + 4], endianness, write_i32, *v)
      }
      MetricValue::UInt32(v) => {
        write_int!(&mut frame[offset.byte..offset.byte + 4], endianness, write_u32, *v)
      }
      MetricValue::Int64(v) => {
        write_int!(&mut frame[offset.byte..offset.byte + 8], endianness, write_i64, *v)
      }
      MetricValue::UInt64(v) => {
        write_int!(&mut frame[offset.byte..offset.byte + 8], endianness, write_u64, *v)
      }
      MetricValue::DateTime(v) => {
        write_int!(&mut frame[offset.byte..offset.byte + 8], endianness, write_u64, *v)
      }
      MetricValue::Float(v) => {
        write_int!(&mut frame[offset.byte..offset.byte + 4], endianness, write_f32, *v)
      }
      MetricValue::Double(v) => {
        write_int!(&mut frame[offset.byte..offset.byte + 8], endianness, write_f64, *v)
      }
      MetricValue::String(s) => {
        frame[offset.byte..offset.byte + s.len()].copy_from_slice(s.as_bytes());
      }
      other => {
        return Err(CodecError::UnsupportedType(
          other.data_type().to_string(),
          "fixedBuffer".to_owned(),
        ));
      }
    }
  }

  if any_pdp {
    frame = swap16(&frame);
  }
  Ok(frame)
}
