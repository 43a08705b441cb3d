// Edgelink Rust Source Code File - See README.md for more info.
//
// Copyright 2024-2026 Edgelink Industrial Systems. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Minimal S7comm client over ISO-on-TCP.
//!
//! Enough of the protocol for an edge translator: COTP connect with the
//! rack/slot TSAP, setup communication, and single-item read/write var
//! against DB, I, Q and M areas.

use byteorder::{BigEndian, ByteOrder};
use tokio::{
  io::{AsyncReadExt, AsyncWriteExt},
  net::TcpStream,
};

use edgelink_core::errors::ConnectionError;

use crate::address::{S7Address, S7Type};

const TPKT_HEADER_LEN: usize = 4;
const COTP_DATA_HEADER: [u8; 3] = [0x02, 0xF0, 0x80];
const S7_PROTOCOL_ID: u8 = 0x32;
const JOB: u8 = 0x01;
const ACK_DATA: u8 = 0x03;
const FN_SETUP: u8 = 0xF0;
const FN_READ: u8 = 0x04;
const FN_WRITE: u8 = 0x05;
const RETURN_OK: u8 = 0xFF;
const MAX_PDU: u16 = 960;

pub struct S7Client {
  stream: TcpStream,
  pdu_ref: u16,
}

impl S7Client {
  /// TCP connect, COTP connection request with the rack/slot TSAP, then
  /// S7 setup communication.
  pub async fn connect(
    host: &str,
    port: u16,
    rack: u16,
    slot: u16,
  ) -> Result<S7Client, ConnectionError> {
    let stream = TcpStream::connect((host, port))
      .await
      .map_err(|e| ConnectionError::Transport(e.to_string()))?;
    let mut client = S7Client { stream, pdu_ref: 0 };

    let remote_tsap = [0x01, ((rack << 5) | slot) as u8];
    let cotp_connect: Vec<u8> = vec![
      0x11, 0xE0, 0x00, 0x00, 0x00, 0x01, 0x00, // CR, dst/src ref, class 0
      0xC0, 0x01, 0x0A, // TPDU size 1024
      0xC1, 0x02, 0x01, 0x00, // src TSAP
      0xC2, 0x02, remote_tsap[0], remote_tsap[1], // dst TSAP
    ];
    client.send_tpkt(&cotp_connect).await?;
    let reply = client.recv_tpkt().await?;
    if reply.get(1) != Some(&0xD0) {
      return Err(ConnectionError::Protocol(
        "PLC refused the COTP connection".to_owned(),
      ));
    }

    let mut setup = Vec::new();
    setup.extend_from_slice(&[FN_SETUP, 0x00, 0x00, 0x01, 0x00, 0x01]);
    let mut pdu = [0u8; 2];
    BigEndian::write_u16(&mut pdu, MAX_PDU);
    setup.extend_from_slice(&pdu);
    client.request(JOB, &setup, &[]).await?;
    debug!("s7 session to {host}:{port} rack {rack} slot {slot} established");
    Ok(client)
  }

  /// Read one item; returns the raw payload bytes.
  pub async fn read(&mut self, address: &S7Address) -> Result<Vec<u8>, ConnectionError> {
    let params = Self::var_params(FN_READ, address, address.kind.width());
    let response = self.request(JOB, &params, &[]).await?;
    // Response data: return code, transport size, bit length, payload.
    if response.data.len() < 4 || response.data[0] != RETURN_OK {
      return Err(ConnectionError::Protocol(format!(
        "read of {address:?} rejected (return code {:#04x})",
        response.data.first().copied().unwrap_or(0)
      )));
    }
    let bit_len = BigEndian::read_u16(&response.data[2..4]) as usize;
    // Transport size 0x04 counts bits, 0x09 counts bytes.
    let byte_len = match response.data[1] {
      0x03 | 0x04 | 0x05 => bit_len.div_ceil(8),
      _ => bit_len,
    };
    let payload = response
      .data
      .get(4..4 + byte_len)
      .ok_or_else(|| ConnectionError::Protocol("short read payload".to_owned()))?;
    Ok(payload.to_vec())
  }

  /// Write one item.
  pub async fn write(
    &mut self,
    address: &S7Address,
    payload: &[u8],
  ) -> Result<(), ConnectionError> {
    let params = Self::var_params(FN_WRITE, address, payload.len() as u16);
    let mut data = Vec::with_capacity(4 + payload.len());
    data.push(0x00);
    // Data transport size: BIT for single bits, bit-counted bytes
    // otherwise.
    let (transport, length) = if address.kind == S7Type::Bit {
      (0x03u8, 1u16)
    } else {
      (0x04u8, (payload.len() * 8) as u16)
    };
    data.push(transport);
    let mut bits = [0u8; 2];
    BigEndian::write_u16(&mut bits, length);
    data.extend_from_slice(&bits);
    data.extend_from_slice(payload);
    let response = self.request(JOB, &params, &data).await?;
    if response.data.first() != Some(&RETURN_OK) {
      return Err(ConnectionError::Protocol(format!(
        "write of {address:?} rejected (return code {:#04x})",
        response.data.first().copied().unwrap_or(0)
      )));
    }
    Ok(())
  }

  /// Read/write var parameter block with a single item specification.
  /// Bits go out with BIT transport so the start address keeps its bit
  /// offset; everything else is byte-granular.
  fn var_params(function: u8, address: &S7Address, byte_count: u16) -> Vec<u8> {
    let transport = if address.kind == S7Type::Bit { 0x01 } else { 0x02 };
    let mut params = Vec::with_capacity(14);
    params.push(function);
    params.push(0x01); // item count
    params.extend_from_slice(&[0x12, 0x0A, 0x10, transport]);
    let mut count = [0u8; 2];
    BigEndian::write_u16(&mut count, byte_count);
    params.extend_from_slice(&count);
    let mut db = [0u8; 2];
    BigEndian::write_u16(&mut db, address.db);
    params.extend_from_slice(&db);
    params.push(address.area.code());
    let bit_address = address.byte * 8 + address.bit as u32;
    params.push((bit_address >> 16) as u8);
    params.push((bit_address >> 8) as u8);
    params.push(bit_address as u8);
    params
  }

  async fn request(
    &mut self,
    message_type: u8,
    params: &[u8],
    data: &[u8],
  ) -> Result<S7Response, ConnectionError> {
    self.pdu_ref = self.pdu_ref.wrapping_add(1);
    let mut frame = Vec::with_capacity(10 + params.len() + data.len());
    frame.push(S7_PROTOCOL_ID);
    frame.push(message_type);
    frame.extend_from_slice(&[0x00, 0x00]); // reserved
    let mut word = [0u8; 2];
    BigEndian::write_u16(&mut word, self.pdu_ref);
    frame.extend_from_slice(&word);
    BigEndian::write_u16(&mut word, params.len() as u16);
    frame.extend_from_slice(&word);
    BigEndian::write_u16(&mut word, data.len() as u16);
    frame.extend_from_slice(&word);
    frame.extend_from_slice(params);
    frame.extend_from_slice(data);

    let mut packet = Vec::with_capacity(COTP_DATA_HEADER.len() + frame.len());
    packet.extend_from_slice(&COTP_DATA_HEADER);
    packet.extend_from_slice(&frame);
    self.send_tpkt(&packet).await?;

    let reply = self.recv_tpkt().await?;
    Self::parse_s7(&reply)
  }

  fn parse_s7(packet: &[u8]) -> Result<S7Response, ConnectionError> {
    // Skip the COTP data header (length, DT code, TPDU number).
    let cotp_len = *packet
      .first()
      .ok_or_else(|| ConnectionError::Protocol("empty reply".to_owned()))? as usize
      + 1;
    let s7 = packet
      .get(cotp_len..)
      .ok_or_else(|| ConnectionError::Protocol("truncated COTP reply".to_owned()))?;
    if s7.first() != Some(&S7_PROTOCOL_ID) {
      return Err(ConnectionError::Protocol("not an S7 frame".to_owned()));
    }
    let message_type = s7[1];
    let header_len = if message_type == ACK_DATA { 12 } else { 10 };
    if s7.len() < header_len {
      return Err(ConnectionError::Protocol("short S7 header".to_owned()));
    }
    if message_type == ACK_DATA {
      let error_class = s7[10];
      let error_code = s7[11];
      if error_class != 0 || error_code != 0 {
        return Err(ConnectionError::Protocol(format!(
          "PLC error class {error_class:#04x} code {error_code:#04x}"
        )));
      }
    }
    let param_len = BigEndian::read_u16(&s7[6..8]) as usize;
    let data_len = BigEndian::read_u16(&s7[8..10]) as usize;
    let params_start = header_len;
    let data_start = params_start + param_len;
    let params = s7
      .get(params_start..data_start)
      .ok_or_else(|| ConnectionError::Protocol("truncated S7 params".to_owned()))?
      .to_vec();
    let data = s7
      .get(data_start..data_start + data_len)
      .ok_or_else(|| ConnectionError::Protocol("truncated S7 data".to_owned()))?
      .to_vec();
    Ok(S7Response {
      params,
      data,
    })
  }

  /// Wrap one COTP TPDU (which carries its own length octet first) in a
  /// TPKT header and send it.
  async fn send_tpkt(&mut self, payload: &[u8]) -> Result<(), ConnectionError> {
    let mut packet = Vec::with_capacity(TPKT_HEADER_LEN + payload.len());
    packet.push(0x03);
    packet.push(0x00);
    let mut len = [0u8; 2];
    BigEndian::write_u16(&mut len, (TPKT_HEADER_LEN + payload.len()) as u16);
    packet.extend_from_slice(&len);
    packet.extend_from_slice(payload);
    self
      .stream
      .write_all(&packet)
      .await
      .map_err(|e| ConnectionError::Transport(e.to_string()))
  }

  async fn recv_tpkt(&mut self) -> Result<Vec<u8>, ConnectionError> {
    let mut header = [0u8; TPKT_HEADER_LEN];
    self
      .stream
      .read_exact(&mut header)
      .await
      .map_err(|e| ConnectionError::Transport(e.to_string()))?;
    if header[0] != 0x03 {
      return Err(ConnectionError::Protocol("bad TPKT version".to_owned()));
    }
    let total = BigEndian::read_u16(&header[2..4]) as usize;
    let body_len = total
      .checked_sub(TPKT_HEADER_LEN)
      .ok_or_else(|| ConnectionError::Protocol("bad TPKT length".to_owned()))?;
    let mut body = vec![0u8; body_len];
    self
      .stream
      .read_exact(&mut body)
      .await
      .map_err(|e| ConnectionError::Transport(e.to_string()))?;
    Ok(body)
  }
}

struct S7Response {
  #[allow(dead_code)]
  params: Vec<u8>,
  data: Vec<u8>,
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::address::S7Address;

  #[test]
  fn test_read_var_item_specification() {
    let address = S7Address::parse("DB1,X0.3").expect("parses");
    let params = S7Client::var_params(FN_READ, &address, 1);
    assert_eq!(params[0], FN_READ);
    assert_eq!(params[1], 1, "single item");
    assert_eq!(params[8..10], [0x00, 0x01], "db number");
    assert_eq!(params[10], 0x84, "DB area code");
    // Bit address 0*8+3.
    assert_eq!(params[11..14], [0x00, 0x00, 0x03]);
  }

  #[test]
  fn test_write_var_item_specification_for_flags() {
    let address = S7Address::parse("MW2").expect("parses");
    let params = S7Client::var_params(FN_WRITE, &address, 2);
    assert_eq!(params[0], FN_WRITE);
    assert_eq!(params[10], 0x83, "flag area code");
    // Bit address 2*8.
    assert_eq!(params[11..14], [0x00, 0x00, 0x10]);
  }
}
