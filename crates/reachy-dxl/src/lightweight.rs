//! Lightweight protocol (Dynamixel protocol 2.0, as spoken by XL-320 servos)
//!
//! Packet layout:
//! `FF FF FD 00 | id | len_l len_h | instruction | params.. | crc_l crc_h`
//! where `len = params + 3` counts stuffed bytes. Any `FF FF FD` run inside
//! the instruction and parameter fields is followed by an extra `FD`.

use std::io::Read;

use reachy_core::Protocol;

use crate::framing::{read_byte, read_exact, sync_to};
use crate::{DxlError, StatusPacket};

pub const HEADER: [u8; 4] = [0xFF, 0xFF, 0xFD, 0x00];
pub const BROADCAST_ID: u8 = 0xFE;
pub const MAX_ID: u8 = 0xFC;
pub const INST_PING: u8 = 0x01;
pub const INST_STATUS: u8 = 0x55;

const CRC_POLY: u16 = 0x8005;

/// CRC-16 with polynomial 0x8005, zero init, no reflection
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |mut crc, byte| {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC_POLY
            } else {
                crc << 1
            };
        }
        crc
    })
}

pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        out.push(byte);
        if out.len() >= 3 && out[out.len() - 3..] == [0xFF, 0xFF, 0xFD] {
            out.push(0xFD);
        }
    }
    out
}

pub fn unstuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        out.push(data[i]);
        if out.len() >= 3
            && out[out.len() - 3..] == [0xFF, 0xFF, 0xFD]
            && data.get(i + 1) == Some(&0xFD)
        {
            i += 1;
        }
        i += 1;
    }
    out
}

fn frame(id: u8, instruction: u8, fields: &[u8]) -> Result<Vec<u8>, DxlError> {
    let mut payload = vec![instruction];
    payload.extend_from_slice(fields);
    let payload = stuff(&payload);

    let length = u16::try_from(payload.len() + 2)
        .map_err(|_| DxlError::Malformed(format!("{} parameter bytes", fields.len())))?;
    let mut packet = Vec::with_capacity(payload.len() + 9);
    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.extend_from_slice(&length.to_le_bytes());
    packet.extend_from_slice(&payload);
    let crc = crc16(&packet);
    packet.extend_from_slice(&crc.to_le_bytes());
    Ok(packet)
}

pub fn instruction_packet(id: u8, instruction: u8, params: &[u8]) -> Result<Vec<u8>, DxlError> {
    if id > MAX_ID && id != BROADCAST_ID {
        return Err(DxlError::InvalidId { id, protocol: Protocol::Lightweight });
    }
    frame(id, instruction, params)
}

/// Status packet as a servo would send it
pub fn status_packet(id: u8, error: u8, params: &[u8]) -> Result<Vec<u8>, DxlError> {
    let mut fields = vec![error];
    fields.extend_from_slice(params);
    frame(id, INST_STATUS, &fields)
}

pub fn ping(id: u8) -> Result<Vec<u8>, DxlError> {
    instruction_packet(id, INST_PING, &[])
}

pub fn read_status<R: Read>(reader: &mut R) -> Result<StatusPacket, DxlError> {
    sync_to(reader, &HEADER)?;

    let id = read_byte(reader)?;
    let mut len_bytes = [0u8; 2];
    read_exact(reader, &mut len_bytes)?;
    let length = u16::from_le_bytes(len_bytes) as usize;
    // instruction + error + crc
    if length < 4 {
        return Err(DxlError::Malformed(format!("length {length}")));
    }

    let mut body = vec![0u8; length];
    read_exact(reader, &mut body)?;

    let (payload, crc_bytes) = body.split_at(length - 2);
    let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);

    let mut covered = Vec::with_capacity(HEADER.len() + 3 + payload.len());
    covered.extend_from_slice(&HEADER);
    covered.push(id);
    covered.extend_from_slice(&len_bytes);
    covered.extend_from_slice(payload);
    let expected = crc16(&covered);
    if expected != received {
        return Err(DxlError::Checksum { expected, actual: received });
    }

    let payload = unstuff(payload);
    if payload[0] != INST_STATUS {
        return Err(DxlError::Malformed(format!(
            "instruction {:#04x} in status packet",
            payload[0]
        )));
    }

    Ok(StatusPacket {
        id,
        error: payload[1],
        params: payload[2..].to_vec(),
    })
}
