//! General protocol (Dynamixel protocol 1.0)
//!
//! Packet layout: `FF FF | id | length | instruction-or-error | params.. | checksum`
//! where `length = params + 2` and the checksum is the inverted low byte of
//! the sum of every byte after the header.

use std::io::Read;

use reachy_core::Protocol;

use crate::framing::{read_byte, read_exact, sync_to};
use crate::{DxlError, StatusPacket};

pub const HEADER: [u8; 2] = [0xFF, 0xFF];
pub const BROADCAST_ID: u8 = 0xFE;
pub const MAX_ID: u8 = 0xFD;
pub const INST_PING: u8 = 0x01;

pub fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn frame(id: u8, code: u8, params: &[u8]) -> Result<Vec<u8>, DxlError> {
    let length = u8::try_from(params.len() + 2)
        .map_err(|_| DxlError::Malformed(format!("{} parameter bytes", params.len())))?;
    let mut packet = Vec::with_capacity(params.len() + 6);
    packet.extend_from_slice(&HEADER);
    packet.extend_from_slice(&[id, length, code]);
    packet.extend_from_slice(params);
    let sum = checksum(&packet[HEADER.len()..]);
    packet.push(sum);
    Ok(packet)
}

pub fn instruction_packet(id: u8, instruction: u8, params: &[u8]) -> Result<Vec<u8>, DxlError> {
    if id > MAX_ID && id != BROADCAST_ID {
        return Err(DxlError::InvalidId { id, protocol: Protocol::General });
    }
    frame(id, instruction, params)
}

/// Status packet as an actuator would send it
pub fn status_packet(id: u8, error: u8, params: &[u8]) -> Result<Vec<u8>, DxlError> {
    frame(id, error, params)
}

pub fn ping(id: u8) -> Result<Vec<u8>, DxlError> {
    instruction_packet(id, INST_PING, &[])
}

pub fn read_status<R: Read>(reader: &mut R) -> Result<StatusPacket, DxlError> {
    sync_to(reader, &HEADER)?;

    // Extra 0xFF bytes are padding, never a valid id
    let mut id = read_byte(reader)?;
    let mut padding = 0;
    while id == 0xFF {
        padding += 1;
        if padding > HEADER.len() {
            return Err(DxlError::Malformed("header padding".to_string()));
        }
        id = read_byte(reader)?;
    }

    let length = read_byte(reader)?;
    if length < 2 {
        return Err(DxlError::Malformed(format!("length {length}")));
    }

    let mut body = vec![0u8; length as usize];
    read_exact(reader, &mut body)?;
    let received = body[body.len() - 1];

    let mut summed = Vec::with_capacity(body.len() + 1);
    summed.extend_from_slice(&[id, length]);
    summed.extend_from_slice(&body[..body.len() - 1]);
    let expected = checksum(&summed);
    if expected != received {
        return Err(DxlError::Checksum {
            expected: expected as u16,
            actual: received as u16,
        });
    }

    Ok(StatusPacket {
        id,
        error: body[0],
        params: body[1..body.len() - 1].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_packet_bytes() {
        assert_eq!(ping(1).unwrap(), vec![0xFF, 0xFF, 0x01, 0x02, 0x01, 0xFB]);
        assert_eq!(ping(17).unwrap(), vec![0xFF, 0xFF, 0x11, 0x02, 0x01, 0xEB]);
    }

    #[test]
    fn test_reserved_id_rejected() {
        assert!(matches!(ping(0xFF), Err(DxlError::InvalidId { id: 0xFF, .. })));
        assert!(ping(BROADCAST_ID).is_ok());
    }

    #[test]
    fn test_read_status_of_silent_ping_answer() {
        let data = [0xFF, 0xFF, 0x0A, 0x02, 0x00, 0xF3];
        let status = read_status(&mut &data[..]).unwrap();
        assert_eq!(status, StatusPacket { id: 10, error: 0, params: Vec::new() });
    }

    #[test]
    fn test_read_status_skips_padding_byte() {
        let data = [0xFF, 0xFF, 0xFF, 0x0A, 0x02, 0x00, 0xF3];
        assert_eq!(read_status(&mut &data[..]).unwrap().id, 10);
    }

    #[test]
    fn test_read_status_rejects_bad_checksum() {
        let data = [0xFF, 0xFF, 0x0A, 0x02, 0x00, 0x00];
        assert!(matches!(
            read_status(&mut &data[..]),
            Err(DxlError::Checksum { expected: 0xF3, actual: 0 })
        ));
    }

    #[test]
    fn test_truncated_status_is_timeout() {
        let data = [0xFF, 0xFF, 0x0A, 0x04, 0x00];
        assert!(matches!(read_status(&mut &data[..]), Err(DxlError::Timeout)));
    }
}
