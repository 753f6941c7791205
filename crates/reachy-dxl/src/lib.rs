//! Reachy DXL - Dynamixel protocols for actuator discovery
//!
//! Two framings share the same logical contract (ping an identifier, read back
//! a status packet):
//! - [`general`]: protocol 1.0, spoken by the arm actuators and the neck
//! - [`lightweight`]: protocol 2.0, spoken by the XL-320 antenna servos
//!
//! [`DxlBus`] drives either framing over any [`BusLink`], the production link
//! being a serial port opened through the `serialport` crate.

mod framing;

pub mod bus;
pub mod general;
pub mod lightweight;
pub mod transport;

pub use bus::DxlBus;
pub use transport::{open_serial, BusLink, LinkSettings};

use reachy_core::Protocol;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DxlError {
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("No status packet before timeout")]
    Timeout,
    #[error("No packet header found in {0} bytes")]
    NoHeader(usize),
    #[error("Malformed status packet: {0}")]
    Malformed(String),
    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    Checksum { expected: u16, actual: u16 },
    #[error("Status from id {actual}, expected id {expected}")]
    UnexpectedId { expected: u8, actual: u8 },
    #[error("Identifier {id} is outside the {protocol} protocol range")]
    InvalidId { id: u8, protocol: Protocol },
}

/// A decoded status packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    pub id: u8,
    /// Hardware error bitfield reported by the actuator
    pub error: u8,
    pub params: Vec<u8>,
}

/// Encode a ping instruction for `id` in the given framing
pub fn ping_packet(protocol: Protocol, id: u8) -> Result<Vec<u8>, DxlError> {
    match protocol {
        Protocol::General => general::ping(id),
        Protocol::Lightweight => lightweight::ping(id),
    }
}

/// Read one status packet in the given framing
pub fn read_status<R: std::io::Read>(
    protocol: Protocol,
    reader: &mut R,
) -> Result<StatusPacket, DxlError> {
    match protocol {
        Protocol::General => general::read_status(reader),
        Protocol::Lightweight => lightweight::read_status(reader),
    }
}
