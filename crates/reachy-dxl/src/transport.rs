//! Byte links carrying Dynamixel packets

use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;

use crate::DxlError;

/// A half-duplex byte link to an actuator bus
pub trait BusLink: Read + Write {
    /// Drop any bytes already received, so a reply is never matched to a
    /// previous request
    fn discard_input(&mut self) -> io::Result<()>;
}

impl BusLink for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Serial parameters for one protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSettings {
    pub baud_rate: u32,
    /// Per-ping read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: 1_000_000,
            timeout_ms: 50,
        }
    }
}

impl LinkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Open a serial port for exclusive use
pub fn open_serial(port: &str, settings: &LinkSettings) -> Result<Box<dyn SerialPort>, DxlError> {
    let link = serialport::new(port, settings.baud_rate)
        .timeout(settings.timeout())
        .open()
        .map_err(|source| DxlError::Open {
            port: port.to_string(),
            source,
        })?;
    debug!(port = %port, baud = settings.baud_rate, "Serial port opened");
    Ok(link)
}
