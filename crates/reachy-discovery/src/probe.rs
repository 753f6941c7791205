//! Bus probing contract and the serial implementation

use reachy_core::{MotorId, Protocol};
use reachy_dxl::{DxlBus, DxlError, LinkSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus device could not be opened (board unplugged, udev rule not applied, port busy)
    #[error("Port {port} unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },
}

/// Scans one physical bus segment for answering identifiers
///
/// Each call owns the channel for its whole duration: it opens the bus,
/// scans, and closes it again before returning, whatever the outcome.
pub trait BusProbe {
    /// Return the subset of `window` that acknowledged on `bus`
    fn scan(
        &mut self,
        bus: &str,
        protocol: Protocol,
        window: &BTreeSet<MotorId>,
    ) -> Result<BTreeSet<MotorId>, BusError>;
}

/// Serial parameters per protocol
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default)]
    pub general: LinkSettings,
    #[serde(default)]
    pub lightweight: LinkSettings,
}

impl ProbeSettings {
    pub fn for_protocol(&self, protocol: Protocol) -> &LinkSettings {
        match protocol {
            Protocol::General => &self.general,
            Protocol::Lightweight => &self.lightweight,
        }
    }
}

/// Probe backed by real serial ports
#[derive(Debug, Clone, Default)]
pub struct SerialBusProbe {
    settings: ProbeSettings,
}

impl SerialBusProbe {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }
}

impl BusProbe for SerialBusProbe {
    fn scan(
        &mut self,
        bus: &str,
        protocol: Protocol,
        window: &BTreeSet<MotorId>,
    ) -> Result<BTreeSet<MotorId>, BusError> {
        let settings = self.settings.for_protocol(protocol);
        let mut dxl = DxlBus::open(bus, protocol, settings).map_err(|e| {
            let reason = match e {
                DxlError::Open { source, .. } => source.to_string(),
                other => other.to_string(),
            };
            BusError::PortUnavailable {
                port: bus.to_string(),
                reason,
            }
        })?;

        debug!(port = %bus, protocol = %protocol, ids = window.len(), "Scanning bus");
        let found = dxl
            .scan(window.iter().copied())
            .into_iter()
            .filter(|id| window.contains(id))
            .collect();
        Ok(found)
    }
}
