//! Scripted bus for running discovery without hardware

use reachy_core::{MotorId, Protocol};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::probe::{BusError, BusProbe};

/// Channel lifecycle recorded by [`SimulatedBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Opened { port: String, protocol: Protocol },
    Closed { port: String, protocol: Protocol },
}

#[derive(Debug, Clone, Default)]
struct SimulatedPort {
    general: BTreeSet<MotorId>,
    lightweight: BTreeSet<MotorId>,
}

/// A set of buses with fixed answering identifiers
///
/// Ports that were never declared behave like an unplugged board.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    ports: HashMap<String, SimulatedPort>,
    failing: HashSet<(String, Protocol)>,
    events: Vec<BusEvent>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `port` as plugged, with `ids` answering in `protocol`
    pub fn with_port<I>(mut self, port: &str, protocol: Protocol, ids: I) -> Self
    where
        I: IntoIterator<Item = u8>,
    {
        let entry = self.ports.entry(port.to_string()).or_default();
        let set = match protocol {
            Protocol::General => &mut entry.general,
            Protocol::Lightweight => &mut entry.lightweight,
        };
        set.extend(ids.into_iter().map(MotorId));
        self
    }

    /// Make opening `port` fail for `protocol` only, as when another process
    /// grabs the device between two scan groups
    pub fn with_unavailable(mut self, port: &str, protocol: Protocol) -> Self {
        self.ports.entry(port.to_string()).or_default();
        self.failing.insert((port.to_string(), protocol));
        self
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }
}

impl BusProbe for SimulatedBus {
    fn scan(
        &mut self,
        bus: &str,
        protocol: Protocol,
        window: &BTreeSet<MotorId>,
    ) -> Result<BTreeSet<MotorId>, BusError> {
        if self.failing.contains(&(bus.to_string(), protocol)) {
            return Err(BusError::PortUnavailable {
                port: bus.to_string(),
                reason: "Device or resource busy".to_string(),
            });
        }
        let port = self.ports.get(bus).ok_or_else(|| BusError::PortUnavailable {
            port: bus.to_string(),
            reason: "No such file or directory".to_string(),
        })?;

        self.events.push(BusEvent::Opened {
            port: bus.to_string(),
            protocol,
        });
        let answering = match protocol {
            Protocol::General => &port.general,
            Protocol::Lightweight => &port.lightweight,
        };
        let found = answering.intersection(window).copied().collect();
        self.events.push(BusEvent::Closed {
            port: bus.to_string(),
            protocol,
        });
        Ok(found)
    }
}
