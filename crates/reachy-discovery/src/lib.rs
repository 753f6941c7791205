//! Reachy Discovery - Find which actuators are missing on a robot
//!
//! This crate reconciles the declared topology of a robot model against the
//! actuators that answer on its buses:
//! - [`probe`]: the bus probe contract and its serial implementation
//! - [`sim`]: a scripted bus for exercising the reconciler without hardware
//! - [`reconciler`]: per-part scanning and the missing-motor report

pub mod probe;
pub mod reconciler;
pub mod sim;

pub use probe::{BusError, BusProbe, ProbeSettings, SerialBusProbe};
pub use reconciler::{DiscoveryConfig, DiscoveryReconciler, DEFAULT_BUS_PREFIX};
pub use sim::{BusEvent, SimulatedBus};
