//! Reachy Core - Hardware topology and discovery report types
//!
//! This crate provides the foundational types shared by the Reachy tools:
//! - The declared hardware topology (robot models, parts, motor identifiers)
//! - Scan groups describing which protocol reaches which motors
//! - Discovery reports reconciling declared against observed hardware

pub mod report;
pub mod topology;

pub use report::{DiscoveryReport, MissingReport, PartOutcome, PartStatus};
pub use topology::{
    expected_motors, name_of, parts_of, scan_groups, MotorId, PartName, Protocol, RobotModel,
    ScanGroup, TopologyError, ARM_SCAN_WINDOW,
};
