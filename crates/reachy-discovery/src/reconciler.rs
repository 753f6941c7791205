//! Reconcile declared hardware against what answers on the buses

use chrono::Utc;
use reachy_core::{
    expected_motors, parts_of, scan_groups, DiscoveryReport, MissingReport, MotorId, PartName,
    PartOutcome, PartStatus, RobotModel, ARM_SCAN_WINDOW,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::probe::{BusError, BusProbe};

/// Device path prefix of the per-part actuator buses
pub const DEFAULT_BUS_PREFIX: &str = "/dev/usb2ax_";

/// Discovery parameters, injected at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub model: RobotModel,
    #[serde(default = "default_bus_prefix")]
    pub bus_prefix: String,
    /// Arm buses are pinged for every identifier below this bound
    #[serde(default = "default_arm_scan_window")]
    pub arm_scan_window: u8,
}

fn default_bus_prefix() -> String {
    DEFAULT_BUS_PREFIX.to_string()
}

fn default_arm_scan_window() -> u8 {
    ARM_SCAN_WINDOW
}

impl DiscoveryConfig {
    pub fn new(model: RobotModel) -> Self {
        Self {
            model,
            bus_prefix: default_bus_prefix(),
            arm_scan_window: default_arm_scan_window(),
        }
    }

    /// Device path of a part's bus, e.g. `/dev/usb2ax_right_arm`
    pub fn bus_address(&self, part: PartName) -> String {
        format!("{}{}", self.bus_prefix, part)
    }
}

/// Drives a [`BusProbe`] over every part of a robot model
pub struct DiscoveryReconciler<P: BusProbe> {
    config: DiscoveryConfig,
    probe: P,
}

impl<P: BusProbe> DiscoveryReconciler<P> {
    pub fn new(config: DiscoveryConfig, probe: P) -> Self {
        Self { config, probe }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Scan every part of the configured model
    ///
    /// Never fails: a part whose bus cannot be opened is reported as
    /// unavailable and contributes nothing to the missing-motor report.
    pub fn reconcile(&mut self) -> DiscoveryReport {
        let started_at = Utc::now();
        let model = self.config.model;
        info!(model = %model, "Scanning for missing motors");

        let mut parts = Vec::new();
        let mut missing = MissingReport::new();

        for &part in parts_of(model) {
            let (outcome, part_missing) = self.scan_part(part);
            missing.extend(part_missing);
            parts.push(outcome);
        }

        info!(
            model = %model,
            missing = missing.len(),
            unavailable = parts.iter().filter(|p| p.is_unavailable()).count(),
            "Discovery complete"
        );

        DiscoveryReport {
            model,
            started_at,
            parts,
            missing,
        }
    }

    /// Missing motors of the configured model
    pub fn missing(&mut self) -> MissingReport {
        self.reconcile().missing
    }

    fn scan_part(&mut self, part: PartName) -> (PartOutcome, BTreeSet<MotorId>) {
        let port = self.config.bus_address(part);
        let mut observed = BTreeSet::new();
        let mut unexpected = BTreeSet::new();

        // Groups run one after another, each opening and closing the port
        for mut group in scan_groups(part) {
            if part.is_arm() {
                group.window = (0..self.config.arm_scan_window)
                    .map(MotorId)
                    .chain(group.expected.iter().copied())
                    .collect();
            }
            match self.probe.scan(&port, group.protocol, &group.window) {
                Ok(found) => {
                    debug!(
                        part = %part,
                        protocol = %group.protocol,
                        found = found.len(),
                        "Group scanned"
                    );
                    for id in found {
                        if group.expected.contains(&id) {
                            observed.insert(id);
                        } else {
                            unexpected.insert(id);
                        }
                    }
                }
                Err(BusError::PortUnavailable { port, reason }) => {
                    warn!(
                        part = %part,
                        port = %port,
                        reason = %reason,
                        "Port not found. Make sure that the udev rule is set and the usb2ax board plugged"
                    );
                    let outcome = PartOutcome {
                        part,
                        status: PartStatus::Unavailable { port, reason },
                        unexpected: Vec::new(),
                    };
                    return (outcome, BTreeSet::new());
                }
            }
        }

        let part_missing: BTreeSet<MotorId> =
            expected_motors(part).difference(&observed).copied().collect();

        if !unexpected.is_empty() {
            warn!(part = %part, ids = ?unexpected, "Undeclared identifiers answered on the bus");
        }

        let status = if part_missing.is_empty() {
            PartStatus::Complete
        } else {
            PartStatus::MissingMotors {
                ids: part_missing.iter().copied().collect(),
            }
        };

        let outcome = PartOutcome {
            part,
            status,
            unexpected: unexpected.into_iter().collect(),
        };
        (outcome, part_missing)
    }
}
