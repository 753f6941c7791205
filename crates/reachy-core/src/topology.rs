//! Declared hardware topology: robot models, body parts and motor identifiers
//!
//! Everything in here is static data. A robot model expands to an ordered list
//! of parts, each part declares the motors it must contain, and each motor has
//! a canonical joint name. Parts are further split into scan groups because the
//! head mixes two wire protocols on the same physical bus.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Unknown robot model '{0}' (expected full_kit, starter_kit_left or starter_kit_right)")]
    UnknownModel(String),
    #[error("Unknown robot part '{0}' (expected right_arm, left_arm or head)")]
    UnknownPart(String),
}

/// Upper bound (exclusive) of the identifier window pinged on an arm bus
pub const ARM_SCAN_WINDOW: u8 = 40;

/// Identifier of an actuator, unique across the whole robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MotorId(pub u8);

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for MotorId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// A named subsystem of the robot sharing one actuator bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartName {
    RightArm,
    LeftArm,
    Head,
}

impl PartName {
    pub const ALL: [PartName; 3] = [PartName::RightArm, PartName::LeftArm, PartName::Head];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartName::RightArm => "right_arm",
            PartName::LeftArm => "left_arm",
            PartName::Head => "head",
        }
    }

    pub fn is_arm(&self) -> bool {
        matches!(self, PartName::RightArm | PartName::LeftArm)
    }
}

impl fmt::Display for PartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartName {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PartName::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| TopologyError::UnknownPart(s.to_string()))
    }
}

/// Hardware kit a robot was assembled as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotModel {
    FullKit,
    StarterKitLeft,
    StarterKitRight,
}

impl RobotModel {
    pub const ALL: [RobotModel; 3] = [
        RobotModel::FullKit,
        RobotModel::StarterKitLeft,
        RobotModel::StarterKitRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RobotModel::FullKit => "full_kit",
            RobotModel::StarterKitLeft => "starter_kit_left",
            RobotModel::StarterKitRight => "starter_kit_right",
        }
    }
}

impl fmt::Display for RobotModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RobotModel {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RobotModel::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| TopologyError::UnknownModel(s.to_string()))
    }
}

/// Wire protocol spoken by a group of actuators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Arm actuators and the orbita neck joint
    General,
    /// Head antenna servos
    Lightweight,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::General => f.write_str("general"),
            Protocol::Lightweight => f.write_str("lightweight"),
        }
    }
}

/// One logical scan over a part's bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanGroup {
    pub protocol: Protocol,
    /// Identifiers that must answer
    pub expected: BTreeSet<MotorId>,
    /// Identifiers actually pinged, always a superset of `expected`
    pub window: BTreeSet<MotorId>,
}

const MOTOR_NAMES: &[(u8, &str)] = &[
    (10, "r_shoulder_pitch"),
    (11, "r_shoulder_roll"),
    (12, "r_arm_yaw"),
    (13, "r_elbow_pitch"),
    (14, "r_forearm_yaw"),
    (15, "r_wrist_pitch"),
    (16, "r_wrist_yaw"),
    (17, "r_gripper"),
    (20, "l_shoulder_pitch"),
    (21, "l_shoulder_roll"),
    (22, "l_arm_yaw"),
    (23, "l_elbow_pitch"),
    (24, "l_forearm_yaw"),
    (25, "l_wrist_pitch"),
    (26, "l_wrist_yaw"),
    (27, "l_gripper"),
    (30, "r_antenna"),
    (31, "l_antenna"),
    (40, "neck_orbita"),
];

const HEAD_ANTENNAS: &[u8] = &[31];
const HEAD_NECK: &[u8] = &[40];

fn ids(raw: impl IntoIterator<Item = u8>) -> BTreeSet<MotorId> {
    raw.into_iter().map(MotorId).collect()
}

/// Parts a robot model is built from, in scan order
pub fn parts_of(model: RobotModel) -> &'static [PartName] {
    match model {
        RobotModel::FullKit => &[PartName::RightArm, PartName::LeftArm, PartName::Head],
        RobotModel::StarterKitLeft => &[PartName::LeftArm, PartName::Head],
        RobotModel::StarterKitRight => &[PartName::RightArm, PartName::Head],
    }
}

/// Motors a part must contain
pub fn expected_motors(part: PartName) -> BTreeSet<MotorId> {
    match part {
        PartName::RightArm => ids(10..=17),
        PartName::LeftArm => ids(20..=27),
        PartName::Head => ids(HEAD_NECK.iter().chain(HEAD_ANTENNAS).copied()),
    }
}

/// Canonical joint name of a declared motor
///
/// # Panics
///
/// Panics when `id` is not part of the declared topology. Callers only ever
/// pass identifiers obtained from [`expected_motors`].
pub fn name_of(id: MotorId) -> &'static str {
    match MOTOR_NAMES.iter().find(|(raw, _)| *raw == id.0) {
        Some((_, name)) => name,
        None => panic!("motor id {id} is not declared in the topology"),
    }
}

/// Scan groups for a part, in the order they must run on the bus
///
/// The head bus carries the antennas (lightweight protocol) and the neck
/// (general protocol); the lightweight group comes first so its channel is
/// closed before the general one is opened.
pub fn scan_groups(part: PartName) -> Vec<ScanGroup> {
    match part {
        PartName::RightArm | PartName::LeftArm => vec![ScanGroup {
            protocol: Protocol::General,
            expected: expected_motors(part),
            window: ids(0..ARM_SCAN_WINDOW),
        }],
        PartName::Head => vec![
            ScanGroup {
                protocol: Protocol::Lightweight,
                expected: ids(HEAD_ANTENNAS.iter().copied()),
                window: ids(HEAD_ANTENNAS.iter().copied()),
            },
            ScanGroup {
                protocol: Protocol::General,
                expected: ids(HEAD_NECK.iter().copied()),
                window: ids(HEAD_NECK.iter().copied()),
            },
        ],
    }
}
