//! Discovery report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::topology::{name_of, MotorId, PartName, RobotModel};

/// Missing motors keyed by identifier, valued by canonical joint name
///
/// Ordered so that two reports built from the same observations render and
/// serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissingReport(BTreeMap<MotorId, String>);

impl MissingReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declared motor as missing
    pub fn insert(&mut self, id: MotorId) {
        self.0.insert(id, name_of(id).to_string());
    }

    pub fn extend(&mut self, ids: impl IntoIterator<Item = MotorId>) {
        for id in ids {
            self.insert(id);
        }
    }

    pub fn contains(&self, id: MotorId) -> bool {
        self.0.contains_key(&id)
    }

    pub fn get(&self, id: MotorId) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = MotorId> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MotorId, &str)> {
        self.0.iter().map(|(id, name)| (*id, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MissingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (id, name)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}: '{name}'")?;
        }
        f.write_str("}")
    }
}

/// Result of scanning one part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartStatus {
    /// Every declared motor answered
    Complete,
    /// The bus was reachable but some declared motors did not answer
    MissingMotors { ids: Vec<MotorId> },
    /// The bus itself could not be opened; no motor-level verdict exists
    Unavailable { port: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartOutcome {
    pub part: PartName,
    #[serde(flatten)]
    pub status: PartStatus,
    /// Identifiers that answered on the bus without being declared for it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unexpected: Vec<MotorId>,
}

impl PartOutcome {
    pub fn is_unavailable(&self) -> bool {
        matches!(self.status, PartStatus::Unavailable { .. })
    }
}

/// Complete outcome of one discovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub model: RobotModel,
    pub started_at: DateTime<Utc>,
    pub parts: Vec<PartOutcome>,
    pub missing: MissingReport,
}

impl DiscoveryReport {
    /// True when every part was reachable and no motor is missing
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && !self.parts.iter().any(PartOutcome::is_unavailable)
    }

    pub fn unavailable_parts(&self) -> impl Iterator<Item = &PartOutcome> {
        self.parts.iter().filter(|p| p.is_unavailable())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DiscoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.parts {
            match &outcome.status {
                PartStatus::Complete => writeln!(f, "  {}: complete", outcome.part)?,
                PartStatus::MissingMotors { ids } => {
                    let list: Vec<String> = ids
                        .iter()
                        .map(|id| {
                            let name = self.missing.get(*id).unwrap_or("unknown");
                            format!("{id} ({name})")
                        })
                        .collect();
                    writeln!(f, "  {}: missing {}", outcome.part, list.join(", "))?;
                }
                PartStatus::Unavailable { port, reason } => writeln!(
                    f,
                    "  {}: port {} not reachable ({}). Make sure that the udev rule is set and the usb2ax board plugged.",
                    outcome.part, port, reason
                )?,
            }
            if !outcome.unexpected.is_empty() {
                let list: Vec<String> =
                    outcome.unexpected.iter().map(|id| id.to_string()).collect();
                writeln!(f, "    unexpected ids on the bus: {}", list.join(", "))?;
            }
        }

        if self.missing.is_empty() {
            write!(f, "Found all motors for Reachy {}!", self.model)?;
        } else {
            write!(f, "Found missing motors for Reachy {}: {}", self.model, self.missing)?;
        }

        let unavailable: Vec<&str> = self.unavailable_parts().map(|p| p.part.as_str()).collect();
        if !unavailable.is_empty() {
            write!(f, "\nCould not reach: {}", unavailable.join(", "))?;
        }
        Ok(())
    }
}
