//! Reachy udev - Stable device names for actuator boards and cameras
//!
//! Device files such as `/dev/ttyACM0` or `/dev/video4` are numbered in attach
//! order. This crate writes udev rules that bind them to stable symlinks:
//! - [`attributes`]: parsing of device-tree attribute walks
//! - [`resolver`]: attribute queries against the OS, or an in-memory tree
//! - [`rule`]: rule lines and symlink naming
//! - [`store`]: the locked, atomically replaced rules file
//! - [`synth`]: board and camera rule workflows

pub mod attributes;
pub mod resolver;
pub mod rule;
pub mod store;
pub mod synth;

pub use attributes::{DeviceChain, DeviceNode};
pub use resolver::{
    AttributeRequest, DeviceAttributeResolver, DeviceAttributeSet, DeviceTree,
    InMemoryDeviceTree, ResolveError, Udevadm,
};
pub use rule::{CameraSide, NamingRule};
pub use store::{CommitSummary, RuleBlock, RulesStore, StoreError, DEFAULT_RULES_PATH};
pub use synth::{RuleSynthesizer, SynthesisError};
