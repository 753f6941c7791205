//! Device attribute resolution against the OS device hierarchy
//!
//! [`DeviceTree`] is the seam between naming logic and the operating system.
//! [`Udevadm`] queries the live system through the `udevadm` tool, while
//! [`InMemoryDeviceTree`] serves fixed attribute walks for tests and dry runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, trace};

use crate::attributes::DeviceChain;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid device pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("Failed to run udevadm for {device}: {source}")]
    Spawn {
        device: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("udevadm query failed for {device}: {message}")]
    Query { device: PathBuf, message: String },
    #[error("Device {0} is not attached")]
    UnknownDevice(PathBuf),
    #[error("Device {device} is capture node {index:?}, only node 0 identifies a camera")]
    NotPrimaryNode { device: PathBuf, index: Option<u32> },
    #[error("Device {0} exposes no serial number")]
    MissingSerial(PathBuf),
}

/// Read-only view of the device hierarchy
pub trait DeviceTree {
    /// Device nodes matching a glob such as `/dev/ttyACM*`, in natural order
    fn enumerate(&self, pattern: &str) -> Result<Vec<PathBuf>, ResolveError>;

    /// Attribute chain from `device` up to the root
    fn attribute_walk(&self, device: &Path) -> Result<DeviceChain, ResolveError>;
}

/// Order `video2` before `video10`
pub fn natural_sort(paths: &mut [PathBuf]) {
    paths.sort_by_key(|p| natural_key(p));
}

fn natural_key(path: &Path) -> (String, u64, String) {
    let text = path.to_string_lossy();
    let digits = text.len() - text.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (stem, number) = text.split_at(text.len() - digits);
    (stem.to_string(), number.parse().unwrap_or(0), text.to_string())
}

/// The live system, queried through `udevadm`
#[derive(Debug, Clone)]
pub struct Udevadm {
    program: String,
}

impl Default for Udevadm {
    fn default() -> Self {
        Self {
            program: "udevadm".to_string(),
        }
    }
}

impl Udevadm {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&self, device: &Path, args: &[&str]) -> Result<String, ResolveError> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| ResolveError::Spawn {
                device: device.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            return Err(ResolveError::Query {
                device: device.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DeviceTree for Udevadm {
    fn enumerate(&self, pattern: &str) -> Result<Vec<PathBuf>, ResolveError> {
        let entries = glob::glob(pattern).map_err(|source| ResolveError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
        natural_sort(&mut paths);
        debug!(pattern = %pattern, count = paths.len(), "Enumerated device nodes");
        Ok(paths)
    }

    fn attribute_walk(&self, device: &Path) -> Result<DeviceChain, ResolveError> {
        let name = device.to_string_lossy();
        let sys_path = self.run(device, &["info", "-q", "path", "-n", &name])?;
        let sys_path = sys_path.trim();
        trace!(device = %name, sys_path = %sys_path, "Resolved sysfs path");

        let walk = self.run(device, &["info", "-a", "-p", sys_path])?;
        Ok(DeviceChain::parse(&walk))
    }
}

/// Fixed device hierarchy
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeviceTree {
    devices: BTreeMap<PathBuf, DeviceChain>,
}

impl InMemoryDeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: impl Into<PathBuf>, chain: DeviceChain) -> Self {
        self.devices.insert(device.into(), chain);
        self
    }
}

impl DeviceTree for InMemoryDeviceTree {
    fn enumerate(&self, pattern: &str) -> Result<Vec<PathBuf>, ResolveError> {
        let matcher = glob::Pattern::new(pattern).map_err(|source| ResolveError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = self
            .devices
            .keys()
            .filter(|p| matcher.matches_path(p))
            .cloned()
            .collect();
        natural_sort(&mut paths);
        Ok(paths)
    }

    fn attribute_walk(&self, device: &Path) -> Result<DeviceChain, ResolveError> {
        self.devices
            .get(device)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownDevice(device.to_path_buf()))
    }
}

/// Which attributes a caller needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeRequest {
    pub serial: bool,
    pub signature: Option<String>,
    pub index: bool,
}

impl AttributeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serial(mut self) -> Self {
        self.serial = true;
        self
    }

    pub fn signature(mut self, pattern: &str) -> Self {
        self.signature = Some(pattern.to_string());
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }
}

/// Attributes resolved for one device; unrequested fields stay `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAttributeSet {
    pub device: PathBuf,
    pub serial: Option<String>,
    pub signature_matches: Option<bool>,
    pub index: Option<u32>,
}

/// Resolves device paths to the attributes used for naming
#[derive(Debug, Clone)]
pub struct DeviceAttributeResolver<T: DeviceTree> {
    tree: T,
}

impl<T: DeviceTree> DeviceAttributeResolver<T> {
    pub fn new(tree: T) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn enumerate(&self, pattern: &str) -> Result<Vec<PathBuf>, ResolveError> {
        self.tree.enumerate(pattern)
    }

    pub fn resolve(
        &self,
        device: &Path,
        request: &AttributeRequest,
    ) -> Result<DeviceAttributeSet, ResolveError> {
        let chain = self.tree.attribute_walk(device)?;
        Ok(DeviceAttributeSet {
            device: device.to_path_buf(),
            serial: request
                .serial
                .then(|| chain.serial().map(str::to_string))
                .flatten(),
            signature_matches: request
                .signature
                .as_deref()
                .map(|pattern| chain.matches_signature(pattern)),
            index: request.index.then(|| chain.index()).flatten(),
        })
    }

    pub fn serial(&self, device: &Path) -> Result<String, ResolveError> {
        self.resolve(device, &AttributeRequest::new().serial())?
            .serial
            .ok_or_else(|| ResolveError::MissingSerial(device.to_path_buf()))
    }

    /// Serial of a camera, refusing every capture node other than index 0
    pub fn camera_serial(&self, device: &Path) -> Result<String, ResolveError> {
        let attrs = self.resolve(device, &AttributeRequest::new().serial().index())?;
        if attrs.index != Some(0) {
            return Err(ResolveError::NotPrimaryNode {
                device: device.to_path_buf(),
                index: attrs.index,
            });
        }
        attrs
            .serial
            .ok_or_else(|| ResolveError::MissingSerial(device.to_path_buf()))
    }

    /// Keep the candidates that are capture node 0 and carry `signature`
    ///
    /// Nodes whose attributes cannot be read are skipped.
    pub fn primary_capture_nodes(&self, candidates: &[PathBuf], signature: &str) -> Vec<PathBuf> {
        let request = AttributeRequest::new().index().signature(signature);
        candidates
            .iter()
            .filter(|device| match self.resolve(device, &request) {
                Ok(attrs) => attrs.index == Some(0) && attrs.signature_matches == Some(true),
                Err(e) => {
                    debug!(
                        device = %device.display(),
                        error = %e,
                        "Skipping unreadable capture node"
                    );
                    false
                }
            })
            .cloned()
            .collect()
    }

    /// Keep the candidates whose chain carries `signature`
    pub fn matching_signature(
        &self,
        candidates: &[PathBuf],
        signature: &str,
    ) -> Result<Vec<PathBuf>, ResolveError> {
        let request = AttributeRequest::new().signature(signature);
        let mut matching = Vec::new();
        for device in candidates {
            if self.resolve(device, &request)?.signature_matches == Some(true) {
                matching.push(device.clone());
            }
        }
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::DeviceNode;

    fn capture_node(index: u32, vendor: &str, serial: &str) -> DeviceChain {
        DeviceChain::new(vec![
            DeviceNode::new("/devices/usb1/1-1/1-1:1.0/video4linux/video")
                .with_attr("index", &index.to_string())
                .with_attr("name", "Camera"),
            DeviceNode::new("/devices/usb1/1-1")
                .with_attr("manufacturer", vendor)
                .with_attr("serial", serial),
        ])
    }

    fn two_cameras() -> InMemoryDeviceTree {
        let mut tree = InMemoryDeviceTree::new();
        for i in 0..4u32 {
            tree = tree.with_device(format!("/dev/video{i}"), capture_node(i, "Kurokesu", "CAM-A"));
            tree = tree.with_device(
                format!("/dev/video{}", i + 4),
                capture_node(i, "Kurokesu", "CAM-B"),
            );
        }
        tree
    }

    #[test]
    fn test_natural_sort() {
        let mut paths: Vec<PathBuf> = ["/dev/video10", "/dev/video2", "/dev/video1", "/dev/ttyACM0"]
            .iter()
            .map(PathBuf::from)
            .collect();
        natural_sort(&mut paths);
        let names: Vec<&str> = paths.iter().map(|p| p.to_str().unwrap()).collect();
        assert_eq!(names, ["/dev/ttyACM0", "/dev/video1", "/dev/video2", "/dev/video10"]);
    }

    #[test]
    fn test_in_memory_enumerate() {
        let resolver = DeviceAttributeResolver::new(two_cameras());
        let videos = resolver.enumerate("/dev/video*").unwrap();
        assert_eq!(videos.len(), 8);
        assert!(resolver.enumerate("/dev/ttyACM*").unwrap().is_empty());
    }

    #[test]
    fn test_resolve_only_requested_attributes() {
        let resolver = DeviceAttributeResolver::new(two_cameras());
        let device = Path::new("/dev/video5");
        let attrs = resolver.resolve(device, &AttributeRequest::new().index()).unwrap();
        assert_eq!(attrs.index, Some(1));
        assert_eq!(attrs.serial, None);
        assert_eq!(attrs.signature_matches, None);

        let attrs = resolver
            .resolve(device, &AttributeRequest::new().serial().signature("Kurokesu"))
            .unwrap();
        assert_eq!(attrs.serial.as_deref(), Some("CAM-B"));
        assert_eq!(attrs.signature_matches, Some(true));
    }

    #[test]
    fn test_primary_capture_nodes() {
        let tree = two_cameras()
            .with_device("/dev/video8", capture_node(0, "Generic", "WEBCAM"));
        let resolver = DeviceAttributeResolver::new(tree);
        let all = resolver.enumerate("/dev/video*").unwrap();
        let primary = resolver.primary_capture_nodes(&all, "Kurokesu");
        assert_eq!(primary, vec![PathBuf::from("/dev/video0"), PathBuf::from("/dev/video4")]);
    }

    #[test]
    fn test_camera_serial_rejects_secondary_node() {
        let resolver = DeviceAttributeResolver::new(two_cameras());
        assert_eq!(resolver.camera_serial(Path::new("/dev/video4")).unwrap(), "CAM-B");
        assert!(matches!(
            resolver.camera_serial(Path::new("/dev/video6")),
            Err(ResolveError::NotPrimaryNode { index: Some(2), .. })
        ));
    }

    #[test]
    fn test_unknown_device() {
        let resolver = DeviceAttributeResolver::new(InMemoryDeviceTree::new());
        assert!(matches!(
            resolver.serial(Path::new("/dev/ttyACM3")),
            Err(ResolveError::UnknownDevice(_))
        ));
    }
}
