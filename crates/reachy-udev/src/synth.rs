//! Rule synthesis for actuator boards and cameras
//!
//! Every workflow checks its preconditions before touching the rules store:
//! when a check fails nothing is written for that device class.

use reachy_core::PartName;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::resolver::{DeviceAttributeResolver, DeviceTree, ResolveError};
use crate::rule::{
    board_comment, CameraSide, NamingRule, BOARD_PATTERN, BOARD_SIGNATURE, CAMERA_COMMENT,
    CAMERA_PATTERN, CAMERA_SIGNATURE,
};
use crate::store::{RuleBlock, RulesStore, StoreError};

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("No usb2ax board detected for {part}, make sure that one is connected")]
    NoDeviceDetected { part: PartName },
    #[error("{} usb2ax boards detected for {part} ({}), make sure that only one is connected", .candidates.len(), display_paths(.candidates))]
    AmbiguousDevice {
        part: PartName,
        candidates: Vec<PathBuf>,
    },
    #[error("Unable to detect both cameras: expected 2 primary capture nodes, found {found}")]
    InsufficientCameras { found: usize },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds naming rules from attached devices and records them in the store
pub struct RuleSynthesizer<T: DeviceTree> {
    resolver: DeviceAttributeResolver<T>,
    store: RulesStore,
}

impl<T: DeviceTree> RuleSynthesizer<T> {
    pub fn new(tree: T, store: RulesStore) -> Self {
        Self {
            resolver: DeviceAttributeResolver::new(tree),
            store,
        }
    }

    pub fn store(&self) -> &RulesStore {
        &self.store
    }

    /// Name the controller board of `part` among the attached serial devices
    pub fn write_board_rule(&self, part: PartName) -> Result<NamingRule, SynthesisError> {
        let candidates = self.resolver.enumerate(BOARD_PATTERN)?;
        self.synthesize_board_rule(part, &candidates)
    }

    /// Name both cameras among the attached capture nodes
    pub fn write_camera_rules(&self) -> Result<(NamingRule, NamingRule), SynthesisError> {
        let candidates = self.resolver.enumerate(CAMERA_PATTERN)?;
        self.synthesize_camera_rules(&candidates)
    }

    /// Bind the board among `candidates` to the `usb2ax_<part>` symlink
    ///
    /// The head's zoom controller shares the device pattern, so head
    /// candidates are always filtered by product signature, even a lone one.
    /// Arms accept exactly one candidate.
    pub fn synthesize_board_rule(
        &self,
        part: PartName,
        candidates: &[PathBuf],
    ) -> Result<NamingRule, SynthesisError> {
        let device = match candidates {
            [] => return Err(SynthesisError::NoDeviceDetected { part }),
            [single] if part != PartName::Head => single.clone(),
            _ if part == PartName::Head => {
                let boards = self.resolver.matching_signature(candidates, BOARD_SIGNATURE)?;
                match boards.as_slice() {
                    [] => return Err(SynthesisError::NoDeviceDetected { part }),
                    [board] => board.clone(),
                    _ => {
                        return Err(SynthesisError::AmbiguousDevice {
                            part,
                            candidates: boards,
                        })
                    }
                }
            }
            _ => {
                return Err(SynthesisError::AmbiguousDevice {
                    part,
                    candidates: candidates.to_vec(),
                })
            }
        };

        let serial = self.resolver.serial(&device)?;
        let rule = NamingRule::board(part, &serial);
        self.store
            .commit(&RuleBlock::new(board_comment(part), vec![rule.clone()]))?;

        info!(part = %part, device = %device.display(), serial = %serial, "Wrote udev rule");
        Ok(rule)
    }

    /// Bind the two cameras among `candidates` to `right_camera` and `left_camera`
    ///
    /// Physical side cannot be observed, so the first qualifying node in
    /// enumeration order is named right and the second left. Operators swap
    /// the two symlink targets in the store when that guess is wrong.
    pub fn synthesize_camera_rules(
        &self,
        candidates: &[PathBuf],
    ) -> Result<(NamingRule, NamingRule), SynthesisError> {
        let cameras = self.resolver.primary_capture_nodes(candidates, CAMERA_SIGNATURE);
        let [right, left] = cameras.as_slice() else {
            warn!(
                candidates = candidates.len(),
                qualifying = cameras.len(),
                "Unable to detect both cameras"
            );
            return Err(SynthesisError::InsufficientCameras {
                found: cameras.len(),
            });
        };

        let right_serial = self.resolver.camera_serial(right)?;
        let left_serial = self.resolver.camera_serial(left)?;
        let right_rule = NamingRule::camera(CameraSide::Right, &right_serial);
        let left_rule = NamingRule::camera(CameraSide::Left, &left_serial);

        self.store.commit(&RuleBlock::new(
            CAMERA_COMMENT,
            vec![right_rule.clone(), left_rule.clone()],
        ))?;

        info!(
            right = %right.display(),
            left = %left.display(),
            "Wrote udev rules for cameras, assuming the first one is the right camera"
        );
        Ok((right_rule, left_rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{DeviceChain, DeviceNode};
    use crate::resolver::InMemoryDeviceTree;
    use std::fs;
    use tempfile::TempDir;

    const EXISTING: &str = "# Rules for the lidar\nKERNEL==\"ttyUSB0\", SYMLINK+=\"lidar\"\n";

    fn acm(product: &str, serial: &str) -> DeviceChain {
        DeviceChain::new(vec![
            DeviceNode::new("/devices/usb1/1-2/1-2:1.0/tty/ttyACM0"),
            DeviceNode::new("/devices/usb1/1-2")
                .with_attr("idVendor", "16d0")
                .with_attr("product", product)
                .with_attr("serial", serial),
        ])
    }

    fn video(index: u32, manufacturer: &str, serial: &str) -> DeviceChain {
        DeviceChain::new(vec![
            DeviceNode::new("/devices/usb1/1-1/1-1:1.0/video4linux/video")
                .with_attr("index", &index.to_string()),
            DeviceNode::new("/devices/usb1/1-1")
                .with_attr("manufacturer", manufacturer)
                .with_attr("serial", serial),
        ])
    }

    /// Capture nodes of `cameras`, four per camera, numbered in attach order
    fn cameras(cameras: &[(&str, &str)]) -> InMemoryDeviceTree {
        let mut tree = InMemoryDeviceTree::new();
        let mut node = 0;
        for (manufacturer, serial) in cameras {
            for index in 0..4 {
                let chain = video(index, manufacturer, serial);
                tree = tree.with_device(format!("/dev/video{node}"), chain);
                node += 1;
            }
        }
        tree
    }

    fn setup<T: DeviceTree>(tree: T) -> (TempDir, RuleSynthesizer<T>) {
        let dir = TempDir::new().unwrap();
        let store = RulesStore::new(dir.path().join("10-reachy-local.rules"));
        fs::write(store.path(), EXISTING).unwrap();
        (dir, RuleSynthesizer::new(tree, store))
    }

    fn paths(raw: &[&str]) -> Vec<PathBuf> {
        raw.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_single_board() {
        let tree = InMemoryDeviceTree::new().with_device("/dev/ttyACM0", acm("USB2AX", "SER-R"));
        let (_dir, synth) = setup(tree);

        let rule = synth.write_board_rule(PartName::RightArm).unwrap();
        assert_eq!(rule.symlink, "usb2ax_right_arm");
        let content = synth.store().read().unwrap();
        assert!(content.starts_with(EXISTING));
        assert!(content.contains("# Rules for the right_arm usb2ax board\n"));
        assert!(content.contains(r#"ATTRS{serial}=="SER-R""#));
    }

    #[test]
    fn test_no_board() {
        let (_dir, synth) = setup(InMemoryDeviceTree::new());
        let err = synth.write_board_rule(PartName::LeftArm).unwrap_err();
        assert!(matches!(err, SynthesisError::NoDeviceDetected { part: PartName::LeftArm }));
        assert_eq!(synth.store().read().unwrap(), EXISTING);
    }

    #[test]
    fn test_two_arm_boards_are_ambiguous() {
        let tree = InMemoryDeviceTree::new()
            .with_device("/dev/ttyACM0", acm("USB2AX", "A"))
            .with_device("/dev/ttyACM1", acm("USB2AX", "B"));
        let (_dir, synth) = setup(tree);

        let err = synth.write_board_rule(PartName::LeftArm).unwrap_err();
        match err {
            SynthesisError::AmbiguousDevice { part, candidates } => {
                assert_eq!(part, PartName::LeftArm);
                assert_eq!(candidates, paths(&["/dev/ttyACM0", "/dev/ttyACM1"]));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(synth.store().read().unwrap(), EXISTING);
    }

    #[test]
    fn test_head_picks_board_over_zoom_controller() {
        let tree = InMemoryDeviceTree::new()
            .with_device("/dev/ttyACM0", acm("Kurokesu zoom controller", "ZOOM"))
            .with_device("/dev/ttyACM1", acm("USB2AX", "HEAD"));
        let (_dir, synth) = setup(tree);

        synth.write_board_rule(PartName::Head).unwrap();
        let content = synth.store().read().unwrap();
        assert!(content.contains(r#"ATTRS{serial}=="HEAD", MODE="666", SYMLINK+="usb2ax_head""#));
        assert!(!content.contains("ZOOM"));
    }

    #[test]
    fn test_head_without_board_signature() {
        let tree = InMemoryDeviceTree::new()
            .with_device("/dev/ttyACM0", acm("zoom", "Z1"))
            .with_device("/dev/ttyACM1", acm("zoom", "Z2"));
        let (_dir, synth) = setup(tree);
        assert!(matches!(
            synth.write_board_rule(PartName::Head),
            Err(SynthesisError::NoDeviceDetected { part: PartName::Head })
        ));
        assert_eq!(synth.store().read().unwrap(), EXISTING);
    }

    #[test]
    fn test_lone_zoom_controller_is_not_a_head_board() {
        let tree = InMemoryDeviceTree::new()
            .with_device("/dev/ttyACM0", acm("Kurokesu zoom controller", "ZOOM"));
        let (_dir, synth) = setup(tree);
        assert!(matches!(
            synth.write_board_rule(PartName::Head),
            Err(SynthesisError::NoDeviceDetected { part: PartName::Head })
        ));
        assert_eq!(synth.store().read().unwrap(), EXISTING);
    }

    #[test]
    fn test_lone_head_board() {
        let tree = InMemoryDeviceTree::new().with_device("/dev/ttyACM0", acm("USB2AX", "HEAD"));
        let (_dir, synth) = setup(tree);
        let rule = synth.write_board_rule(PartName::Head).unwrap();
        assert_eq!(rule.symlink, "usb2ax_head");
        assert!(synth.store().read().unwrap().contains(r#"ATTRS{serial}=="HEAD""#));
    }

    #[test]
    fn test_board_without_serial_writes_nothing() {
        let tree = InMemoryDeviceTree::new().with_device(
            "/dev/ttyACM0",
            DeviceChain::new(vec![DeviceNode::new("/devices/tty/ttyACM0")]),
        );
        let (_dir, synth) = setup(tree);
        assert!(matches!(
            synth.write_board_rule(PartName::RightArm),
            Err(SynthesisError::Resolve(ResolveError::MissingSerial(_)))
        ));
        assert_eq!(synth.store().read().unwrap(), EXISTING);
    }

    #[test]
    fn test_two_cameras_first_is_right() {
        let (_dir, synth) = setup(cameras(&[("Kurokesu", "CAM-A"), ("Kurokesu", "CAM-B")]));

        let candidates = synth.resolver.enumerate(CAMERA_PATTERN).unwrap();
        assert_eq!(candidates.len(), 8);
        let primary = synth.resolver.primary_capture_nodes(&candidates, CAMERA_SIGNATURE);
        assert_eq!(primary, paths(&["/dev/video0", "/dev/video4"]));

        let (right, left) = synth.write_camera_rules().unwrap();
        assert_eq!(right.symlink, "right_camera");
        assert_eq!(left.symlink, "left_camera");
        assert!(right.matches.contains(&("ATTRS{serial}".to_string(), "CAM-A".to_string())));
        assert!(left.matches.contains(&("ATTRS{serial}".to_string(), "CAM-B".to_string())));

        let content = synth.store().read().unwrap();
        let tail: Vec<&str> = content.lines().skip(2).collect();
        let (right_line, left_line) = (right.to_string(), left.to_string());
        assert_eq!(tail, vec![CAMERA_COMMENT, right_line.as_str(), left_line.as_str()]);
    }

    #[test]
    fn test_wrong_camera_count_writes_nothing() {
        let layouts: [&[(&str, &str)]; 4] = [
            &[],
            &[("Kurokesu", "CAM-A")],
            &[("Kurokesu", "CAM-A"), ("Generic", "WEBCAM")],
            &[("Kurokesu", "CAM-A"), ("Kurokesu", "CAM-B"), ("Kurokesu", "CAM-C")],
        ];
        let expected_found = [0, 1, 1, 3];

        for (layout, expected) in layouts.iter().zip(expected_found) {
            let (_dir, synth) = setup(cameras(layout));
            match synth.write_camera_rules() {
                Err(SynthesisError::InsufficientCameras { found }) => assert_eq!(found, expected),
                other => panic!("unexpected result: {other:?}"),
            }
            assert_eq!(synth.store().read().unwrap(), EXISTING);
        }
    }

    #[test]
    fn test_locked_store_is_reported() {
        let tree = InMemoryDeviceTree::new().with_device("/dev/ttyACM0", acm("USB2AX", "S"));
        let (_dir, synth) = setup(tree);
        let _guard = synth.store().lock().unwrap();
        assert!(matches!(
            synth.write_board_rule(PartName::RightArm),
            Err(SynthesisError::Store(StoreError::Locked { .. }))
        ));
    }
}
