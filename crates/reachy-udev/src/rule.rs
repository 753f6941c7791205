//! Persistent-naming rules in udev syntax

use reachy_core::PartName;
use std::fmt;

/// Product string of the actuator controller board
pub const BOARD_SIGNATURE: &str = "USB2AX";
pub const BOARD_VENDOR_ID: &str = "16d0";
/// Vendor string of the stereo camera modules
pub const CAMERA_SIGNATURE: &str = "Kurokesu";

pub const BOARD_PATTERN: &str = "/dev/ttyACM*";
pub const CAMERA_PATTERN: &str = "/dev/video*";

/// Which eye a camera is assumed to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraSide {
    Right,
    Left,
}

impl CameraSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraSide::Right => "right",
            CameraSide::Left => "left",
        }
    }
}

/// One rule line: kernel match, attribute matches, optional mode and a symlink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingRule {
    pub kernel: String,
    /// `(key, value)` pairs such as `("ATTRS{serial}", "A1B2")`
    pub matches: Vec<(String, String)>,
    pub mode: Option<String>,
    pub symlink: String,
}

impl NamingRule {
    /// Bind a controller board serial to `usb2ax_<part>`
    pub fn board(part: PartName, serial: &str) -> Self {
        Self {
            kernel: "ttyACM[0-9]".to_string(),
            matches: vec![
                ("ATTRS{idVendor}".to_string(), BOARD_VENDOR_ID.to_string()),
                ("ATTRS{product}".to_string(), BOARD_SIGNATURE.to_string()),
                ("ATTRS{serial}".to_string(), serial.to_string()),
            ],
            mode: Some("666".to_string()),
            symlink: board_symlink(part),
        }
    }

    /// Bind capture node 0 of a camera serial to `<side>_camera`
    pub fn camera(side: CameraSide, serial: &str) -> Self {
        Self {
            kernel: "video[0-9]".to_string(),
            matches: vec![
                ("ATTR{index}".to_string(), "0".to_string()),
                ("ATTRS{serial}".to_string(), serial.to_string()),
            ],
            mode: None,
            symlink: format!("{}_camera", side.as_str()),
        }
    }
}

impl fmt::Display for NamingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KERNEL==\"{}\"", self.kernel)?;
        for (key, value) in &self.matches {
            write!(f, ", {key}==\"{value}\"")?;
        }
        if let Some(mode) = &self.mode {
            write!(f, ", MODE=\"{mode}\"")?;
        }
        write!(f, ", SYMLINK+=\"{}\"", self.symlink)
    }
}

pub fn board_symlink(part: PartName) -> String {
    format!("usb2ax_{part}")
}

/// Header comment written above a board rule
pub fn board_comment(part: PartName) -> String {
    format!("# Rules for the {part} usb2ax board")
}

pub const CAMERA_COMMENT: &str = "# Rules for the Kurokesu cameras";

/// Symlink target of a rule line, if it declares one
pub fn symlink_of(line: &str) -> Option<&str> {
    let start = line.find("SYMLINK+=\"")? + "SYMLINK+=\"".len();
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_rule_line() {
        let rule = NamingRule::board(PartName::LeftArm, "74031303437351011190");
        assert_eq!(
            rule.to_string(),
            r#"KERNEL=="ttyACM[0-9]", ATTRS{idVendor}=="16d0", ATTRS{product}=="USB2AX", ATTRS{serial}=="74031303437351011190", MODE="666", SYMLINK+="usb2ax_left_arm""#
        );
    }

    #[test]
    fn test_camera_rule_line() {
        let rule = NamingRule::camera(CameraSide::Right, "CAM-A");
        assert_eq!(
            rule.to_string(),
            r#"KERNEL=="video[0-9]", ATTR{index}=="0", ATTRS{serial}=="CAM-A", SYMLINK+="right_camera""#
        );
    }

    #[test]
    fn test_symlink_of() {
        let line = NamingRule::board(PartName::Head, "X").to_string();
        assert_eq!(symlink_of(&line), Some("usb2ax_head"));
        assert_eq!(symlink_of("# Rules for the head usb2ax board"), None);
        assert_eq!(symlink_of("SYMLINK+=\"unterminated"), None);
    }
}
