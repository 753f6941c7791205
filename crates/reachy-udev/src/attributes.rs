//! Device-tree attribute walks, as printed by `udevadm info --attribute-walk`

use std::collections::BTreeMap;

/// One device of the chain from a device node up to the root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceNode {
    pub devpath: String,
    pub kernel: Option<String>,
    pub subsystem: Option<String>,
    pub driver: Option<String>,
    pub attrs: BTreeMap<String, String>,
}

impl DeviceNode {
    pub fn new(devpath: &str) -> Self {
        Self {
            devpath: devpath.to_string(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Device chain, leaf first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceChain {
    pub nodes: Vec<DeviceNode>,
}

impl DeviceChain {
    pub fn new(nodes: Vec<DeviceNode>) -> Self {
        Self { nodes }
    }

    /// Parse the output of `udevadm info -a -p <devpath>`
    pub fn parse(output: &str) -> Self {
        let mut nodes: Vec<DeviceNode> = Vec::new();

        for line in output.lines().map(str::trim) {
            if let Some(rest) = line
                .strip_prefix("looking at device '")
                .or_else(|| line.strip_prefix("looking at parent device '"))
            {
                let devpath = rest.trim_end_matches(':').trim_end_matches('\'');
                nodes.push(DeviceNode::new(devpath));
                continue;
            }

            let Some(node) = nodes.last_mut() else {
                continue;
            };
            let Some((key, value)) = parse_assignment(line) else {
                continue;
            };

            match key {
                "KERNEL" | "KERNELS" => node.kernel = Some(value),
                "SUBSYSTEM" | "SUBSYSTEMS" => node.subsystem = Some(value),
                "DRIVER" | "DRIVERS" => node.driver = Some(value).filter(|d| !d.is_empty()),
                _ => {
                    if let Some(name) = key
                        .strip_prefix("ATTRS{")
                        .or_else(|| key.strip_prefix("ATTR{"))
                        .and_then(|k| k.strip_suffix('}'))
                    {
                        node.attrs.insert(name.to_string(), value);
                    }
                }
            }
        }

        Self { nodes }
    }

    pub fn leaf(&self) -> Option<&DeviceNode> {
        self.nodes.first()
    }

    /// Attribute of the device node itself
    pub fn own_attr(&self, name: &str) -> Option<&str> {
        self.leaf().and_then(|n| n.attr(name))
    }

    /// First value of `name` found while ascending from the leaf
    pub fn find_attr(&self, name: &str) -> Option<&str> {
        self.nodes.iter().find_map(|n| n.attr(name))
    }

    pub fn serial(&self) -> Option<&str> {
        self.find_attr("serial").filter(|s| !s.is_empty())
    }

    /// Capture-node ordinal of a video device
    pub fn index(&self) -> Option<u32> {
        self.own_attr("index").and_then(|i| i.trim().parse().ok())
    }

    /// Whether any attribute or driver along the chain contains `pattern`
    pub fn matches_signature(&self, pattern: &str) -> bool {
        self.nodes.iter().any(|n| {
            n.attrs.values().any(|v| v.contains(pattern))
                || n.driver.as_deref().is_some_and(|d| d.contains(pattern))
        })
    }
}

/// Split `KEY=="value"` into key and unquoted value
fn parse_assignment(line: &str) -> Option<(&str, String)> {
    let (key, value) = line.split_once("==")?;
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    Some((key.trim(), value.to_string()))
}
