//! Device identities and selection
//!
//! Turns the textual `--device` and `--devicehost` expressions into an
//! ordered set of coprocessor identities.

mod hostnames;
mod selector;

pub use hostnames::HostnameMap;
pub use selector::expand;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Display-name prefix of every coprocessor
pub const DEVICE_PREFIX: &str = "mic";

/// One coprocessor card
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    index: u32,
    name: String,
    alias: String,
}

impl Device {
    /// Device `index` with its alias defaulting to the display name
    pub fn new(index: u32) -> Self {
        let name = format!("{}{}", DEVICE_PREFIX, index);
        Self {
            index,
            alias: name.clone(),
            name,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Display name, e.g. "mic0"
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Network hostname used by ping/ssh checks
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = alias.into();
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Validated, duplicate-free, ascending list of devices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceSelection {
    devices: Vec<Device>,
}

impl DeviceSelection {
    /// Callers must pass ascending, unique ordinals
    pub(crate) fn from_sorted(indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            devices: indices.into_iter().map(Device::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Device> {
        self.devices.iter()
    }

    pub fn get(&self, pos: usize) -> Option<&Device> {
        self.devices.get(pos)
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Device> {
        self.devices.iter_mut()
    }

    pub fn indices(&self) -> Vec<u32> {
        self.devices.iter().map(Device::index).collect()
    }
}

impl<'a> IntoIterator for &'a DeviceSelection {
    type Item = &'a Device;
    type IntoIter = std::slice::Iter<'a, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_defaults() {
        let dev = Device::new(3);
        assert_eq!(dev.index(), 3);
        assert_eq!(dev.name(), "mic3");
        assert_eq!(dev.alias(), "mic3");
        assert_eq!(dev.to_string(), "mic3");
    }

    #[test]
    fn test_device_equality_includes_alias() {
        let plain = Device::new(1);
        let aliased = Device::new(1).with_alias("node1-mic1");
        assert_ne!(plain, aliased);
        assert_eq!(aliased, Device::new(1).with_alias("node1-mic1"));
    }
}
