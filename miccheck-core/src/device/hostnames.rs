//! Per-device network hostnames given as `micM:host1,micN:host2`

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{DeviceSelection, DEVICE_PREFIX};
use crate::error::ValidationError;

// A domain name is at most 255 octets (RFC 1034)
static MAPPING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^mic(\d+):([A-Za-z0-9\-._]{1,255})$").expect("hostname pattern is valid")
});

/// Hostname aliases keyed by device ordinal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostnameMap {
    hosts: BTreeMap<u32, String>,
}

impl HostnameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `--devicehost` expression against `total` detected devices
    pub fn parse(expression: &str, total: u32) -> Result<Self, ValidationError> {
        let mut map = Self::new();
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(map);
        }

        let entries: Vec<&str> = expression.split(',').map(str::trim).collect();
        let invalid: Vec<String> = entries
            .iter()
            .filter(|e| !MAPPING.is_match(e))
            .map(|e| format!("'{}'", e))
            .collect();
        if !invalid.is_empty() {
            return Err(ValidationError::InvalidHostnameMapping(invalid));
        }

        for entry in entries {
            if let Some((device, host)) = entry.split_once(':') {
                map.insert(device, host, total)?;
            }
        }
        Ok(map)
    }

    /// Add one `device -> host` mapping
    pub fn insert(&mut self, device: &str, host: &str, total: u32) -> Result<(), ValidationError> {
        let entry = format!("{}:{}", device, host);
        let caps = MAPPING
            .captures(&entry)
            .ok_or_else(|| ValidationError::InvalidHostnameMapping(vec![format!("'{}'", entry)]))?;

        let unknown = || ValidationError::UnknownDevice(device.to_string());
        let index: u32 = caps[1].parse().map_err(|_| unknown())?;
        if self.hosts.contains_key(&index) {
            return Err(ValidationError::DuplicateHostname(format!(
                "{}{}",
                DEVICE_PREFIX, index
            )));
        }
        if index >= total {
            return Err(unknown());
        }

        self.hosts.insert(index, caps[2].to_string());
        Ok(())
    }

    /// Add every mapping of `other`, replacing existing ones
    pub fn merge(&mut self, other: HostnameMap) {
        self.hosts.extend(other.hosts);
    }

    pub fn contains(&self, index: u32) -> bool {
        self.hosts.contains_key(&index)
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.hosts.get(&index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Set the alias of every selected device that has a mapping
    pub fn apply(&self, selection: &mut DeviceSelection) {
        for device in selection.iter_mut() {
            if let Some(host) = self.hosts.get(&device.index()) {
                device.set_alias(host.clone());
            }
        }
    }
}
