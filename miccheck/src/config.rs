//! Configuration module for miccheck
//!
//! Handles loading and validating configuration from YAML files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use miccheck_core::platform::DEFAULT_PROBE_TIMEOUT;
use miccheck_core::{FirmwareExpectations, MockSettings, PlatformKind, PlatformSettings};
use serde::{Deserialize, Serialize};

/// Largest accepted probe timeout
const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(300);

/// Device ordinals are at most three digits
const MAX_MOCK_DEVICES: u32 = 1000;

/// Metrics export configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// node-exporter textfile written at the end of a run
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Platform provider
    #[serde(default)]
    pub platform: PlatformKind,

    /// Device selection expression
    #[serde(default = "default_device")]
    pub device: String,

    /// Bound of every external call a probe makes
    #[serde(with = "humantime_serde", default = "default_probe_timeout")]
    pub probe_timeout: Duration,

    /// Optional checks to run
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Expected firmware versions
    #[serde(default)]
    pub firmware: FirmwareExpectations,

    /// Network hostnames keyed by device name, e.g. `mic0: node0-mic0`
    #[serde(default)]
    pub hostnames: BTreeMap<String, String>,

    /// Mock platform behaviour
    #[serde(default)]
    pub mock: MockSettings,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: PlatformKind::default(),
            device: default_device(),
            probe_timeout: default_probe_timeout(),
            enabled: Vec::new(),
            firmware: FirmwareExpectations::default(),
            hostnames: BTreeMap::new(),
            mock: MockSettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout.is_zero() {
            anyhow::bail!("probe_timeout must be > 0");
        }
        if self.probe_timeout > MAX_PROBE_TIMEOUT {
            anyhow::bail!("probe_timeout must be at most {:?}", MAX_PROBE_TIMEOUT);
        }
        if self.device.trim().is_empty() {
            anyhow::bail!("device must not be empty");
        }
        if self.mock.device_count > MAX_MOCK_DEVICES {
            anyhow::bail!("mock.device_count must be at most {}", MAX_MOCK_DEVICES);
        }
        Ok(())
    }

    /// Settings handed to the platform provider
    pub fn platform_settings(&self) -> PlatformSettings {
        PlatformSettings {
            probe_timeout: self.probe_timeout,
            firmware: self.firmware.clone(),
            mock: self.mock.clone(),
        }
    }
}

// Default value functions
fn default_device() -> String {
    "all".to_string()
}

fn default_probe_timeout() -> Duration {
    DEFAULT_PROBE_TIMEOUT
}
