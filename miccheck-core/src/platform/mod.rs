//! Platform providers
//!
//! A platform detects how many cards the host has and registers the checks
//! it can run. It is chosen once at startup.

pub mod checks;
pub mod exec;
pub mod linux;
pub mod mock;

pub use linux::LinuxPlatform;
pub use mock::{MockPlatform, MockProbe};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use miccheck_scif::CardReport;

use crate::catalog::TestCatalog;
use crate::device::Device;
use crate::error::{CatalogError, ProbeError};

/// Default bound of every external call a probe makes
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Platform selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Linux when the MIC sysfs tree is present, mock otherwise
    #[default]
    Auto,
    Linux,
    Mock,
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKind::Auto => write!(f, "auto"),
            PlatformKind::Linux => write!(f, "linux"),
            PlatformKind::Mock => write!(f, "mock"),
        }
    }
}

/// Expected firmware versions
///
/// SMC and NTB EEPROM versions depend on the board fab, keyed by the
/// card's `fab_version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareExpectations {
    pub bios: Option<String>,
    pub me: Option<String>,
    pub smc: BTreeMap<String, String>,
    pub ntb_eeprom: BTreeMap<String, String>,
}

/// Mock platform behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSettings {
    pub device_count: u32,
    /// Check names to fail, `name` or `name@micN`
    pub failing: Vec<String>,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            device_count: 2,
            failing: Vec::new(),
        }
    }
}

/// Settings shared by every platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSettings {
    pub probe_timeout: Duration,
    pub firmware: FirmwareExpectations,
    pub mock: MockSettings,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            firmware: FirmwareExpectations::default(),
            mock: MockSettings::default(),
        }
    }
}

/// Management details of one card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardInfo {
    pub device: String,
    pub hostname: String,
    pub systoolsd_version: String,
    /// BIOS property name to mode, e.g. `cluster: quadrant`
    pub bios: BTreeMap<String, String>,
}

impl CardInfo {
    pub fn from_report(device: &Device, report: &CardReport) -> Self {
        Self {
            device: device.name().to_string(),
            hostname: device.alias().to_string(),
            systoolsd_version: report.systoolsd.to_string(),
            bios: report
                .bios_modes()
                .map(|(prop, mode)| (prop.to_string(), mode.to_string()))
                .collect(),
        }
    }
}

impl fmt::Display for CardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.device)?;
        if self.hostname != self.device {
            write!(f, " ({})", self.hostname)?;
        }
        write!(f, ": systoolsd {}", self.systoolsd_version)?;
        for (prop, mode) in &self.bios {
            write!(f, ", {} {}", prop, mode)?;
        }
        Ok(())
    }
}

/// Capability provider for one kind of host
#[async_trait]
pub trait Platform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Number of cards present on the host
    async fn detect_device_count(&self) -> Result<u32, ProbeError>;

    /// Register every check this platform provides
    fn register_checks(&self, catalog: &mut TestCatalog) -> Result<(), CatalogError>;

    /// systoolsd version and BIOS settings of one card
    async fn card_info(&self, device: &Device) -> Result<CardInfo, ProbeError>;
}

/// Create the platform for `kind`
pub fn create_platform(kind: PlatformKind, settings: PlatformSettings) -> Arc<dyn Platform> {
    match kind {
        PlatformKind::Auto => {
            let linux = LinuxPlatform::new(settings.clone());
            if linux.is_available() {
                tracing::info!("Auto-detected Linux MIC platform");
                Arc::new(linux)
            } else {
                tracing::warn!("MIC sysfs tree not found, using mock platform");
                Arc::new(MockPlatform::new(settings.mock))
            }
        }
        PlatformKind::Linux => Arc::new(LinuxPlatform::new(settings)),
        PlatformKind::Mock => Arc::new(MockPlatform::new(settings.mock)),
    }
}
