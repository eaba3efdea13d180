//! Linux platform
//!
//! Reads the MPSS driver's sysfs tree and procfs, talks to systoolsd over
//! SCIF and shells out to ping/ssh for the network checks.

pub mod device;
pub mod firmware;
pub mod host;
pub mod network;
pub mod sysfs;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use self::device::{DeviceStateProbe, SystoolsdProbe};
use self::firmware::FirmwareVersionProbe;
use self::host::{DriverCardCountProbe, DriverLoadedProbe, MpssDaemonProbe, PciCardCountProbe};
use self::network::{CoiProbe, PingProbe, SshProbe};
pub use self::sysfs::SysfsLayout;
use super::checks::*;
use super::{CardInfo, FirmwareExpectations, Platform, PlatformKind, PlatformSettings};
use crate::catalog::TestCatalog;
use crate::device::Device;
use crate::error::{CatalogError, ProbeError};

type FirmwareBuilder = fn(&FirmwareExpectations, Arc<SysfsLayout>) -> FirmwareVersionProbe;

/// Hosts running the MPSS 4 stack
pub struct LinuxPlatform {
    sysfs: Arc<SysfsLayout>,
    settings: Arc<PlatformSettings>,
}

impl LinuxPlatform {
    pub fn new(settings: PlatformSettings) -> Self {
        Self::with_layout(settings, SysfsLayout::default())
    }

    pub fn with_layout(settings: PlatformSettings, layout: SysfsLayout) -> Self {
        Self {
            sysfs: Arc::new(layout),
            settings: Arc::new(settings),
        }
    }

    /// Whether the MIC class or the PCI tree can be read
    pub fn is_available(&self) -> bool {
        self.sysfs.mic_class.is_dir() || self.sysfs.pci_devices.is_dir()
    }
}

#[async_trait]
impl Platform for LinuxPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Linux
    }

    async fn detect_device_count(&self) -> Result<u32, ProbeError> {
        self.sysfs.count_pci_cards().await
    }

    fn register_checks(&self, catalog: &mut TestCatalog) -> Result<(), CatalogError> {
        let sysfs = &self.sysfs;
        let timeout = self.settings.probe_timeout;

        let s = sysfs.clone();
        catalog.register(PCI_CARD_COUNT, move || PciCardCountProbe::new(s.clone()))?;
        let s = sysfs.clone();
        catalog.register(DRIVER_LOADED, move || DriverLoadedProbe::new(s.clone()))?;
        let s = sysfs.clone();
        catalog.register(DRIVER_CARD_COUNT, move || DriverCardCountProbe::new(s.clone()))?;
        let s = sysfs.clone();
        catalog.register(MPSS_DAEMON, move || MpssDaemonProbe::new(s.clone()))?;

        let s = sysfs.clone();
        catalog.register(STATE_POST, move || DeviceStateProbe::new(s.clone()))?;
        catalog.register(SYSTOOLSD, move || SystoolsdProbe::new(timeout))?;

        let firmware_probes: [(_, FirmwareBuilder); 4] = [
            (BIOS_VERSION, FirmwareVersionProbe::bios),
            (SMC_VERSION, FirmwareVersionProbe::smc),
            (ME_VERSION, FirmwareVersionProbe::me),
            (NTB_EEPROM_VERSION, FirmwareVersionProbe::ntb_eeprom),
        ];
        for (meta, build) in firmware_probes {
            let s = sysfs.clone();
            let settings = self.settings.clone();
            catalog.register(meta, move || build(&settings.firmware, s.clone()))?;
        }

        catalog.register(PING, move || PingProbe::new(timeout))?;
        catalog.register(SSH, move || SshProbe::new(timeout))?;
        catalog.register(COI, move || CoiProbe::new(timeout))?;
        Ok(())
    }

    async fn card_info(&self, device: &Device) -> Result<CardInfo, ProbeError> {
        let report = miccheck_scif::query_card(device.index(), self.settings.probe_timeout).await?;
        debug!(device = device.name(), version = %report.systoolsd, "card report");
        Ok(CardInfo::from_report(device, &report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EnabledTests;
    use crate::check::{Scope, TestStatus};
    use crate::device::expand;
    use crate::error::RunError;
    use crate::platform::linux::sysfs::fixture::FakeSysfs;
    use crate::report::BufferReporter;
    use crate::runner::TestRunner;

    fn names(tests: &[crate::check::DiagnosticTest]) -> Vec<&'static str> {
        tests.iter().map(|t| t.name()).collect()
    }

    #[test]
    fn test_registration_order() {
        let platform = LinuxPlatform::new(PlatformSettings::default());
        let mut catalog = TestCatalog::new();
        platform.register_checks(&mut catalog).unwrap();

        assert_eq!(catalog.len(), 13);
        assert_eq!(
            names(&catalog.defaults(Scope::Host)),
            vec!["pci_card_count", "driver_loaded", "driver_card_count", "mpss_daemon"]
        );
        assert_eq!(
            names(&catalog.defaults(Scope::Device)),
            vec!["state_post", "systoolsd"]
        );

        let enabled: EnabledTests = ["coi", "ping", "bios_version"].into_iter().collect();
        assert_eq!(
            names(&catalog.filter_enabled(Scope::Device, &enabled)),
            vec!["bios_version", "ping", "coi"]
        );
    }

    #[tokio::test]
    async fn test_detect_and_availability() {
        let fake = FakeSysfs::new();
        fake.pci_device("0000:01:00.0", "0x8086", "0x2260");
        let platform =
            LinuxPlatform::with_layout(PlatformSettings::default(), fake.layout.clone());
        assert!(platform.is_available());
        assert_eq!(platform.detect_device_count().await.unwrap(), 1);

        let missing = LinuxPlatform::with_layout(
            PlatformSettings::default(),
            SysfsLayout::rooted(std::path::Path::new("/nonexistent/miccheck")),
        );
        assert!(!missing.is_available());
    }

    #[tokio::test]
    async fn test_host_failure_stops_run() {
        let fake = FakeSysfs::new();
        fake.pci_device("0000:01:00.0", "0x8086", "0x2260")
            .card(0)
            .modules(&host::REQUIRED_MODULES[..4]);
        let platform =
            LinuxPlatform::with_layout(PlatformSettings::default(), fake.layout.clone());
        let mut catalog = TestCatalog::new();
        platform.register_checks(&mut catalog).unwrap();

        let devices = expand("all", 1).unwrap();
        let suite = catalog.build_suite(&EnabledTests::new(), &devices);
        let mut runner = TestRunner::new(suite, BufferReporter::new());

        let err = runner.run(&devices).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing following drivers: scif, vop, mic_cosm, mic_x200"
        );
        assert!(matches!(err, RunError::HostCheckFailed(_)));

        let suite = runner.suite();
        assert_eq!(suite.default_host[0].status(), TestStatus::Pass);
        assert_eq!(suite.default_host[2].status(), TestStatus::NotRun);
        assert_eq!(suite.default_device[0][0].status(), TestStatus::NotRun);
    }

    #[tokio::test]
    async fn test_card_info_without_scif_library() {
        let settings = PlatformSettings {
            probe_timeout: std::time::Duration::from_secs(2),
            ..Default::default()
        };
        let platform = LinuxPlatform::new(settings);
        let err = platform.card_info(&crate::device::Device::new(0)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Daemon(_)));
    }
}
