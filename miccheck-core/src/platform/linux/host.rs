//! Host checks: PCI enumeration, drivers, SCIF nodes and mpssd

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::sysfs::SysfsLayout;
use crate::check::{CheckContext, Probe};
use crate::error::ProbeError;
use crate::platform::checks::{self, DRIVER_CARD_COUNT, DRIVER_LOADED, MPSS_DAEMON, PCI_CARD_COUNT};

/// Kernel modules of the x200 host stack
pub const REQUIRED_MODULES: [&str; 8] = [
    "mic_x200_dma",
    "scif_bus",
    "vop_bus",
    "cosm_bus",
    "scif",
    "vop",
    "mic_cosm",
    "mic_x200",
];

const INIT_PID: u32 = 1;

/// At least one coprocessor is visible on the PCI bus
pub struct PciCardCountProbe {
    sysfs: Arc<SysfsLayout>,
}

impl PciCardCountProbe {
    pub fn new(sysfs: Arc<SysfsLayout>) -> Self {
        Self { sysfs }
    }
}

#[async_trait]
impl Probe for PciCardCountProbe {
    fn describe(&self) -> &str {
        checks::label(&PCI_CARD_COUNT)
    }

    async fn probe(&self, _ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let count = self.sysfs.count_pci_cards().await.unwrap_or_else(|e| {
            debug!(error = %e, "PCI scan failed");
            0
        });
        if count < 1 {
            return Err(ProbeError::failed(
                "no Intel(R) Xeon Phi(TM) coprocessor devices detected",
            ));
        }
        Ok(())
    }
}

/// Every required module is loaded
pub struct DriverLoadedProbe {
    sysfs: Arc<SysfsLayout>,
}

impl DriverLoadedProbe {
    pub fn new(sysfs: Arc<SysfsLayout>) -> Self {
        Self { sysfs }
    }
}

#[async_trait]
impl Probe for DriverLoadedProbe {
    fn describe(&self) -> &str {
        checks::label(&DRIVER_LOADED)
    }

    async fn probe(&self, _ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let loaded = self.sysfs.loaded_modules().await?;
        let missing: Vec<&str> = REQUIRED_MODULES
            .iter()
            .copied()
            .filter(|m| !loaded.contains(*m))
            .collect();
        if !missing.is_empty() {
            return Err(ProbeError::failed(format!(
                "missing following drivers: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// The driver created one node per PCI-detected card
pub struct DriverCardCountProbe {
    sysfs: Arc<SysfsLayout>,
}

impl DriverCardCountProbe {
    pub fn new(sysfs: Arc<SysfsLayout>) -> Self {
        Self { sysfs }
    }
}

#[async_trait]
impl Probe for DriverCardCountProbe {
    fn describe(&self) -> &str {
        checks::label(&DRIVER_CARD_COUNT)
    }

    async fn probe(&self, _ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let pci = self.sysfs.count_pci_cards().await.unwrap_or(0);
        let nodes = self.sysfs.count_driver_cards().await?;
        debug!(pci, nodes, "comparing card counts");
        if nodes != pci {
            return Err(ProbeError::failed(
                "SCIF nodes do not match the number of PCI-detected devices",
            ));
        }
        Ok(())
    }
}

/// mpssd runs as a child of init
pub struct MpssDaemonProbe {
    sysfs: Arc<SysfsLayout>,
}

impl MpssDaemonProbe {
    pub fn new(sysfs: Arc<SysfsLayout>) -> Self {
        Self { sysfs }
    }
}

#[async_trait]
impl Probe for MpssDaemonProbe {
    fn describe(&self) -> &str {
        checks::label(&MPSS_DAEMON)
    }

    async fn probe(&self, _ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        if !self.sysfs.process_running("mpssd", INIT_PID).await? {
            return Err(ProbeError::failed("mpssd daemon not running"));
        }
        Ok(())
    }
}
