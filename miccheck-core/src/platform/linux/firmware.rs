//! Firmware version checks
//!
//! Compare the versions the card reports in sysfs with the configured ones.
//! SMC and NTB EEPROM expectations are looked up by the card's fab.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::sysfs::SysfsLayout;
use crate::check::{CheckContext, Probe, TestMeta};
use crate::error::ProbeError;
use crate::platform::checks::{self, BIOS_VERSION, ME_VERSION, NTB_EEPROM_VERSION, SMC_VERSION};
use crate::platform::FirmwareExpectations;

const FAB_ATTR: &str = "info/fab_version";

#[derive(Debug, Clone)]
enum Expected {
    Fixed(Option<String>),
    PerFab(BTreeMap<String, String>),
}

/// One firmware component compared against its expected version
pub struct FirmwareVersionProbe {
    meta: TestMeta,
    /// Component name used in messages, e.g. "BIOS"
    component: &'static str,
    attr: &'static str,
    expected: Expected,
    sysfs: Arc<SysfsLayout>,
}

impl FirmwareVersionProbe {
    pub fn bios(fw: &FirmwareExpectations, sysfs: Arc<SysfsLayout>) -> Self {
        Self {
            meta: BIOS_VERSION,
            component: "BIOS",
            attr: "info/bios_version",
            expected: Expected::Fixed(fw.bios.clone()),
            sysfs,
        }
    }

    pub fn smc(fw: &FirmwareExpectations, sysfs: Arc<SysfsLayout>) -> Self {
        Self {
            meta: SMC_VERSION,
            component: "SMC",
            attr: "info/bios_smc_version",
            expected: Expected::PerFab(fw.smc.clone()),
            sysfs,
        }
    }

    pub fn me(fw: &FirmwareExpectations, sysfs: Arc<SysfsLayout>) -> Self {
        Self {
            meta: ME_VERSION,
            component: "ME",
            attr: "info/bios_me_version",
            expected: Expected::Fixed(fw.me.clone()),
            sysfs,
        }
    }

    pub fn ntb_eeprom(fw: &FirmwareExpectations, sysfs: Arc<SysfsLayout>) -> Self {
        Self {
            meta: NTB_EEPROM_VERSION,
            component: "NTB EEPROM",
            attr: "info/ntb_eeprom_version",
            expected: Expected::PerFab(fw.ntb_eeprom.clone()),
            sysfs,
        }
    }

    async fn expected_version(&self, index: u32) -> Result<String, ProbeError> {
        match &self.expected {
            Expected::Fixed(Some(version)) => Ok(version.clone()),
            Expected::Fixed(None) => Err(ProbeError::failed(format!(
                "no expected {} firmware version configured",
                self.component
            ))),
            Expected::PerFab(versions) => {
                let fab = self
                    .sysfs
                    .device_attr(index, FAB_ATTR)
                    .await
                    .map_err(|_| ProbeError::failed("could not retrieve fab version"))?;
                versions.get(&fab).cloned().ok_or_else(|| {
                    ProbeError::failed(format!(
                        "no expected {} firmware version configured for fab '{}'",
                        self.component, fab
                    ))
                })
            }
        }
    }
}

#[async_trait]
impl Probe for FirmwareVersionProbe {
    fn describe(&self) -> &str {
        checks::label(&self.meta)
    }

    async fn probe(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let device = ctx.device()?;
        let expected = self.expected_version(device.index()).await?;
        let running = self
            .sysfs
            .device_attr(device.index(), self.attr)
            .await
            .map_err(|_| {
                ProbeError::failed(format!(
                    "could not retrieve {} firmware version",
                    self.component
                ))
            })?;

        if expected != running {
            return Err(ProbeError::failed(format!(
                "device {} version does not match, should be '{}', it is '{}'",
                self.component, expected, running
            )));
        }
        Ok(())
    }
}
