//! Default per-card checks

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::sysfs::SysfsLayout;
use crate::check::{CheckContext, Probe};
use crate::error::ProbeError;
use crate::platform::checks::{self, STATE_POST, SYSTOOLSD};

const STATE_ONLINE: &str = "online";
const POST_CODE_DONE: &str = "0xff";

/// Card is online and finished POST
pub struct DeviceStateProbe {
    sysfs: Arc<SysfsLayout>,
}

impl DeviceStateProbe {
    pub fn new(sysfs: Arc<SysfsLayout>) -> Self {
        Self { sysfs }
    }
}

#[async_trait]
impl Probe for DeviceStateProbe {
    fn describe(&self) -> &str {
        checks::label(&STATE_POST)
    }

    async fn probe(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let device = ctx.device()?;
        let state = self.sysfs.device_attr(device.index(), "state").await?;
        let post_code = self
            .sysfs
            .device_attr(device.index(), "spad/post_code")
            .await?;

        if !state.eq_ignore_ascii_case(STATE_ONLINE) {
            return Err(ProbeError::failed(format!("device is not online: {}", state)));
        }
        if !post_code.eq_ignore_ascii_case(POST_CODE_DONE) {
            return Err(ProbeError::failed(format!("POST code: {}", post_code)));
        }
        Ok(())
    }
}

/// systoolsd on the card answers over SCIF
pub struct SystoolsdProbe {
    timeout: Duration,
}

impl SystoolsdProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Probe for SystoolsdProbe {
    fn describe(&self) -> &str {
        checks::label(&SYSTOOLSD)
    }

    async fn probe(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let device = ctx.device()?;
        let resp = miccheck_scif::probe_systoolsd(device.index(), self.timeout).await?;
        debug!(device = device.name(), length = resp.length, "systoolsd answered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::platform::linux::sysfs::fixture::FakeSysfs;

    #[tokio::test]
    async fn test_state_and_post_code() {
        let fake = FakeSysfs::new();
        fake.card(0);
        let probe = DeviceStateProbe::new(Arc::new(fake.layout.clone()));
        let mic0 = Device::new(0);

        probe.probe(&CheckContext::for_device(&mic0)).await.unwrap();

        fake.attr(0, "state", "Online").attr(0, "spad/post_code", "0xFF");
        probe.probe(&CheckContext::for_device(&mic0)).await.unwrap();

        fake.attr(0, "spad/post_code", "0x3a");
        let err = probe.probe(&CheckContext::for_device(&mic0)).await.unwrap_err();
        assert_eq!(err.to_string(), "POST code: 0x3a");

        fake.attr(0, "state", "booting");
        let err = probe.probe(&CheckContext::for_device(&mic0)).await.unwrap_err();
        assert_eq!(err.to_string(), "device is not online: booting");
    }

    #[tokio::test]
    async fn test_state_of_missing_card() {
        let fake = FakeSysfs::new();
        let probe = DeviceStateProbe::new(Arc::new(fake.layout.clone()));
        let mic3 = Device::new(3);
        let err = probe.probe(&CheckContext::for_device(&mic3)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Attribute { .. }));
    }

    #[tokio::test]
    async fn test_systoolsd_needs_device() {
        let probe = SystoolsdProbe::new(Duration::from_millis(100));
        let err = probe.probe(&CheckContext::host()).await.unwrap_err();
        assert!(matches!(err, ProbeError::MissingDevice));
    }
}
