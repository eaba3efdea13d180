//! Mock platform for testing and dry runs

use async_trait::async_trait;
use miccheck_scif::{CardReport, MicBiosProperty, SyscfgSettings, SystoolsdInfo};
use tracing::debug;

use super::checks::{self, DEFAULT_DEVICE, DEFAULT_HOST, OPTIONAL_DEVICE, SYSTOOLSD};
use super::{CardInfo, MockSettings, Platform, PlatformKind};
use crate::catalog::TestCatalog;
use crate::check::{CheckContext, Probe, Scope, TestMeta};
use crate::device::{Device, DEVICE_PREFIX};
use crate::error::{CatalogError, ProbeError};

/// Settings word every mock card reports: quadrant cluster mode, ECC enabled
const MOCK_BIOS_WORD: u64 = 4 | (1 << 4);

/// Probe with a scripted outcome
#[derive(Debug, Clone)]
pub struct MockProbe {
    label: String,
    failure: Option<String>,
    /// Device ordinals to fail on; empty fails every target
    fail_on: Vec<u32>,
}

impl MockProbe {
    pub fn passing(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            failure: None,
            fail_on: Vec::new(),
        }
    }

    pub fn failing(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            failure: Some(message.into()),
            fail_on: Vec::new(),
        }
    }

    pub fn failing_on(label: impl Into<String>, message: impl Into<String>, device: u32) -> Self {
        Self {
            fail_on: vec![device],
            ..Self::failing(label, message)
        }
    }
}

#[async_trait]
impl Probe for MockProbe {
    fn describe(&self) -> &str {
        &self.label
    }

    async fn probe(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        tokio::task::yield_now().await;

        let Some(message) = &self.failure else {
            return Ok(());
        };
        if !self.fail_on.is_empty() && !self.fail_on.contains(&ctx.device()?.index()) {
            return Ok(());
        }
        Err(ProbeError::failed(message.clone()))
    }
}

/// One parsed `failing` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Failure {
    name: &'static str,
    device: Option<u32>,
}

impl Failure {
    /// `name` or `name@micN`; the name must be a known check and only
    /// device checks take a device
    fn parse(entry: &str) -> Result<Self, CatalogError> {
        let invalid = |reason: &'static str| CatalogError::InvalidFailure {
            entry: entry.to_string(),
            reason,
        };
        let (name, device) = match entry.split_once('@') {
            Some((name, device)) => (name, Some(device)),
            None => (entry, None),
        };

        let meta = all_checks()
            .find(|m| m.name == name)
            .ok_or_else(|| invalid("no such check"))?;
        let device = match device {
            None => None,
            Some(_) if meta.scope == Scope::Host => {
                return Err(invalid("host checks do not run per device"))
            }
            Some(device) => Some(
                device
                    .strip_prefix(DEVICE_PREFIX)
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| invalid("device must be micN"))?,
            ),
        };
        Ok(Self {
            name: meta.name,
            device,
        })
    }

    fn hits(&self, name: &str, device: u32) -> bool {
        self.name == name && self.device.map_or(true, |d| d == device)
    }
}

fn all_checks() -> impl Iterator<Item = &'static TestMeta> {
    DEFAULT_HOST
        .iter()
        .chain(DEFAULT_DEVICE.iter())
        .chain(OPTIONAL_DEVICE.iter())
}

/// Platform that simulates a configurable number of cards
///
/// `failing` entries are check names, optionally suffixed with `@micN` to
/// fail on a single card only.
pub struct MockPlatform {
    settings: MockSettings,
}

impl MockPlatform {
    pub fn new(settings: MockSettings) -> Self {
        Self { settings }
    }

    pub fn with_device_count(count: u32) -> Self {
        Self::new(MockSettings {
            device_count: count,
            ..Default::default()
        })
    }

    fn failures(&self) -> Result<Vec<Failure>, CatalogError> {
        self.settings
            .failing
            .iter()
            .map(|entry| Failure::parse(entry))
            .collect()
    }

    fn probe_for(meta: &TestMeta, failures: &[Failure]) -> MockProbe {
        let label = checks::label(meta);
        let mine: Vec<&Failure> = failures.iter().filter(|f| f.name == meta.name).collect();
        if mine.is_empty() {
            return MockProbe::passing(label);
        }

        let mut probe = MockProbe::failing(label, format!("simulated failure of {}", meta.name));
        if mine.iter().all(|f| f.device.is_some()) {
            probe.fail_on = mine.iter().filter_map(|f| f.device).collect();
        }
        probe
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new(MockSettings::default())
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Mock
    }

    async fn detect_device_count(&self) -> Result<u32, ProbeError> {
        Ok(self.settings.device_count)
    }

    fn register_checks(&self, catalog: &mut TestCatalog) -> Result<(), CatalogError> {
        let failures = self.failures()?;
        for meta in all_checks() {
            let probe = Self::probe_for(meta, &failures);
            debug!(test = meta.name, failing = probe.failure.is_some(), "mock check");
            catalog.register(*meta, move || probe.clone())?;
        }
        Ok(())
    }

    /// A card whose systoolsd check is set to fail has no report either
    async fn card_info(&self, device: &Device) -> Result<CardInfo, ProbeError> {
        let failures = self.failures().map_err(|e| ProbeError::failed(e.to_string()))?;
        if failures.iter().any(|f| f.hits(SYSTOOLSD.name, device.index())) {
            return Err(ProbeError::failed(format!(
                "simulated failure of {}",
                SYSTOOLSD.name
            )));
        }

        let report = CardReport {
            systoolsd: SystoolsdInfo {
                major_ver: 1,
                minor_ver: 0,
            },
            bios: MicBiosProperty::ALL
                .iter()
                .map(|prop| (*prop, SyscfgSettings::new(MOCK_BIOS_WORD)))
                .collect(),
        };
        Ok(CardInfo::from_report(device, &report))
    }
}
