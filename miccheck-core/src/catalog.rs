//! Registry of known checks
//!
//! Platforms register every check they provide once at startup. Each run
//! asks the catalog for fresh [`DiagnosticTest`] instances.

use std::collections::BTreeSet;

use tracing::debug;

use crate::check::{DiagnosticTest, Probe, Scope, TestMeta};
use crate::device::DeviceSelection;
use crate::error::{CatalogError, ValidationError};
use crate::runner::TestSuite;

type ProbeFactory = Box<dyn Fn() -> Box<dyn Probe> + Send + Sync>;

struct Registration {
    meta: TestMeta,
    factory: ProbeFactory,
}

impl Registration {
    fn instantiate(&self) -> DiagnosticTest {
        DiagnosticTest::new(self.meta, (self.factory)())
    }
}

/// Names of the optional checks turned on for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledTests {
    names: BTreeSet<String>,
}

impl EnabledTests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for EnabledTests {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Check metadata plus the probe factories
#[derive(Default)]
pub struct TestCatalog {
    entries: Vec<Registration>,
}

impl TestCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a check; names must be unique
    pub fn register<F, P>(&mut self, meta: TestMeta, factory: F) -> Result<(), CatalogError>
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Probe + 'static,
    {
        if self.contains(meta.name) {
            return Err(CatalogError::Duplicate(meta.name));
        }
        debug!(test = meta.name, scope = %meta.scope, kind = %meta.kind, "registered test");
        self.entries.push(Registration {
            meta,
            factory: Box::new(move || Box::new(factory())),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|r| r.meta.name == name)
    }

    /// Metadata of every registered check, in registration order
    pub fn metas(&self) -> impl Iterator<Item = &TestMeta> {
        self.entries.iter().map(|r| &r.meta)
    }

    /// Metadata and progress label of every registered check
    pub fn describe_all(&self) -> Vec<(TestMeta, String)> {
        self.entries
            .iter()
            .map(|r| (r.meta, (r.factory)().describe().to_string()))
            .collect()
    }

    /// Names accepted by [`EnabledTests`]
    pub fn optional_names(&self) -> Vec<&'static str> {
        self.metas()
            .filter(|m| m.is_optional())
            .map(|m| m.name)
            .collect()
    }

    /// Reject enabled names that are not optional checks of this catalog
    pub fn validate_enabled(&self, enabled: &EnabledTests) -> Result<(), ValidationError> {
        let known = self.optional_names();
        match enabled
            .iter()
            .find(|name| !known.iter().any(|k| k == name))
        {
            Some(name) => Err(ValidationError::UnknownTest(name.to_string())),
            None => Ok(()),
        }
    }

    /// Default tests of `scope` in registration order
    pub fn defaults(&self, scope: Scope) -> Vec<DiagnosticTest> {
        self.entries
            .iter()
            .filter(|r| !r.meta.is_optional() && r.meta.scope == scope)
            .map(Registration::instantiate)
            .collect()
    }

    /// Enabled optional tests of `scope`, ascending by order key
    ///
    /// The sort is stable so equal keys keep registration order.
    pub fn filter_enabled(&self, scope: Scope, enabled: &EnabledTests) -> Vec<DiagnosticTest> {
        let mut selected: Vec<&Registration> = self
            .entries
            .iter()
            .filter(|r| r.meta.is_optional() && r.meta.scope == scope)
            .filter(|r| enabled.contains(r.meta.name))
            .collect();
        selected.sort_by_key(|r| r.meta.order);
        selected.into_iter().map(Registration::instantiate).collect()
    }

    /// One independently built list per selected device
    pub fn per_device<F>(&self, devices: &DeviceSelection, build: F) -> Vec<Vec<DiagnosticTest>>
    where
        F: Fn(&Self) -> Vec<DiagnosticTest>,
    {
        devices.iter().map(|_| build(self)).collect()
    }

    /// Every collection a run needs
    pub fn build_suite(&self, enabled: &EnabledTests, devices: &DeviceSelection) -> TestSuite {
        TestSuite {
            default_host: self.defaults(Scope::Host),
            optional_host: self.filter_enabled(Scope::Host, enabled),
            default_device: self.per_device(devices, |c| c.defaults(Scope::Device)),
            optional_device: self.per_device(devices, |c| c.filter_enabled(Scope::Device, enabled)),
        }
    }
}
