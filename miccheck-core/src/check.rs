//! Diagnostic test capability
//!
//! A [`Probe`] performs the actual check; a [`DiagnosticTest`] wraps one probe
//! with its immutable metadata and the run state.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{CheckFailed, ProbeError};

/// Order key of tests that are not ordered
pub const NO_ORDER: i32 = -1;

/// Where a test runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Once per run
    Host,
    /// Once per selected device
    Device,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Host => write!(f, "host"),
            Scope::Device => write!(f, "device"),
        }
    }
}

/// Mandatory or configuration-enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Default,
    Optional,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestKind::Default => write!(f, "default"),
            TestKind::Optional => write!(f, "optional"),
        }
    }
}

/// Immutable test metadata, declared as constants by each platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TestMeta {
    /// Unique key, also the configuration name
    pub name: &'static str,
    pub scope: Scope,
    pub kind: TestKind,
    /// Only compared between optional tests of the same scope
    pub order: i32,
}

impl TestMeta {
    pub const fn default_test(name: &'static str, scope: Scope) -> Self {
        Self {
            name,
            scope,
            kind: TestKind::Default,
            order: NO_ORDER,
        }
    }

    pub const fn optional(name: &'static str, scope: Scope, order: i32) -> Self {
        Self {
            name,
            scope,
            kind: TestKind::Optional,
            order,
        }
    }

    pub fn is_optional(&self) -> bool {
        self.kind == TestKind::Optional
    }
}

/// Run state of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    NotRun,
    Pass,
    Fail,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::NotRun => write!(f, "not run"),
            TestStatus::Pass => write!(f, "pass"),
            TestStatus::Fail => write!(f, "fail"),
        }
    }
}

/// What a probe runs against
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckContext<'a> {
    device: Option<&'a Device>,
}

impl<'a> CheckContext<'a> {
    pub fn host() -> Self {
        Self { device: None }
    }

    pub fn for_device(device: &'a Device) -> Self {
        Self {
            device: Some(device),
        }
    }

    /// Target device of a device-scoped probe
    pub fn device(&self) -> Result<&'a Device, ProbeError> {
        self.device.ok_or(ProbeError::MissingDevice)
    }
}

/// One diagnostic check
#[async_trait]
pub trait Probe: Send + Sync {
    /// Progress label, e.g. "Check mpssd daemon is running"
    fn describe(&self) -> &str;

    /// Perform the check; any error marks the test as failed
    async fn probe(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError>;
}

/// A probe together with its metadata and run state
pub struct DiagnosticTest {
    meta: TestMeta,
    probe: Box<dyn Probe>,
    status: TestStatus,
    error_message: String,
    elapsed: Option<Duration>,
}

impl DiagnosticTest {
    pub fn new(meta: TestMeta, probe: Box<dyn Probe>) -> Self {
        Self {
            meta,
            probe,
            status: TestStatus::NotRun,
            error_message: String::new(),
            elapsed: None,
        }
    }

    pub fn meta(&self) -> &TestMeta {
        &self.meta
    }

    pub fn name(&self) -> &'static str {
        self.meta.name
    }

    pub fn status(&self) -> TestStatus {
        self.status
    }

    /// Empty unless the test failed
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn describe(&self) -> &str {
        self.probe.describe()
    }

    /// Probe duration of the finished run
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    fn failure(&self) -> CheckFailed {
        CheckFailed {
            name: self.meta.name,
            message: self.error_message.clone(),
        }
    }

    /// Run the probe once
    ///
    /// A finished test is not run again; its stored outcome is returned.
    pub async fn run(&mut self, ctx: &CheckContext<'_>) -> Result<(), CheckFailed> {
        match self.status {
            TestStatus::Pass => return Ok(()),
            TestStatus::Fail => return Err(self.failure()),
            TestStatus::NotRun => {}
        }

        let start = Instant::now();
        let result = self.probe.probe(ctx).await;
        let elapsed = start.elapsed();
        self.elapsed = Some(elapsed);
        let device = ctx.device.map(Device::name).unwrap_or("host");

        match result {
            Ok(()) => {
                self.status = TestStatus::Pass;
                debug!(test = self.meta.name, device, ?elapsed, "test passed");
                Ok(())
            }
            Err(e) => {
                self.status = TestStatus::Fail;
                self.error_message = e.to_string();
                warn!(
                    test = self.meta.name,
                    device,
                    ?elapsed,
                    error = %self.error_message,
                    "test failed"
                );
                Err(self.failure())
            }
        }
    }
}

impl fmt::Debug for DiagnosticTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticTest")
            .field("meta", &self.meta)
            .field("status", &self.status)
            .field("error_message", &self.error_message)
            .finish()
    }
}
