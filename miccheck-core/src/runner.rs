//! Test runner
//!
//! Executes host and per-device tests in a fixed order:
//!
//! 1. default host tests, the first failure aborts the run
//! 2. optional host tests, failures are recorded
//! 3. for each device, its default tests (first failure stops that device)
//!    followed by its optional tests when every default passed
//!
//! Tests run one at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::check::{CheckContext, DiagnosticTest, TestStatus};
use crate::device::{Device, DeviceSelection};
use crate::error::{CheckFailed, RunError, DEVICE_TEST_FAILED, OPTIONAL_HOST_FAILED};
use crate::metrics::MetricsRegistry;
use crate::report::Reporter;

/// Test collections of one run
///
/// Device collections hold one list per selected device, in selection order.
#[derive(Debug, Default)]
pub struct TestSuite {
    pub default_host: Vec<DiagnosticTest>,
    pub optional_host: Vec<DiagnosticTest>,
    pub default_device: Vec<Vec<DiagnosticTest>>,
    pub optional_device: Vec<Vec<DiagnosticTest>>,
}

impl TestSuite {
    fn all(&self) -> impl Iterator<Item = &DiagnosticTest> {
        self.default_host
            .iter()
            .chain(self.optional_host.iter())
            .chain(self.default_device.iter().flatten())
            .chain(self.optional_device.iter().flatten())
    }

    fn count(&self, status: TestStatus) -> usize {
        self.all().filter(|t| t.status() == status).count()
    }
}

/// Outcome counts of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub devices: usize,
    pub executed: usize,
    pub passed: usize,
    pub failed: usize,
    pub not_run: usize,
}

/// Runs a [`TestSuite`] against a device selection
pub struct TestRunner<R: Reporter> {
    suite: TestSuite,
    reporter: R,
    metrics: Option<Arc<MetricsRegistry>>,
    executed: usize,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    devices: usize,
}

impl<R: Reporter> TestRunner<R> {
    pub fn new(suite: TestSuite, reporter: R) -> Self {
        Self {
            suite,
            reporter,
            metrics: None,
            executed: 0,
            started_at: None,
            finished_at: None,
            devices: 0,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn suite(&self) -> &TestSuite {
        &self.suite
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Run every test, returning the counts or the overall failure
    pub async fn run(&mut self, devices: &DeviceSelection) -> Result<RunSummary, RunError> {
        self.started_at = Some(Utc::now());
        self.devices = devices.len();
        info!(devices = devices.len(), "starting test run");

        let mut suite = std::mem::take(&mut self.suite);
        let result = self.run_suite(&mut suite, devices).await;
        self.suite = suite;
        self.finished_at = Some(Utc::now());

        let summary = self.summary();
        info!(
            executed = summary.executed,
            passed = summary.passed,
            failed = summary.failed,
            "test run finished"
        );
        result.map(|()| summary)
    }

    /// Counts of the suite as it stands
    pub fn summary(&self) -> RunSummary {
        let now = Utc::now();
        RunSummary {
            started_at: self.started_at.unwrap_or(now),
            finished_at: self.finished_at.unwrap_or(now),
            devices: self.devices,
            executed: self.executed,
            passed: self.suite.count(TestStatus::Pass),
            failed: self.suite.count(TestStatus::Fail),
            not_run: self.suite.count(TestStatus::NotRun),
        }
    }

    async fn run_suite(
        &mut self,
        suite: &mut TestSuite,
        devices: &DeviceSelection,
    ) -> Result<(), RunError> {
        if !suite.default_host.is_empty() {
            self.reporter.out("Executing default tests for host");
            for test in suite.default_host.iter_mut() {
                self.run_test(test, None)
                    .await
                    .map_err(RunError::HostCheckFailed)?;
            }
        }

        let mut optional_host_failed = false;
        if !suite.optional_host.is_empty() {
            self.reporter.out("Executing optional tests for host");
            for test in suite.optional_host.iter_mut() {
                if self.run_test(test, None).await.is_err() {
                    optional_host_failed = true;
                }
            }
        }

        let mut device_failed = false;
        for (pos, device) in devices.iter().enumerate() {
            let defaults_ok = match suite.default_device.get_mut(pos) {
                Some(tests) => self.run_device_defaults(tests, device).await,
                None => true,
            };
            if !defaults_ok {
                device_failed = true;
                debug!(device = device.name(), "skipping optional tests after default failure");
                continue;
            }

            if let Some(tests) = suite.optional_device.get_mut(pos) {
                if !self.run_device_optionals(tests, device).await {
                    device_failed = true;
                }
            }
        }

        if optional_host_failed {
            Err(RunError::AggregateFailure(OPTIONAL_HOST_FAILED.to_string()))
        } else if device_failed {
            Err(RunError::AggregateFailure(DEVICE_TEST_FAILED.to_string()))
        } else {
            Ok(())
        }
    }

    /// Returns false on the first failure, leaving the rest not run
    async fn run_device_defaults(&mut self, tests: &mut [DiagnosticTest], device: &Device) -> bool {
        if tests.is_empty() {
            return true;
        }
        self.reporter
            .out(&format!("Executing default tests for device: {}", device.name()));
        for test in tests.iter_mut() {
            if self.run_test(test, Some(device)).await.is_err() {
                return false;
            }
        }
        true
    }

    /// Runs every test; returns false if any failed
    async fn run_device_optionals(&mut self, tests: &mut [DiagnosticTest], device: &Device) -> bool {
        if tests.is_empty() {
            return true;
        }
        self.reporter
            .out(&format!("Executing optional tests for device: {}", device.name()));
        let mut ok = true;
        for test in tests.iter_mut() {
            if self.run_test(test, Some(device)).await.is_err() {
                ok = false;
            }
        }
        ok
    }

    async fn run_test(
        &mut self,
        test: &mut DiagnosticTest,
        device: Option<&Device>,
    ) -> Result<(), CheckFailed> {
        let progress = match device {
            Some(d) => format!("  Test {} ({}): {}", self.executed, d.name(), test.describe()),
            None => format!("  Test {}: {}", self.executed, test.describe()),
        };
        let ctx = match device {
            Some(d) => CheckContext::for_device(d),
            None => CheckContext::host(),
        };

        let result = test.run(&ctx).await;
        self.executed += 1;

        match &result {
            Ok(()) => self.reporter.out(&format!("{} ... pass", progress)),
            Err(e) => self
                .reporter
                .err(&format!("{} ... fail\n    {}", progress, e.message)),
        }

        if let Some(metrics) = &self.metrics {
            let elapsed = test.elapsed().map(|d| d.as_secs_f64()).unwrap_or_default();
            let target = device.map(Device::name).unwrap_or("host");
            metrics.record_check(test.name(), test.meta().scope, target, test.status(), elapsed);
        }
        result
    }
}
