//! miccheck Core Library
//!
//! Diagnostic test orchestration for Intel(R) Xeon Phi(TM) coprocessor hosts.
//! This crate provides device selection, the test capability and catalog,
//! the runner with its failure rules, and the platform providers.

pub mod catalog;
pub mod check;
pub mod device;
pub mod error;
pub mod metrics;
pub mod platform;
pub mod report;
pub mod runner;

// Re-export common types
pub use catalog::{EnabledTests, TestCatalog};
pub use check::{CheckContext, DiagnosticTest, Probe, Scope, TestKind, TestMeta, TestStatus};
pub use device::{expand, Device, DeviceSelection, HostnameMap};
pub use error::{CatalogError, CheckFailed, ProbeError, RunError, ValidationError};
pub use metrics::MetricsRegistry;
pub use platform::{
    create_platform, CardInfo, FirmwareExpectations, MockSettings, Platform, PlatformKind,
    PlatformSettings,
};
pub use report::{BufferReporter, ConsoleReporter, Reporter};
pub use runner::{RunSummary, TestRunner, TestSuite};
