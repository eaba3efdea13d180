//! Error types shared across the orchestration layer

use std::path::PathBuf;
use std::time::Duration;

use miccheck_scif::ScifError;
use thiserror::Error;

/// Message of the aggregate failure raised when an optional host test failed
pub const OPTIONAL_HOST_FAILED: &str = "An optional host test failed";

/// Message of the aggregate failure raised when any device test failed
pub const DEVICE_TEST_FAILED: &str = "A device test failed";

/// Malformed input detected before any test executes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("cannot specify 'all' in device list/range")]
    AllCombined,

    /// Every token that did not parse, already quoted
    #[error("invalid list/range: {}", .0.join(", "))]
    InvalidDeviceList(Vec<String>),

    #[error("requested devices cannot be greater than available devices")]
    DeviceOutOfRange,

    #[error("invalid hostname mapping: {}", .0.join(", "))]
    InvalidHostnameMapping(Vec<String>),

    #[error("duplicate hostname for {0}")]
    DuplicateHostname(String),

    #[error("cannot specify hostname for inexistent device {0}")]
    UnknownDevice(String),

    #[error("unknown test: {0}")]
    UnknownTest(String),
}

/// Catalog registration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("test '{0}' registered twice")]
    Duplicate(&'static str),

    #[error("invalid mock failure '{entry}': {reason}")]
    InvalidFailure { entry: String, reason: &'static str },
}

/// Failure raised by a probe body
///
/// Always contained at the test boundary and turned into a `Fail` status.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The check ran and its condition did not hold
    #[error("{0}")]
    Failed(String),

    /// A sysfs/procfs attribute could not be read
    #[error("could not read {}: {source}", path.display())]
    Attribute {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external program exited unsuccessfully
    #[error("Failed to execute '{command}': '{stderr}'")]
    Exec { command: String, stderr: String },

    #[error("{0} could not be found in the system")]
    ProgramNotFound(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Device-scoped probe invoked without a device
    #[error("no target device for device-scoped check")]
    MissingDevice,

    #[error(transparent)]
    Daemon(#[from] ScifError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ProbeError::Failed(msg.into())
    }
}

/// A single test finished with `Fail`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CheckFailed {
    /// Name of the failed test
    pub name: &'static str,
    /// Captured probe message
    pub message: String,
}

/// Outcome of a run that did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// A default host test failed; nothing after it ran
    #[error(transparent)]
    HostCheckFailed(CheckFailed),

    /// Optional host or device failures were recorded during the run
    #[error("{0}")]
    AggregateFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages() {
        let err = ValidationError::InvalidDeviceList(vec!["'mic'".into(), "'foo'".into()]);
        assert_eq!(err.to_string(), "invalid list/range: 'mic', 'foo'");
        assert_eq!(
            ValidationError::DeviceOutOfRange.to_string(),
            "requested devices cannot be greater than available devices"
        );
    }

    #[test]
    fn test_run_error_messages() {
        let failed = CheckFailed {
            name: "mpss_daemon",
            message: "mpssd daemon not running".to_string(),
        };
        assert_eq!(
            RunError::HostCheckFailed(failed).to_string(),
            "mpssd daemon not running"
        );
        assert_eq!(
            RunError::AggregateFailure(DEVICE_TEST_FAILED.to_string()).to_string(),
            "A device test failed"
        );
    }
}
