//! CLI argument parsing for miccheck

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use miccheck_core::platform::checks::{COI, FIRMWARE, PING, SSH};
use miccheck_core::PlatformKind;

use crate::config::Config;

/// Platform provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlatformArg {
    Auto,
    Linux,
    Mock,
}

impl From<PlatformArg> for PlatformKind {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Auto => PlatformKind::Auto,
            PlatformArg::Linux => PlatformKind::Linux,
            PlatformArg::Mock => PlatformKind::Mock,
        }
    }
}

/// miccheck - software sanity checks for Intel(R) Xeon Phi(TM) coprocessor hosts
#[derive(Debug, Parser)]
#[command(name = "miccheck")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Devices to check: "all", or a comma separated list of micN and micA-micB
    #[arg(short, long, value_name = "DEVICES")]
    pub device: Option<String>,

    /// Network hostnames of the devices, as micM:host1,micN:host2
    #[arg(long, value_name = "MAPPINGS")]
    pub devicehost: Option<String>,

    /// Check BIOS, SMC, ME and NTB EEPROM firmware versions
    #[arg(short, long)]
    pub firmware: bool,

    /// Check the devices answer ping
    #[arg(short, long)]
    pub ping: bool,

    /// Check the devices can be accessed through ssh
    #[arg(long)]
    pub ssh: bool,

    /// Check the COI daemon runs on the devices
    #[arg(short = 'c', long)]
    pub coi: bool,

    /// Enable optional checks by name
    #[arg(long, value_name = "CHECK", num_args = 1.., action = ArgAction::Append)]
    pub enable: Vec<String>,

    /// Platform provider (overrides config)
    #[arg(long, value_enum)]
    pub platform: Option<PlatformArg>,

    /// Timeout of each external call, e.g. "3s" (overrides config)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub probe_timeout: Option<Duration>,

    /// Path to configuration file
    #[arg(long, default_value = "/etc/miccheck/config.yaml", env = "MICCHECK_CONFIG")]
    pub config: PathBuf,

    /// Verbose logging, same as --log-level debug
    #[arg(short, long)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "error", env = "MICCHECK_LOG_LEVEL")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long, default_value = "false", env = "MICCHECK_LOG_JSON")]
    pub log_json: bool,

    /// Print the result as JSON on stdout; progress goes to stderr
    #[arg(long)]
    pub json: bool,

    /// Write Prometheus metrics to this textfile (overrides config)
    #[arg(long, value_name = "PATH")]
    pub metrics_file: Option<PathBuf>,

    /// List known checks and exit
    #[arg(long)]
    pub list: bool,

    /// Report systoolsd version and BIOS settings of each selected card
    #[arg(long)]
    pub card_info: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn effective_log_level(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// Optional checks turned on by flags
    pub fn enabled_checks(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        if self.firmware {
            names.extend(FIRMWARE.iter().map(|n| n.to_string()));
        }
        if self.ping {
            names.push(PING.name.to_string());
        }
        if self.ssh {
            names.push(SSH.name.to_string());
        }
        if self.coi {
            names.push(COI.name.to_string());
        }
        names.extend(self.enable.iter().cloned());
        names
    }

    /// Apply CLI overrides to the loaded configuration
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.device = device.clone();
        }
        if let Some(platform) = self.platform {
            config.platform = platform.into();
        }
        if let Some(timeout) = self.probe_timeout {
            config.probe_timeout = timeout;
        }
        if let Some(path) = &self.metrics_file {
            config.metrics.textfile = Some(path.clone());
        }
        for name in self.enabled_checks() {
            if !config.enabled.contains(&name) {
                config.enabled.push(name);
            }
        }
    }
}
