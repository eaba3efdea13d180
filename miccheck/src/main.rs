//! miccheck
//!
//! Software sanity checks for hosts with Intel(R) Xeon Phi(TM) coprocessors.
//! Runs the default host checks, then per-device checks on the selected
//! cards, and prints a final `Status: OK` or `Status: FAIL`.

mod cli;
mod config;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use config::Config;
use miccheck_core::{
    create_platform, expand, CardInfo, ConsoleReporter, DeviceSelection, EnabledTests,
    HostnameMap, MetricsRegistry, Platform, Reporter, RunError, RunSummary, TestCatalog,
    TestRunner,
};

/// Initialize the tracing/logging subsystem
///
/// Logs go to stderr so they never mix with the report on stdout.
fn init_logging(log_level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

enum Outcome {
    Listed,
    Finished {
        summary: RunSummary,
        cards: Vec<CardInfo>,
        result: Result<(), RunError>,
    },
}

/// Result printed on stdout with `--json`
#[derive(Debug, Serialize)]
struct JsonReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cards: Vec<CardInfo>,
}

impl JsonReport {
    fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

/// 0 when nothing ran or every check passed, 1 otherwise
fn exit_code(report: Option<&JsonReport>) -> ExitCode {
    match report {
        Some(report) if !report.is_ok() => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        info!("Loading config from {:?}", path);
        Config::from_file(path)
    } else {
        warn!("Config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Write the metrics textfile atomically
fn write_metrics(metrics: &MetricsRegistry, path: &Path) -> Result<()> {
    let text = metrics.gather_text().context("Failed to encode metrics")?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, text).with_context(|| format!("Failed to write {:?}", tmp))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to rename {:?}", tmp))?;
    Ok(())
}

/// Expand the device expression and attach hostnames
///
/// Config hostnames go in first; `--devicehost` entries replace them per device.
fn select_devices(config: &Config, devicehost: Option<&str>, total: u32) -> Result<DeviceSelection> {
    let mut devices = expand(&config.device, total)?;
    let mut hostnames = HostnameMap::new();
    for (device, host) in &config.hostnames {
        hostnames.insert(device, host, total)?;
    }
    if let Some(expression) = devicehost {
        hostnames.merge(HostnameMap::parse(expression, total)?);
    }
    hostnames.apply(&mut devices);
    Ok(devices)
}

/// Query every selected card; failures are reported but do not fail the run
async fn collect_card_info<R: Reporter>(
    platform: &dyn Platform,
    devices: &DeviceSelection,
    reporter: &mut R,
) -> Vec<CardInfo> {
    reporter.out("Card information");
    let mut cards = Vec::with_capacity(devices.len());
    for device in devices {
        match platform.card_info(device).await {
            Ok(info) => {
                reporter.out(&format!("  {}", info));
                cards.push(info);
            }
            Err(e) => reporter.err(&format!("  {}: {}", device.name(), e)),
        }
    }
    cards
}

async fn run<R: Reporter>(cli: &Cli, reporter: &mut R) -> Result<Outcome> {
    let mut config = load_config(&cli.config)?;
    cli.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;
    debug!(?config, "Effective configuration");

    let platform = create_platform(config.platform, config.platform_settings());
    info!(platform = %platform.kind(), "Platform initialized");

    let mut catalog = TestCatalog::new();
    platform
        .register_checks(&mut catalog)
        .context("Failed to register checks")?;

    if cli.list {
        for (meta, label) in catalog.describe_all() {
            reporter.out(&format!(
                "{:<20} {:<7} {:<9} {}",
                meta.name,
                meta.scope.to_string(),
                meta.kind.to_string(),
                label
            ));
        }
        return Ok(Outcome::Listed);
    }

    let enabled: EnabledTests = config.enabled.iter().cloned().collect();
    catalog.validate_enabled(&enabled)?;

    let total = match platform.detect_device_count().await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "Could not detect devices");
            0
        }
    };
    info!(devices = total, "Devices detected");

    let metrics = Arc::new(MetricsRegistry::new());
    metrics.set_devices_detected(total);

    let devices = select_devices(&config, cli.devicehost.as_deref(), total)?;
    metrics.set_devices_selected(devices.len());

    let suite = catalog.build_suite(&enabled, &devices);
    let mut runner = TestRunner::new(suite, &mut *reporter).with_metrics(metrics.clone());
    let result = runner.run(&devices).await.map(|_| ());
    let summary = runner.summary();

    metrics.set_run_result(result.is_ok(), summary.finished_at.timestamp());
    if let Some(path) = &config.metrics.textfile {
        if let Err(e) = write_metrics(&metrics, path) {
            warn!(error = %e, "Failed to export metrics");
        }
    }

    let cards = if cli.card_info && !devices.is_empty() {
        collect_card_info(platform.as_ref(), &devices, reporter).await
    } else {
        Vec::new()
    };

    Ok(Outcome::Finished {
        summary,
        cards,
        result,
    })
}

/// Print the status banner and build the `--json` report
///
/// Returns `None` when nothing ran (`--list`).
fn conclude<R: Reporter>(outcome: Result<Outcome>, reporter: &mut R) -> Option<JsonReport> {
    let (failure, summary, cards) = match outcome {
        Ok(Outcome::Listed) => return None,
        Ok(Outcome::Finished {
            summary,
            cards,
            result,
        }) => (result.err().map(anyhow::Error::from), Some(summary), cards),
        Err(e) => (Some(e), None, Vec::new()),
    };

    reporter.out("");
    let failure = match failure {
        None => {
            reporter.out("Status: OK");
            None
        }
        Some(e) => {
            let message = format!("{:#}", e);
            reporter.out("Status: FAIL");
            reporter.err(&format!("Failure: {}", message));
            Some(message)
        }
    };

    Some(JsonReport {
        status: if failure.is_none() { "ok" } else { "fail" },
        failure,
        summary,
        cards,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.effective_log_level(), cli.log_json);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let mut reporter = if cli.json {
        ConsoleReporter::stderr_only()
    } else {
        ConsoleReporter::new()
    };

    let outcome = runtime.block_on(run(&cli, &mut reporter));
    // Blocking work abandoned after a timeout must not hold the exit
    runtime.shutdown_background();

    let report = conclude(outcome, &mut reporter);
    if let (true, Some(report)) = (cli.json, &report) {
        match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!(error = %e, "Failed to encode report"),
        }
    }
    exit_code(report.as_ref())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use miccheck_core::BufferReporter;

    use super::*;

    const MISSING_CONFIG: &str = "/nonexistent/miccheck/config.yaml";

    fn mock_cli(args: &[&str]) -> Cli {
        let mut argv = vec!["miccheck", "--platform", "mock", "--config", MISSING_CONFIG];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn config_file(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    fn cli_with_config(file: &tempfile::NamedTempFile, args: &[&str]) -> Cli {
        let path = file.path().to_str().unwrap();
        let mut argv = vec!["miccheck", "--platform", "mock", "--config", path];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn test_mock_run_passes() {
        let mut reporter = BufferReporter::new();
        let outcome = run(&mock_cli(&[]), &mut reporter).await.unwrap();

        let Outcome::Finished {
            summary,
            cards,
            result,
        } = outcome
        else {
            panic!("expected a finished run");
        };
        assert!(result.is_ok());
        assert!(cards.is_empty());
        // four host checks, two device checks on each of the two mock cards
        assert_eq!(summary.executed, 8);
        assert!(reporter.err.is_empty());
        assert_eq!(reporter.out[0], "Executing default tests for host");

        let outcome = Ok(Outcome::Finished {
            summary,
            cards,
            result,
        });
        let report = conclude(outcome, &mut reporter).unwrap();
        assert!(report.is_ok());
        assert_eq!(exit_code(Some(&report)), ExitCode::SUCCESS);
        assert_eq!(reporter.out[reporter.out.len() - 2..], ["", "Status: OK"]);
    }

    #[tokio::test]
    async fn test_invalid_selection_runs_nothing() {
        let mut reporter = BufferReporter::new();
        let err = run(&mock_cli(&["-d", "mic0,mic9"]), &mut reporter)
            .await
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "requested devices cannot be greater than available devices"
        );
        assert!(reporter.out.is_empty());
        assert!(reporter.err.is_empty());

        let report = conclude(Err(err), &mut reporter).unwrap();
        assert_eq!(exit_code(Some(&report)), ExitCode::FAILURE);
        assert_eq!(reporter.out, vec!["", "Status: FAIL"]);
        assert_eq!(
            reporter.err,
            vec!["Failure: requested devices cannot be greater than available devices"]
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "fail");
        assert_eq!(
            json["failure"],
            "requested devices cannot be greater than available devices"
        );
        assert!(json.get("summary").is_none());
    }

    #[tokio::test]
    async fn test_unknown_enabled_check_is_rejected() {
        let mut reporter = BufferReporter::new();
        let err = run(&mock_cli(&["--enable", "bogus"]), &mut reporter)
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "unknown test: bogus");
        assert!(reporter.out.is_empty());
        assert!(reporter.err.is_empty());
    }

    #[tokio::test]
    async fn test_devicehost_overrides_config_hostnames() {
        let file = config_file("hostnames:\n  mic0: cfg-host0\n  mic1: cfg-host1\n");
        let cli = cli_with_config(&file, &["--devicehost", "mic1:cli-host1"]);

        let mut config = load_config(&cli.config).unwrap();
        cli.apply_to(&mut config);
        let devices = select_devices(&config, cli.devicehost.as_deref(), 2).unwrap();
        let aliases: Vec<&str> = devices.iter().map(|d| d.alias()).collect();
        assert_eq!(aliases, vec!["cfg-host0", "cli-host1"]);

        let cli = cli_with_config(&file, &["--devicehost", "mic1:cli-host1", "--card-info"]);
        let mut reporter = BufferReporter::new();
        let Outcome::Finished { cards, result, .. } = run(&cli, &mut reporter).await.unwrap()
        else {
            panic!("expected a finished run");
        };
        assert!(result.is_ok());
        let hostnames: Vec<&str> = cards.iter().map(|c| c.hostname.as_str()).collect();
        assert_eq!(hostnames, vec!["cfg-host0", "cli-host1"]);
        assert!(reporter.out.contains(&"Card information".to_string()));
    }

    #[tokio::test]
    async fn test_device_failure_reports_fail() {
        let file = config_file("mock:\n  failing: [ping@mic1]\n");
        let cli = cli_with_config(&file, &["-p", "--card-info"]);

        let mut reporter = BufferReporter::new();
        let outcome = run(&cli, &mut reporter).await;
        let report = conclude(outcome, &mut reporter).unwrap();

        assert_eq!(exit_code(Some(&report)), ExitCode::FAILURE);
        assert_eq!(report.failure.as_deref(), Some("A device test failed"));
        assert_eq!(report.cards.len(), 2);
        assert_eq!(reporter.out.last().map(String::as_str), Some("Status: FAIL"));
        assert_eq!(
            reporter.err.last().map(String::as_str),
            Some("Failure: A device test failed")
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["cards"][0]["bios"]["cluster"], "quadrant");
    }

    #[tokio::test]
    async fn test_invalid_mock_failure_is_rejected() {
        let file = config_file("mock:\n  failing: [driver_loaded@mic0]\n");
        let mut reporter = BufferReporter::new();
        let err = run(&cli_with_config(&file, &[]), &mut reporter)
            .await
            .err()
            .unwrap();
        assert_eq!(
            format!("{:#}", err),
            "Failed to register checks: invalid mock failure 'driver_loaded@mic0': host checks do not run per device"
        );
        assert!(reporter.out.is_empty());
    }

    #[tokio::test]
    async fn test_list_prints_checks_only() {
        let mut reporter = BufferReporter::new();
        let outcome = run(&mock_cli(&["--list"]), &mut reporter).await;
        assert_eq!(reporter.out.len(), 13);
        assert!(reporter.out[0].starts_with("pci_card_count"));

        let report = conclude(outcome, &mut reporter);
        assert!(report.is_none());
        assert_eq!(exit_code(report.as_ref()), ExitCode::SUCCESS);
        assert_eq!(reporter.out.len(), 13);
    }
}
