//! GPU Discovery (GPUDISC)
//!
//! Host process for the discovery core. Enumerates the GPUs on this node,
//! reconciles them with the configured device list and prints the devices
//! that can be assigned to workloads.

mod cli;
mod config;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, OutputFormat};
use config::Config;
use gpudisc_core::metrics::MetricsRegistry;
use gpudisc_core::{
    canonicalize, create_enumerator, DeviceSnapshot, EnumeratorKind, GpuDiscoverer, UsableDevice,
};

/// Initialize the tracing/logging subsystem
fn init_logging(log_level: &str, json_format: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // Logs go to stderr so the report on stdout stays parseable
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

/// What gets printed for the operator or the calling resource manager
#[derive(Debug, Serialize)]
struct Report<'a> {
    enumerator: EnumeratorKind,
    snapshot: Option<&'a DeviceSnapshot>,
    usable_devices: Vec<UsableDevice>,
}

/// Apply CLI overrides on top of the file configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if cli.mock {
        config.enumerator = EnumeratorKind::Mock;
    }
    if let Some(allowed) = &cli.allowed_devices {
        config.allowed_devices = allowed.clone();
    }
    if cli.product_name.is_some() {
        config.product_name = cli.product_name.clone();
    }
    if cli.filter.is_some() {
        config.filter_name = cli.filter.clone();
    }
    if cli.print_metrics {
        config.metrics.enabled = true;
    }
}

fn render(report: &Report<'_>, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("Failed to serialize report as JSON")
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(report).context("Failed to serialize report as YAML")
        }
    }
}

/// Run discovery and print the report
async fn run(config: Config, format: OutputFormat) -> Result<()> {
    let discovery_config = config.discovery_config();
    let product_name = config.product_name.as_deref().map(canonicalize);
    let filter_name = config.filter_name.as_deref().map(canonicalize);
    let kind = config.enumerator;

    // Native enumeration blocks, keep it off the async workers
    let discoverer = tokio::task::spawn_blocking(move || {
        let discoverer = GpuDiscoverer::new(create_enumerator(kind));
        discoverer.initialize(discovery_config, product_name.as_deref());
        discoverer
    })
    .await
    .context("Discovery task failed")?;

    let snapshot = discoverer.last_snapshot();
    if snapshot.is_none() {
        warn!("No GPU snapshot available");
    }

    let usable_devices = discoverer
        .get_usable_devices(filter_name.as_deref())
        .map_err(|e| {
            error!(error = %e, "Failed to determine usable GPU devices");
            e
        })
        .context("Failed to determine usable GPU devices")?;

    info!(count = usable_devices.len(), "Usable GPU devices determined");

    let report = Report {
        enumerator: kind,
        snapshot: snapshot.as_deref(),
        usable_devices,
    };
    println!("{}", render(&report, format)?);

    if config.metrics.enabled {
        print!("{}", MetricsRegistry::new().render());
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(&cli.log_level, cli.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "GPUDISC starting");

    // Load configuration
    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("Failed to load config from {:?}", cli.config))?
    } else {
        warn!(path = ?cli.config, "Config file not found, using defaults");
        Config::default()
    };

    apply_overrides(&mut config, &cli);

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    info!(
        enumerator = %config.enumerator,
        allowed_devices = %config.allowed_devices,
        "Configuration loaded"
    );

    run(config, cli.format).await
}
