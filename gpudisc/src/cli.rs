//! CLI argument parsing for GPUDISC

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// GPU discovery - reports the GPUs on this node that can be assigned to workloads
#[derive(Debug, Parser)]
#[command(name = "gpudisc")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/gpudisc/config.yaml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "GPUDISC_LOG_LEVEL")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long, default_value = "false", env = "GPUDISC_LOG_JSON")]
    pub log_json: bool,

    /// Allowed devices: "auto" or index:platform_id:device_id,... (overrides config)
    #[arg(long, env = "GPUDISC_ALLOWED_DEVICES")]
    pub allowed_devices: Option<String>,

    /// Only discover GPUs with this product name (overrides config)
    #[arg(long)]
    pub product_name: Option<String>,

    /// Only report usable GPUs whose canonical name matches (overrides config)
    #[arg(long)]
    pub filter: Option<String>,

    /// Use simulated GPUs instead of NVML
    #[arg(long)]
    pub mock: bool,

    /// Report format
    #[arg(long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Print Prometheus metrics after the report
    #[arg(long)]
    pub print_metrics: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
