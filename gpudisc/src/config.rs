//! Configuration module for GPUDISC
//!
//! Loads and validates configuration from YAML files; CLI flags override it.

use std::path::Path;

use anyhow::{Context, Result};
use gpudisc_core::discovery::AUTOMATIC_DISCOVERY;
use gpudisc_core::{DiscoveryConfig, EnumeratorKind};
use serde::{Deserialize, Serialize};

/// Metrics export configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are printed after the report
    #[serde(default)]
    pub enabled: bool,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// GPU enumeration backend
    #[serde(default)]
    pub enumerator: EnumeratorKind,

    /// Only discover GPUs with this product name; canonicalized before use
    #[serde(default)]
    pub product_name: Option<String>,

    /// Only report usable GPUs whose canonical name matches
    #[serde(default)]
    pub filter_name: Option<String>,

    /// "auto" or index:platform_id:device_id,...
    #[serde(default = "default_allowed_devices")]
    pub allowed_devices: String,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enumerator: EnumeratorKind::default(),
            product_name: None,
            filter_name: None,
            allowed_devices: default_allowed_devices(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Validate the configuration
    ///
    /// `allowed_devices` is only parsed when devices are queried, so
    /// malformed entries surface as discovery errors.
    pub fn validate(&self) -> Result<()> {
        if matches!(&self.product_name, Some(name) if name.trim().is_empty()) {
            anyhow::bail!("product_name must not be empty when set");
        }
        if matches!(&self.filter_name, Some(name) if name.trim().is_empty()) {
            anyhow::bail!("filter_name must not be empty when set");
        }
        Ok(())
    }

    /// Resolved settings handed to the discoverer
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig::with_allowed_devices(self.allowed_devices.clone())
    }
}

fn default_allowed_devices() -> String {
    AUTOMATIC_DISCOVERY.to_string()
}
