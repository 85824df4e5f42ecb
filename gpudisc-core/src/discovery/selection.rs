//! Device selection configuration
//!
//! `allowed_devices` is either `auto` or a comma-separated list of
//! `index:platform_id:device_id` triples.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::DiscoveryError;
use crate::snapshot::UsableDevice;

/// `allowed_devices` value that selects automatic discovery
pub const AUTOMATIC_DISCOVERY: &str = "auto";

static DEVICE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):(\d+):(\d+)$").expect("valid device token regex"));

/// Resolved discovery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// `auto` or `index:platform_id:device_id,...`
    #[serde(default = "default_allowed_devices")]
    pub allowed_devices: String,
}

impl DiscoveryConfig {
    /// Configuration with an explicit `allowed_devices` value
    pub fn with_allowed_devices(allowed_devices: impl Into<String>) -> Self {
        Self {
            allowed_devices: allowed_devices.into(),
        }
    }

    /// Parse `allowed_devices`
    pub fn selection(&self) -> Result<DeviceSelection, DiscoveryError> {
        DeviceSelection::parse(&self.allowed_devices)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            allowed_devices: default_allowed_devices(),
        }
    }
}

fn default_allowed_devices() -> String {
    AUTOMATIC_DISCOVERY.to_string()
}

/// How the usable device list is produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelection {
    /// Derive from the cached discovery snapshot
    Automatic,
    /// Administrator-supplied list, in the order given
    Manual(Vec<UsableDevice>),
}

impl DeviceSelection {
    /// Parse an `allowed_devices` string.
    ///
    /// Empty and whitespace-only tokens are skipped, so an empty string is
    /// an empty manual list.
    pub fn parse(value: &str) -> Result<Self, DiscoveryError> {
        if value.trim() == AUTOMATIC_DISCOVERY {
            return Ok(DeviceSelection::Automatic);
        }

        let mut devices = Vec::new();
        for token in value.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            devices.push(parse_device_token(token)?);
        }
        Ok(DeviceSelection::Manual(devices))
    }

    pub fn is_automatic(&self) -> bool {
        matches!(self, DeviceSelection::Automatic)
    }
}

fn parse_device_token(token: &str) -> Result<UsableDevice, DiscoveryError> {
    let malformed = || DiscoveryError::MalformedDeviceToken {
        token: token.to_string(),
    };

    let caps = DEVICE_TOKEN.captures(token).ok_or_else(malformed)?;
    let field = |i: usize| caps[i].parse::<u32>().map_err(|_| malformed());

    Ok(UsableDevice::new(field(1)?, field(2)?, field(3)?))
}
