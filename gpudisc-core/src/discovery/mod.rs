//! GPU discovery and usable-device reconciliation
//!
//! - [`GpuDiscoverer`]: runs discovery passes and caches the last snapshot
//! - [`DeviceSelection`]: automatic mode or an administrator device list
//! - [`canonicalize`]: the single name normalization point

mod discoverer;
mod selection;

pub use discoverer::GpuDiscoverer;
pub use selection::{DeviceSelection, DiscoveryConfig, AUTOMATIC_DISCOVERY};

use thiserror::Error;

use crate::device::EnumerationError;

/// Errors from discovery and reconciliation
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Discoverer used before `initialize`
    #[error("Please call initialize before using GpuDiscoverer")]
    NotInitialized,

    /// Automatic mode requested but no snapshot was ever discovered
    #[error(
        "allowed_devices is set to {auto}, however automatically discovering GPU \
         information failed, please check the log for more details. As an alternative, \
         an administrator can set allowed_devices manually (index:platform_id:device_id,...) \
         to enable GPU isolation.",
        auto = AUTOMATIC_DISCOVERY
    )]
    AutomaticDiscoveryUnavailable,

    /// A manual device list entry is not `index:platform_id:device_id`
    #[error("Illegal format, it should be index:platform_id:device_id format, now it={token}")]
    MalformedDeviceToken { token: String },

    /// Native enumeration failed
    #[error("GPU enumeration failed: {0}")]
    Enumeration(#[from] EnumerationError),
}

impl DiscoveryError {
    /// Whether this is an operator configuration problem rather than a
    /// native failure
    pub fn is_configuration(&self) -> bool {
        !matches!(self, DiscoveryError::Enumeration(_))
    }
}

/// Normalize a GPU product name: drop spaces and hyphens, lower-case the rest
///
/// Discovery and filtering must both go through this function so their keys
/// compare equal.
pub fn canonicalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("Tesla V100-SXM2"), "teslav100sxm2");
        assert_eq!(canonicalize("  "), "");
        assert_eq!(canonicalize(""), "");
        assert_eq!(canonicalize("GeForce GTX 1080 Ti"), "geforcegtx1080ti");
    }

    #[test]
    fn test_canonicalize_keeps_other_separators() {
        // Only spaces and hyphens are stripped
        assert_eq!(canonicalize("A100_PCIE\t40GB"), "a100_pcie\t40gb");
    }

    #[test]
    fn test_canonicalize_idempotent() {
        for name in [
            "Tesla V100-SXM2",
            "  NVIDIA A100-SXM4-80GB ",
            "radeon-pro_vii",
            "ÄBC - DEF",
            "",
        ] {
            let once = canonicalize(name);
            assert_eq!(canonicalize(&once), once, "not idempotent for {:?}", name);
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(DiscoveryError::NotInitialized.is_configuration());
        assert!(DiscoveryError::AutomaticDiscoveryUnavailable.is_configuration());
        assert!(DiscoveryError::MalformedDeviceToken {
            token: "0:0".to_string()
        }
        .is_configuration());
        assert!(!DiscoveryError::Enumeration(EnumerationError::Query("x".to_string()))
            .is_configuration());
    }

    #[test]
    fn test_operator_message() {
        let msg = DiscoveryError::AutomaticDiscoveryUnavailable.to_string();
        assert!(msg.contains("allowed_devices is set to auto"));
        assert!(msg.contains("manually"));

        let msg = DiscoveryError::MalformedDeviceToken {
            token: "0:0".to_string(),
        }
        .to_string();
        assert!(msg.ends_with("now it=0:0"));
    }
}
