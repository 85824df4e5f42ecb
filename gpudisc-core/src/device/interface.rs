//! Native enumeration interface and handle types
//!
//! Defines the narrow contract every native GPU enumeration backend satisfies.
//! Nothing outside `device` talks to a native library directly.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enumeration backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnumeratorKind {
    /// NVIDIA Management Library
    #[default]
    Nvml,
    /// In-process test double
    Mock,
}

impl fmt::Display for EnumeratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumeratorKind::Nvml => write!(f, "nvml"),
            EnumeratorKind::Mock => write!(f, "mock"),
        }
    }
}

/// Opaque reference to a native object.
///
/// Only the backend that produced it can interpret the value. It is
/// meaningless once the backend's library context is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeRef(u32);

impl NativeRef {
    /// Wrap a backend-specific lookup key
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Backend-specific lookup key
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// A platform returned by [`DeviceEnumerator::list_platforms`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformHandle {
    /// Position in the platform list (0-based)
    pub platform_id: u32,
    native_ref: NativeRef,
}

impl PlatformHandle {
    /// Create a platform handle
    pub fn new(platform_id: u32, native_ref: NativeRef) -> Self {
        Self {
            platform_id,
            native_ref,
        }
    }

    /// Opaque native reference
    pub fn native_ref(&self) -> NativeRef {
        self.native_ref
    }
}

/// A device paired with its enumeration coordinates.
///
/// Handles are produced fresh by every discovery pass and must not be kept
/// across passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeDeviceHandle {
    /// Platform the device was enumerated under
    pub platform_id: u32,
    /// Position of the device within its platform (0-based)
    pub device_id: u32,
    native_ref: NativeRef,
}

impl NativeDeviceHandle {
    /// Create a device handle
    pub fn new(platform_id: u32, device_id: u32, native_ref: NativeRef) -> Self {
        Self {
            platform_id,
            device_id,
            native_ref,
        }
    }

    /// Opaque native reference
    pub fn native_ref(&self) -> NativeRef {
        self.native_ref
    }
}

impl fmt::Display for NativeDeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPU{}:{}", self.platform_id, self.device_id)
    }
}

/// Errors reported by an enumeration backend
#[derive(Debug, Error)]
pub enum EnumerationError {
    /// Native library could not be loaded or initialized
    #[error("Failed to initialize native GPU library: {0}")]
    LibraryInit(String),

    /// A native query failed
    #[error("Failed to query GPU: {0}")]
    Query(String),

    /// Platform handle does not belong to this backend
    #[error("Platform not found: {0}")]
    PlatformNotFound(u32),

    /// Device handle does not belong to this backend
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
}

/// Native GPU enumeration contract
///
/// Platforms and devices come back in enumeration order. A platform that has
/// no GPUs yields an empty device list rather than an error.
pub trait DeviceEnumerator: Send + Sync {
    /// List all platforms in ascending order
    fn list_platforms(&self) -> Result<Vec<PlatformHandle>, EnumerationError>;

    /// List the GPUs of one platform in ascending order
    fn list_devices(
        &self,
        platform: &PlatformHandle,
    ) -> Result<Vec<NativeDeviceHandle>, EnumerationError>;

    /// Vendor-reported device name
    fn device_name(&self, device: &NativeDeviceHandle) -> Result<String, EnumerationError>;

    /// Global memory size in bytes
    fn device_memory_size(&self, device: &NativeDeviceHandle) -> Result<u64, EnumerationError>;

    /// Backend kind
    fn kind(&self) -> EnumeratorKind;
}
