//! Discovered GPU records
//!
//! [`DeviceSnapshot`] is what one discovery pass produced; [`UsableDevice`] is
//! what the reconciliation step hands to device assignment.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Product name used when none was reported
pub const UNKNOWN_PRODUCT_NAME: &str = "N/A";

/// Information about a single discovered GPU
///
/// Serializes as `product_name` (the qualified name), `platform_id`,
/// `device_id` and `global_mem_size`. Consumers parse these field names and
/// the underscore-joined identity, so they must not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerDeviceInfo {
    product_name: String,
    platform_id: Option<u32>,
    device_id: Option<u32>,
    global_mem_size: Option<u64>,
}

impl PerDeviceInfo {
    /// Create a fully populated record
    pub fn new(
        product_name: impl Into<String>,
        platform_id: u32,
        device_id: u32,
        global_mem_size: u64,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            platform_id: Some(platform_id),
            device_id: Some(device_id),
            global_mem_size: Some(global_mem_size),
        }
    }

    /// Product name as reported or as requested by the caller
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    /// `<product_name>_<platform_id>_<device_id>`
    ///
    /// Absent ids render as `null`.
    pub fn qualified_product_name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.product_name,
            display_or_null(self.platform_id),
            display_or_null(self.device_id)
        )
    }

    pub fn platform_id(&self) -> Option<u32> {
        self.platform_id
    }

    pub fn device_id(&self) -> Option<u32> {
        self.device_id
    }

    /// Global memory size in bytes
    pub fn global_mem_size(&self) -> Option<u64> {
        self.global_mem_size
    }
}

impl Default for PerDeviceInfo {
    fn default() -> Self {
        Self {
            product_name: UNKNOWN_PRODUCT_NAME.to_string(),
            platform_id: None,
            device_id: None,
            global_mem_size: None,
        }
    }
}

fn display_or_null<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

impl Serialize for PerDeviceInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PerDeviceInfo", 4)?;
        state.serialize_field("product_name", &self.qualified_product_name())?;
        state.serialize_field("platform_id", &self.platform_id)?;
        state.serialize_field("device_id", &self.device_id)?;
        state.serialize_field("global_mem_size", &self.global_mem_size)?;
        state.end()
    }
}

impl fmt::Display for PerDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProductName={}", self.product_name)?;
        if let Some(platform_id) = self.platform_id {
            write!(f, ", PlatformId={}", platform_id)?;
        }
        if let Some(device_id) = self.device_id {
            write!(f, ", DeviceId={}", device_id)?;
        }
        if let Some(size) = self.global_mem_size {
            write!(f, ", GlobalMemorySize={} bytes", size)?;
        }
        Ok(())
    }
}

/// Result of one discovery pass
///
/// Entries are in enumeration order: platform ascending, then device
/// ascending. A snapshot is never modified after construction; a new pass
/// produces a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    gpus: Vec<PerDeviceInfo>,
    discovered_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    /// Create a snapshot stamped with the current time
    pub fn new(gpus: Vec<PerDeviceInfo>) -> Self {
        Self {
            gpus,
            discovered_at: Utc::now(),
        }
    }

    pub fn gpus(&self) -> &[PerDeviceInfo] {
        &self.gpus
    }

    pub fn len(&self) -> usize {
        self.gpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gpus.is_empty()
    }

    /// When the pass that produced this snapshot finished
    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }
}

impl fmt::Display for DeviceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceSnapshot({} GPUs", self.gpus.len())?;
        for gpu in &self.gpus {
            write!(f, "; {}", gpu)?;
        }
        write!(f, ")")
    }
}

/// A GPU admitted for assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsableDevice {
    /// Logical index used for assignment numbering
    pub index: u32,
    /// Platform the GPU belongs to
    pub platform_id: u32,
    /// Position of the GPU within its platform
    pub device_id: u32,
}

impl UsableDevice {
    pub fn new(index: u32, platform_id: u32, device_id: u32) -> Self {
        Self {
            index,
            platform_id,
            device_id,
        }
    }
}

impl fmt::Display for UsableDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(index={},platform_id={},device_id={})",
            self.index, self.platform_id, self.device_id
        )
    }
}
