//! NVIDIA GPU enumeration
//!
//! Uses NVML (NVIDIA Management Library). NVML exposes every GPU through a
//! single driver instance, so it reports exactly one platform.

use nvml_wrapper::error::NvmlError;
use nvml_wrapper::{Device, Nvml};
use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use super::{
    DeviceEnumerator, EnumerationError, EnumeratorKind, NativeDeviceHandle, NativeRef,
    PlatformHandle,
};

/// Platform index NVML devices are reported under
const NVML_PLATFORM_ID: u32 = 0;

/// NVML-backed enumerator
///
/// Owns the NVML library context, loaded on first use so a node without the
/// NVIDIA driver fails the discovery pass rather than construction. Device
/// handles carry the NVML device index and are only meaningful while this
/// value is alive.
pub struct NvmlEnumerator {
    nvml: OnceCell<Nvml>,
}

impl NvmlEnumerator {
    /// Create an enumerator; NVML is loaded by the first query
    pub fn new() -> Self {
        Self {
            nvml: OnceCell::new(),
        }
    }

    /// Get or initialize the NVML context
    fn nvml(&self) -> Result<&Nvml, EnumerationError> {
        self.nvml.get_or_try_init(|| {
            let nvml = Nvml::init().map_err(|e| EnumerationError::LibraryInit(e.to_string()))?;
            debug!("NVML initialized");
            Ok(nvml)
        })
    }

    fn device(&self, handle: &NativeDeviceHandle) -> Result<Device<'_>, EnumerationError> {
        if handle.platform_id != NVML_PLATFORM_ID {
            return Err(EnumerationError::PlatformNotFound(handle.platform_id));
        }
        self.nvml()?
            .device_by_index(handle.native_ref().raw())
            .map_err(|e| EnumerationError::DeviceNotFound(format!("{}: {}", handle, e)))
    }
}

impl DeviceEnumerator for NvmlEnumerator {
    fn list_platforms(&self) -> Result<Vec<PlatformHandle>, EnumerationError> {
        self.nvml()?;
        Ok(vec![PlatformHandle::new(
            NVML_PLATFORM_ID,
            NativeRef::new(NVML_PLATFORM_ID),
        )])
    }

    fn list_devices(
        &self,
        platform: &PlatformHandle,
    ) -> Result<Vec<NativeDeviceHandle>, EnumerationError> {
        if platform.platform_id != NVML_PLATFORM_ID {
            return Err(EnumerationError::PlatformNotFound(platform.platform_id));
        }

        let count = match self.nvml()?.device_count() {
            Ok(count) => count,
            // No GPUs behind this driver
            Err(NvmlError::NotFound) => 0,
            Err(e) => return Err(EnumerationError::Query(e.to_string())),
        };

        trace!(platform = platform.platform_id, count = count, "NVML device count");

        Ok((0..count)
            .map(|i| NativeDeviceHandle::new(platform.platform_id, i, NativeRef::new(i)))
            .collect())
    }

    fn device_name(&self, device: &NativeDeviceHandle) -> Result<String, EnumerationError> {
        self.device(device)?
            .name()
            .map_err(|e| EnumerationError::Query(format!("name of {}: {}", device, e)))
    }

    fn device_memory_size(&self, device: &NativeDeviceHandle) -> Result<u64, EnumerationError> {
        let memory_info = self.device(device)?.memory_info().map_err(|e| {
            EnumerationError::Query(format!("memory info of {}: {}", device, e))
        })?;
        Ok(memory_info.total)
    }

    fn kind(&self) -> EnumeratorKind {
        EnumeratorKind::Nvml
    }
}

impl Default for NvmlEnumerator {
    fn default() -> Self {
        Self::new()
    }
}
