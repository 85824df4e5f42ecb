//! Mock enumerator for testing

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{
    DeviceEnumerator, EnumerationError, EnumeratorKind, NativeDeviceHandle, NativeRef,
    PlatformHandle,
};

/// A simulated GPU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockGpu {
    /// Vendor-reported name
    pub name: String,
    /// Global memory in bytes
    pub global_mem_size: u64,
}

impl MockGpu {
    /// Create a simulated GPU
    pub fn new(name: impl Into<String>, global_mem_size: u64) -> Self {
        Self {
            name: name.into(),
            global_mem_size,
        }
    }
}

/// Mock enumerator for testing
///
/// Each inner vector is one platform. Native refs index into a flat list so
/// stale or foreign handles are detected.
pub struct MockEnumerator {
    platforms: Vec<Vec<MockGpu>>,
    /// Configurable failure simulation for the whole pass
    pub fail_enumeration: AtomicBool,
    /// Number of `list_platforms` calls seen
    passes: AtomicUsize,
}

impl MockEnumerator {
    /// Create a mock with one platform holding two 16GB Tesla V100 GPUs
    pub fn new() -> Self {
        Self::with_platforms(vec![vec![
            MockGpu::new("Tesla V100-SXM2", 16 * 1024 * 1024 * 1024),
            MockGpu::new("Tesla V100-SXM2", 16 * 1024 * 1024 * 1024),
        ]])
    }

    /// Create a mock with the given platform layout
    pub fn with_platforms(platforms: Vec<Vec<MockGpu>>) -> Self {
        Self {
            platforms,
            fail_enumeration: AtomicBool::new(false),
            passes: AtomicUsize::new(0),
        }
    }

    /// Set whether enumeration should fail
    pub fn set_fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Number of discovery passes started against this mock
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), EnumerationError> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(EnumerationError::Query(
                "Mock enumeration failure".to_string(),
            ));
        }
        Ok(())
    }

    fn gpu(&self, device: &NativeDeviceHandle) -> Result<&MockGpu, EnumerationError> {
        self.check_failure()?;
        self.platforms
            .get(device.platform_id as usize)
            .and_then(|devices| devices.get(device.device_id as usize))
            .ok_or_else(|| EnumerationError::DeviceNotFound(device.to_string()))
    }
}

impl Default for MockEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceEnumerator for MockEnumerator {
    fn list_platforms(&self) -> Result<Vec<PlatformHandle>, EnumerationError> {
        self.passes.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok((0..self.platforms.len() as u32)
            .map(|pid| PlatformHandle::new(pid, NativeRef::new(pid)))
            .collect())
    }

    fn list_devices(
        &self,
        platform: &PlatformHandle,
    ) -> Result<Vec<NativeDeviceHandle>, EnumerationError> {
        self.check_failure()?;
        let devices = self
            .platforms
            .get(platform.native_ref().raw() as usize)
            .ok_or(EnumerationError::PlatformNotFound(platform.platform_id))?;

        Ok((0..devices.len() as u32)
            .map(|did| NativeDeviceHandle::new(platform.platform_id, did, NativeRef::new(did)))
            .collect())
    }

    fn device_name(&self, device: &NativeDeviceHandle) -> Result<String, EnumerationError> {
        Ok(self.gpu(device)?.name.clone())
    }

    fn device_memory_size(&self, device: &NativeDeviceHandle) -> Result<u64, EnumerationError> {
        Ok(self.gpu(device)?.global_mem_size)
    }

    fn kind(&self) -> EnumeratorKind {
        EnumeratorKind::Mock
    }
}
