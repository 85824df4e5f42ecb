//! GPU discoverer
//!
//! Lifecycle:
//! - Uninitialized: no configuration bound, every query fails
//! - Initialized: configuration bound, snapshot cached only if a discovery
//!   pass has succeeded
//!
//! All state lives behind one mutex, so discovery passes and usable-device
//! queries never interleave.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

use super::{canonicalize, DeviceSelection, DiscoveryConfig, DiscoveryError};
use crate::device::{DeviceEnumerator, EnumeratorKind};
use crate::metrics::{MetricsRegistry, PassOutcome};
use crate::snapshot::{DeviceSnapshot, PerDeviceInfo, UsableDevice};

#[derive(Default)]
struct DiscovererState {
    config: Option<DiscoveryConfig>,
    last_snapshot: Option<Arc<DeviceSnapshot>>,
}

/// Discovers GPUs and reconciles them into the usable device list
pub struct GpuDiscoverer {
    enumerator: Arc<dyn DeviceEnumerator>,
    metrics: MetricsRegistry,
    state: Mutex<DiscovererState>,
}

impl GpuDiscoverer {
    /// Create an uninitialized discoverer over the given enumerator
    pub fn new(enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        Self {
            enumerator,
            metrics: MetricsRegistry::new(),
            state: Mutex::new(DiscovererState::default()),
        }
    }

    /// Bind configuration and attempt one discovery pass.
    ///
    /// A failed or empty pass is logged and leaves any previously cached
    /// snapshot in place.
    pub fn initialize(&self, config: DiscoveryConfig, product_name: Option<&str>) {
        let mut state = self.lock();
        state.config = Some(config);

        info!(
            enumerator = %self.enumerator.kind(),
            product = product_name.unwrap_or("<any>"),
            "Trying to discover GPU information"
        );

        match self.discover(product_name) {
            Ok(snapshot) if snapshot.is_empty() => {
                warn!(
                    product = product_name.unwrap_or("<any>"),
                    "No matching GPU discovered, keeping previous snapshot"
                );
            }
            Ok(snapshot) => {
                info!(count = snapshot.len(), snapshot = %snapshot, "Discovered GPU information");
                self.store(&mut state, snapshot);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to discover GPU information from system, continuing"
                );
            }
        }
    }

    /// Run a fresh discovery pass and cache its result.
    ///
    /// With `product_name` set, only GPUs whose canonical name equals it are
    /// kept and they carry `product_name` as their name. Without it every GPU
    /// is kept under its reported name. An empty result is not an error.
    pub fn get_device_information(
        &self,
        product_name: Option<&str>,
    ) -> Result<Arc<DeviceSnapshot>, DiscoveryError> {
        let mut state = self.lock();
        if state.config.is_none() {
            return Err(DiscoveryError::NotInitialized);
        }

        let snapshot = self.discover(product_name)?;
        Ok(self.store(&mut state, snapshot))
    }

    /// GPUs usable for assignment, in source order.
    ///
    /// In automatic mode the cached snapshot is filtered by `filter_name`
    /// and each device keeps its snapshot position as its index. A manual
    /// `allowed_devices` list is returned as written and ignores
    /// `filter_name`.
    pub fn get_usable_devices(
        &self,
        filter_name: Option<&str>,
    ) -> Result<Vec<UsableDevice>, DiscoveryError> {
        let state = self.lock();
        let config = state.config.as_ref().ok_or(DiscoveryError::NotInitialized)?;

        match config.selection()? {
            DeviceSelection::Automatic => {
                let snapshot = state.last_snapshot.as_ref().ok_or_else(|| {
                    let e = DiscoveryError::AutomaticDiscoveryUnavailable;
                    error!("{}", e);
                    e
                })?;

                let devices = usable_from_snapshot(snapshot, filter_name);
                debug!(
                    filter = filter_name.unwrap_or("<any>"),
                    count = devices.len(),
                    "Usable GPU devices from discovery"
                );
                self.metrics
                    .set_usable_gpu_count("automatic", devices.len() as i64);
                Ok(devices)
            }
            DeviceSelection::Manual(devices) => {
                info!(
                    devices = %format_devices(&devices),
                    "Allowed GPU devices"
                );
                self.metrics
                    .set_usable_gpu_count("manual", devices.len() as i64);
                Ok(devices)
            }
        }
    }

    /// Most recently cached snapshot
    pub fn last_snapshot(&self) -> Option<Arc<DeviceSnapshot>> {
        self.lock().last_snapshot.clone()
    }

    /// Whether `initialize` has bound a configuration
    pub fn is_initialized(&self) -> bool {
        self.lock().config.is_some()
    }

    /// Kind of the underlying enumerator
    pub fn enumerator_kind(&self) -> EnumeratorKind {
        self.enumerator.kind()
    }

    // A panic while holding the lock cannot leave the state half-written,
    // every mutation is a single assignment.
    fn lock(&self) -> MutexGuard<'_, DiscovererState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, state: &mut DiscovererState, snapshot: DeviceSnapshot) -> Arc<DeviceSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.metrics
            .set_discovered_gpu_count(snapshot.len() as i64);
        state.last_snapshot = Some(snapshot.clone());
        snapshot
    }

    fn discover(&self, product_name: Option<&str>) -> Result<DeviceSnapshot, DiscoveryError> {
        let start = Instant::now();
        let result = self.enumerate(product_name);

        let outcome = match &result {
            Ok(snapshot) if snapshot.is_empty() => PassOutcome::Empty,
            Ok(_) => PassOutcome::Success,
            Err(_) => PassOutcome::Failure,
        };
        self.metrics
            .observe_discovery(outcome, start.elapsed().as_secs_f64());

        result
    }

    fn enumerate(&self, product_name: Option<&str>) -> Result<DeviceSnapshot, DiscoveryError> {
        let mut gpus = Vec::new();

        for platform in self.enumerator.list_platforms()? {
            let devices = self.enumerator.list_devices(&platform)?;
            trace!(
                platform = platform.platform_id,
                count = devices.len(),
                "Enumerated platform"
            );

            for device in devices {
                let reported = self.enumerator.device_name(&device)?;
                let name = match product_name {
                    None => reported,
                    Some(target) if canonicalize(&reported) == target => target.to_string(),
                    Some(_) => {
                        trace!(device = %device, name = %reported, "Skipping non-matching GPU");
                        continue;
                    }
                };

                let global_mem_size = self.enumerator.device_memory_size(&device)?;
                debug!(
                    device = %device,
                    name = %name,
                    global_mem_size = global_mem_size,
                    "Discovered GPU"
                );

                gpus.push(PerDeviceInfo::new(
                    name,
                    device.platform_id,
                    device.device_id,
                    global_mem_size,
                ));
            }
        }

        Ok(DeviceSnapshot::new(gpus))
    }
}

/// Filter a snapshot down to usable devices, keeping snapshot positions as
/// indices
fn usable_from_snapshot(snapshot: &DeviceSnapshot, filter_name: Option<&str>) -> Vec<UsableDevice> {
    snapshot
        .gpus()
        .iter()
        .enumerate()
        .filter_map(|(position, gpu)| {
            let qualified = canonicalize(&gpu.qualified_product_name());
            // Everything before the first '_'. A product name that itself
            // contains '_' is truncated here.
            let base = qualified.split('_').next().unwrap_or_default();
            if filter_name.is_some_and(|filter| filter != base) {
                return None;
            }

            match (gpu.platform_id(), gpu.device_id()) {
                (Some(platform_id), Some(device_id)) => {
                    Some(UsableDevice::new(position as u32, platform_id, device_id))
                }
                _ => {
                    warn!(gpu = %gpu, "Skipping GPU without platform or device id");
                    None
                }
            }
        })
        .collect()
}

fn format_devices(devices: &[UsableDevice]) -> String {
    devices
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockEnumerator, MockGpu};

    const GB: u64 = 1024 * 1024 * 1024;

    fn mixed_node() -> Arc<MockEnumerator> {
        Arc::new(MockEnumerator::with_platforms(vec![
            vec![
                MockGpu::new("Tesla V100-SXM2", 16 * GB),
                MockGpu::new("GeForce GTX 1080", 8 * GB),
            ],
            vec![],
            vec![MockGpu::new("Tesla V100-SXM2", 32 * GB)],
        ]))
    }

    #[test]
    fn test_uninitialized_fails() {
        let discoverer = GpuDiscoverer::new(Arc::new(MockEnumerator::new()));
        assert!(!discoverer.is_initialized());
        assert!(matches!(
            discoverer.get_usable_devices(None),
            Err(DiscoveryError::NotInitialized)
        ));
        assert!(matches!(
            discoverer.get_device_information(None),
            Err(DiscoveryError::NotInitialized)
        ));
    }

    #[test]
    fn test_discover_all_keeps_reported_names() {
        let discoverer = GpuDiscoverer::new(mixed_node());
        discoverer.initialize(DiscoveryConfig::default(), None);

        let snapshot = discoverer.last_snapshot().unwrap();
        let names: Vec<_> = snapshot
            .gpus()
            .iter()
            .map(|g| g.qualified_product_name())
            .collect();
        assert_eq!(
            names,
            vec![
                "Tesla V100-SXM2_0_0",
                "GeForce GTX 1080_0_1",
                "Tesla V100-SXM2_2_0",
            ]
        );
        assert_eq!(snapshot.gpus()[2].global_mem_size(), Some(32 * GB));
    }

    #[test]
    fn test_discover_target_product() {
        let discoverer = GpuDiscoverer::new(mixed_node());
        discoverer.initialize(DiscoveryConfig::default(), Some("teslav100sxm2"));

        let snapshot = discoverer.last_snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.gpus()[0].qualified_product_name(), "teslav100sxm2_0_0");
        assert_eq!(snapshot.gpus()[1].qualified_product_name(), "teslav100sxm2_2_0");
    }

    #[test]
    fn test_automatic_filter_keeps_snapshot_positions() {
        let discoverer = GpuDiscoverer::new(mixed_node());
        discoverer.initialize(DiscoveryConfig::default(), None);

        let all = discoverer.get_usable_devices(None).unwrap();
        assert_eq!(
            all,
            vec![
                UsableDevice::new(0, 0, 0),
                UsableDevice::new(1, 0, 1),
                UsableDevice::new(2, 2, 0),
            ]
        );

        // The GTX at position 1 is dropped, the second V100 keeps index 2
        let teslas = discoverer.get_usable_devices(Some("teslav100sxm2")).unwrap();
        assert_eq!(
            teslas,
            vec![UsableDevice::new(0, 0, 0), UsableDevice::new(2, 2, 0)]
        );

        assert!(discoverer
            .get_usable_devices(Some("a100"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_automatic_without_snapshot() {
        let mock = Arc::new(MockEnumerator::new());
        mock.set_fail_enumeration(true);
        let discoverer = GpuDiscoverer::new(mock);
        discoverer.initialize(DiscoveryConfig::default(), None);

        assert!(discoverer.is_initialized());
        assert!(discoverer.last_snapshot().is_none());
        let err = discoverer.get_usable_devices(None).unwrap_err();
        assert!(matches!(err, DiscoveryError::AutomaticDiscoveryUnavailable));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_initialize_failure_keeps_previous_snapshot() {
        let mock = Arc::new(MockEnumerator::new());
        let discoverer = GpuDiscoverer::new(mock.clone());
        discoverer.initialize(DiscoveryConfig::default(), None);
        let first = discoverer.last_snapshot().unwrap();

        mock.set_fail_enumeration(true);
        discoverer.initialize(DiscoveryConfig::default(), None);

        let kept = discoverer.last_snapshot().unwrap();
        assert!(Arc::ptr_eq(&first, &kept));
        assert_eq!(discoverer.get_usable_devices(None).unwrap().len(), 2);
    }

    #[test]
    fn test_initialize_empty_keeps_previous_snapshot() {
        let discoverer = GpuDiscoverer::new(Arc::new(MockEnumerator::new()));
        discoverer.initialize(DiscoveryConfig::default(), None);
        discoverer.initialize(DiscoveryConfig::default(), Some("a100"));

        assert_eq!(discoverer.last_snapshot().unwrap().len(), 2);
    }

    #[test]
    fn test_get_device_information_propagates_failure() {
        let mock = Arc::new(MockEnumerator::new());
        let discoverer = GpuDiscoverer::new(mock.clone());
        discoverer.initialize(DiscoveryConfig::default(), None);

        mock.set_fail_enumeration(true);
        let err = discoverer.get_device_information(None).unwrap_err();
        assert!(matches!(err, DiscoveryError::Enumeration(_)));
        assert!(!err.is_configuration());
        assert_eq!(discoverer.last_snapshot().unwrap().len(), 2);
    }

    #[test]
    fn test_get_device_information_replaces_cache() {
        let discoverer = GpuDiscoverer::new(mixed_node());
        discoverer.initialize(DiscoveryConfig::default(), None);

        let snapshot = discoverer.get_device_information(Some("a100")).unwrap();
        assert!(snapshot.is_empty());
        assert!(discoverer.last_snapshot().unwrap().is_empty());
        assert!(discoverer.get_usable_devices(None).unwrap().is_empty());
    }

    #[test]
    fn test_each_pass_reenumerates() {
        let mock = Arc::new(MockEnumerator::new());
        let discoverer = GpuDiscoverer::new(mock.clone());
        discoverer.initialize(DiscoveryConfig::default(), None);
        discoverer.get_device_information(None).unwrap();
        discoverer.get_usable_devices(None).unwrap();

        assert_eq!(mock.passes(), 2);
    }

    #[test]
    fn test_manual_list_bypasses_cache_and_filter() {
        let mock = Arc::new(MockEnumerator::new());
        mock.set_fail_enumeration(true);
        let discoverer = GpuDiscoverer::new(mock);
        discoverer.initialize(DiscoveryConfig::with_allowed_devices("0:0:0, 1:0:1"), None);

        let devices = discoverer.get_usable_devices(Some("nosuchgpu")).unwrap();
        assert_eq!(
            devices,
            vec![UsableDevice::new(0, 0, 0), UsableDevice::new(1, 0, 1)]
        );
    }

    #[test]
    fn test_manual_list_malformed() {
        let discoverer = GpuDiscoverer::new(Arc::new(MockEnumerator::new()));
        discoverer.initialize(DiscoveryConfig::with_allowed_devices("0:0"), None);

        let err = discoverer.get_usable_devices(None).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("0:0"));
    }

    #[test]
    fn test_underscore_name_is_truncated() {
        let discoverer = GpuDiscoverer::new(Arc::new(MockEnumerator::with_platforms(vec![
            vec![MockGpu::new("Radeon_Pro VII", GB)],
        ])));
        discoverer.initialize(DiscoveryConfig::default(), None);

        assert!(discoverer
            .get_usable_devices(Some("radeon_provii"))
            .unwrap()
            .is_empty());
        assert_eq!(
            discoverer.get_usable_devices(Some("radeon")).unwrap(),
            vec![UsableDevice::new(0, 0, 0)]
        );
    }

    #[test]
    fn test_usable_from_snapshot_skips_incomplete_entries() {
        let snapshot = DeviceSnapshot::new(vec![
            PerDeviceInfo::default(),
            PerDeviceInfo::new("teslav100", 0, 1, GB),
        ]);
        assert_eq!(
            usable_from_snapshot(&snapshot, None),
            vec![UsableDevice::new(1, 0, 1)]
        );
    }

    #[test]
    fn test_enumerator_kind() {
        let discoverer = GpuDiscoverer::new(Arc::new(MockEnumerator::new()));
        assert_eq!(discoverer.enumerator_kind(), EnumeratorKind::Mock);
    }
}
