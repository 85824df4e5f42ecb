//! GPUDISC Core Library
//!
//! GPU discovery for resource managers: enumerates GPUs through a native
//! library, canonicalizes their names, caches the last snapshot and
//! reconciles it with an administrator device list into the usable devices.

pub mod device;
pub mod discovery;
pub mod metrics;
pub mod snapshot;

// Re-export common types
pub use device::{
    create_enumerator, DeviceEnumerator, EnumerationError, EnumeratorKind, NativeDeviceHandle,
};
pub use discovery::{canonicalize, DeviceSelection, DiscoveryConfig, DiscoveryError, GpuDiscoverer};
pub use snapshot::{DeviceSnapshot, PerDeviceInfo, UsableDevice};
