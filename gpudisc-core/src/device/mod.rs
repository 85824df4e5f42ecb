//! Device enumeration layer
//!
//! Wraps the native GPU enumeration library behind [`DeviceEnumerator`].

mod interface;
mod mock;
mod nvidia;

pub use interface::*;
pub use mock::{MockEnumerator, MockGpu};
pub use nvidia::NvmlEnumerator;

use std::sync::Arc;

/// Create an enumerator for the requested backend
///
/// Native libraries are loaded lazily, so a missing driver shows up as a
/// failed discovery pass instead of an error here.
pub fn create_enumerator(kind: EnumeratorKind) -> Arc<dyn DeviceEnumerator> {
    match kind {
        EnumeratorKind::Nvml => {
            tracing::info!("Using NVML GPU enumeration");
            Arc::new(NvmlEnumerator::new())
        }
        EnumeratorKind::Mock => {
            tracing::warn!("Using mock GPU enumeration, reported devices are simulated");
            Arc::new(MockEnumerator::new())
        }
    }
}
