use sysinfo::System;
use tracing::debug;

use crate::consts::WARP_BUFFER_FACTOR;
use crate::error::{ResourceError, Result};
use crate::image::SlideImage;

/// Memory currently available to the process, as reported by the OS.
pub fn system_available_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

/// Bytes an alignment run over `images` is expected to hold at peak: the
/// decoded inputs plus the warp working buffers of each.
pub fn estimate_run_footprint(images: &[SlideImage]) -> u64 {
    images
        .iter()
        .map(|img| img.decoded_bytes().saturating_mul(1 + WARP_BUFFER_FACTOR))
        .fold(0u64, u64::saturating_add)
}

/// Fail with `InsufficientMemory` when `required` exceeds the available
/// memory. `override_bytes` replaces the OS figure when set.
pub fn check_available(required: u64, override_bytes: Option<u64>) -> Result<()> {
    let available = override_bytes.unwrap_or_else(system_available_memory);
    debug!(
        required_mib = required / (1024 * 1024),
        available_mib = available / (1024 * 1024),
        "memory check"
    );
    if required > available {
        return Err(ResourceError::InsufficientMemory {
            required_bytes: required,
            available_bytes: available,
        }
        .into());
    }
    Ok(())
}
