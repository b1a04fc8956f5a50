//! Compute device selection: CUDA > Metal > CPU.

use candle_core::Device;

/// Pick the device language models are loaded onto.
///
/// GPU backends are only considered when the crate is built with the
/// matching `cuda` or `metal` feature.
pub fn select_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                tracing::info!(device = "cuda:0", "Scoring on GPU");
                return device;
            }
            Err(e) => tracing::warn!(error = %e, "CUDA unavailable, falling back"),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                tracing::info!(device = "metal:0", "Scoring on GPU");
                return device;
            }
            Err(e) => tracing::warn!(error = %e, "Metal unavailable, falling back"),
        }
    }

    tracing::info!(device = "cpu", "Scoring on CPU");
    Device::Cpu
}
