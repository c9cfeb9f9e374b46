use candle_core::Device;

use super::types::ModelError;

/// Environment variable that forces a device when accelerator layers are requested
pub const DEVICE_ENV: &str = "LLM_INFER_DEVICE";

/// Device selector for automatic GPU detection
pub struct DeviceSelector;

impl DeviceSelector {
    /// Auto-detect the best available device
    ///
    /// Priority order: CUDA > Metal > CPU
    pub fn auto_select() -> Result<Device, ModelError> {
        #[cfg(feature = "cuda")]
        {
            if Self::cuda_is_available() {
                log::info!("Selected CUDA device");
                return Device::new_cuda(0).map_err(|e| {
                    ModelError::ConfigError(format!("Failed to initialize CUDA: {}", e))
                });
            }
        }

        #[cfg(feature = "metal")]
        {
            if Self::metal_is_available() {
                log::info!("Selected Metal device");
                return Device::new_metal(0).map_err(|e| {
                    ModelError::ConfigError(format!("Failed to initialize Metal: {}", e))
                });
            }
        }

        log::warn!("No GPU detected, falling back to CPU");
        Ok(Device::Cpu)
    }

    #[cfg(feature = "cuda")]
    fn cuda_is_available() -> bool {
        matches!(Device::new_cuda(0), Ok(_))
    }

    #[cfg(feature = "metal")]
    fn metal_is_available() -> bool {
        matches!(Device::new_metal(0), Ok(_))
    }
}

/// Pick the device for a load request.
///
/// Zero accelerator layers always means CPU. Otherwise `LLM_INFER_DEVICE`
/// (`cuda`, `metal`, `cpu`) is honoured, falling back to auto-detection.
/// Candle places the whole model on one device, so any positive layer count
/// offloads everything.
pub fn select_device(gpu_layers: usize) -> Result<Device, ModelError> {
    if gpu_layers == 0 {
        return Ok(Device::Cpu);
    }

    select_device_from_env(std::env::var(DEVICE_ENV).ok().as_deref())
}

fn select_device_from_env(requested: Option<&str>) -> Result<Device, ModelError> {
    let Some(dev) = requested else {
        return DeviceSelector::auto_select();
    };

    match dev.to_lowercase().as_str() {
        "cuda" => {
            #[cfg(feature = "cuda")]
            {
                log::info!("Device selection: CUDA (forced by {DEVICE_ENV})");
                return Device::new_cuda(0).map_err(|e| {
                    ModelError::ConfigError(format!(
                        "Failed to initialize CUDA (forced by {DEVICE_ENV}): {}",
                        e
                    ))
                });
            }
            #[cfg(not(feature = "cuda"))]
            {
                return Err(ModelError::ConfigError(
                    "CUDA requested but not compiled with cuda feature".to_string(),
                ));
            }
        }
        "metal" => {
            #[cfg(feature = "metal")]
            {
                log::info!("Device selection: Metal (forced by {DEVICE_ENV})");
                return Device::new_metal(0).map_err(|e| {
                    ModelError::ConfigError(format!(
                        "Failed to initialize Metal (forced by {DEVICE_ENV}): {}",
                        e
                    ))
                });
            }
            #[cfg(not(feature = "metal"))]
            {
                return Err(ModelError::ConfigError(
                    "Metal requested but not compiled with metal feature".to_string(),
                ));
            }
        }
        "cpu" => {
            log::info!("Device selection: CPU (forced by {DEVICE_ENV})");
            Ok(Device::Cpu)
        }
        _ => {
            log::warn!(
                "Invalid {DEVICE_ENV} value: '{}', falling back to auto-detect",
                dev
            );
            DeviceSelector::auto_select()
        }
    }
}
