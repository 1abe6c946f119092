use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device};
use std::fmt::Display;
use std::str::FromStr;

/// Create a candle device that uses any available accelerator, or the CPU when `cpu` is set.
pub fn accelerated_device_if_available(cpu: bool) -> candle_core::Result<Device> {
    if cpu {
        return Ok(Device::Cpu);
    }
    let device = if cuda_is_available() {
        Device::new_cuda(0)?
    } else if metal_is_available() {
        Device::new_metal(0)?
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            tracing::warn!("Running on CPU, to run on GPU(metal), build with `--features metal`");
        }
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            tracing::warn!("Running on CPU, to run on GPU, build with `--features cuda`");
        }
        Device::Cpu
    };
    Ok(device)
}

/// The short name reported for a device: `cuda`, `metal` or `cpu`.
pub fn device_name(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}

/// The floating point precision model weights are loaded in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Precision {
    /// Half precision everywhere: bf16 on CUDA, f16 on Metal and the CPU
    #[default]
    Auto,
    /// Full precision
    F32,
    /// IEEE half precision
    F16,
    /// Brain float half precision
    BF16,
}

impl Precision {
    /// The dtype to load weights with on `device`.
    pub fn dtype(self, device: &Device) -> DType {
        match self {
            // candle's CPU matmul has no bf16 kernel
            Self::Auto if device.is_cuda() => DType::BF16,
            Self::Auto | Self::F16 => DType::F16,
            Self::F32 => DType::F32,
            Self::BF16 => DType::BF16,
        }
    }
}

/// Whether `device` can run matmuls in `dtype`.
pub fn dtype_supported(dtype: DType, device: &Device) -> bool {
    !(device.is_cpu() && dtype == DType::BF16)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown precision `{0}`, expected one of auto, f32, f16, bf16")]
pub struct ParsePrecisionError(String);

impl FromStr for Precision {
    type Err = ParsePrecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "f32" => Ok(Self::F32),
            "f16" => Ok(Self::F16),
            "bf16" => Ok(Self::BF16),
            _ => Err(ParsePrecisionError(s.to_string())),
        }
    }
}

impl Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
        };
        f.write_str(name)
    }
}
