use candle_core::{DType, Device, Result, Tensor};
use image::DynamicImage;

/// How images are turned into ViT pixel values.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    pub height: u32,
    pub width: u32,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
}

impl ProcessorConfig {
    /// A config for an encoder with a square input resolution.
    pub fn square(size: u32) -> Self {
        Self {
            height: size,
            width: size,
            ..Self::default()
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            height: 384,
            width: 384,
            image_mean: [0.5, 0.5, 0.5],
            image_std: [0.5, 0.5, 0.5],
        }
    }
}

pub struct ViTImageProcessor {
    config: ProcessorConfig,
}

impl ViTImageProcessor {
    pub fn new(config: &ProcessorConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Resize and normalize a batch of images into a `(batch, 3, height, width)` f32 tensor on the CPU.
    pub fn preprocess(&self, images: &[DynamicImage]) -> Result<Tensor> {
        let normalized = images
            .iter()
            .map(|image| self.normalize(&self.resize(image)))
            .collect::<Result<Vec<_>>>()?;
        Tensor::stack(&normalized, 0)
    }

    fn resize(&self, image: &DynamicImage) -> DynamicImage {
        image.resize_exact(
            self.config.width,
            self.config.height,
            image::imageops::FilterType::Triangle,
        )
    }

    fn normalize(&self, image: &DynamicImage) -> Result<Tensor> {
        let image = image.to_rgb8();
        let (width, height) = (image.width() as usize, image.height() as usize);
        let data = image.into_raw();

        let mean = Tensor::new(&self.config.image_mean, &Device::Cpu)?.reshape((3, 1, 1))?;
        let std = Tensor::new(&self.config.image_std, &Device::Cpu)?.reshape((3, 1, 1))?;

        let pixel_values =
            Tensor::from_vec(data, (height, width, 3), &Device::Cpu)?.permute((2, 0, 1))?;
        (pixel_values.to_dtype(DType::F32)? / 255.)?
            .broadcast_sub(&mean)?
            .broadcast_div(&std)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_to_the_unit_range() -> anyhow::Result<()> {
        let processor = ViTImageProcessor::new(&ProcessorConfig::square(4));
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 3, Rgb([255, 255, 255])));
        let black = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 7, Rgb([0, 0, 0])));

        let pixels = processor.preprocess(&[white, black])?;
        assert_eq!(pixels.dims(), &[2, 3, 4, 4]);

        let values = pixels.flatten_from(1)?.to_vec2::<f32>()?;
        assert!(values[0].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(values[1].iter().all(|&v| (v + 1.0).abs() < 1e-6));
        Ok(())
    }
}
