//! Image to tensor conversion for the segmentation model

use crate::{
    error::{Result, SegLabelError},
    models::PreprocessingConfig,
    types::CanonicalImage,
};
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an image for model inference
    ///
    /// Resizes straight to the target size (no aspect ratio preservation, no
    /// padding), rescales to `[0, 1]`, normalizes per channel and lays the
    /// result out as an NCHW tensor `[1, 3, H, W]`.
    ///
    /// # Errors
    /// - Zero target size or zero std in the configuration
    pub fn preprocess_for_inference(
        image: &CanonicalImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_height, target_width] = preprocessing_config.target_size;
        if target_height == 0 || target_width == 0 {
            return Err(SegLabelError::invalid_config(
                "Preprocessing target size must be non-zero",
            ));
        }
        if preprocessing_config.normalization_std.iter().any(|s| *s == 0.0) {
            return Err(SegLabelError::invalid_config(
                "Normalization std must be non-zero",
            ));
        }

        let rgb = image.as_rgb();
        let resized = if rgb.dimensions() == (target_width, target_height) {
            rgb.clone()
        } else {
            image::imageops::resize(rgb, target_width, target_height, FilterType::Triangle)
        };

        Ok(Self::canvas_to_tensor(&resized, preprocessing_config))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (y, row) in canvas.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for channel in 0..3 {
                    tensor[[0, channel, y, x]] =
                        (f32::from(pixel[channel]) / 255.0 - mean[channel]) / std[channel];
                }
            }
        }

        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> CanonicalImage {
        CanonicalImage::new(RgbImage::from_pixel(width, height, Rgb(color))).unwrap()
    }

    #[test]
    fn test_tensor_shape_follows_target_size() {
        let config = PreprocessingConfig {
            target_size: [64, 96],
            ..PreprocessingConfig::default()
        };
        let tensor = ImagePreprocessor::preprocess_for_inference(&solid(300, 100, [0, 0, 0]), &config)
            .unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 64, 96]);
    }

    #[test]
    fn test_default_target_is_512() {
        let tensor = ImagePreprocessor::preprocess_for_inference(
            &solid(10, 20, [1, 2, 3]),
            &PreprocessingConfig::default(),
        )
        .unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 512, 512]);
    }

    #[test]
    fn test_normalization_values() {
        let config = PreprocessingConfig {
            target_size: [4, 4],
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [0.5, 0.5, 0.5],
        };
        let tensor = ImagePreprocessor::preprocess_for_inference(&solid(4, 4, [255, 0, 255]), &config)
            .unwrap();

        assert!((tensor[[0, 0, 1, 1]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 1, 1]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 3, 3]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_config() {
        let image = solid(4, 4, [0, 0, 0]);
        let zero_size = PreprocessingConfig {
            target_size: [0, 4],
            ..PreprocessingConfig::default()
        };
        assert!(ImagePreprocessor::preprocess_for_inference(&image, &zero_size).is_err());

        let zero_std = PreprocessingConfig {
            target_size: [4, 4],
            normalization_std: [1.0, 0.0, 1.0],
            ..PreprocessingConfig::default()
        };
        assert!(ImagePreprocessor::preprocess_for_inference(&image, &zero_std).is_err());
    }
}
