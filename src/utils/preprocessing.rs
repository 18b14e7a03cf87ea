//! Image to tensor preparation for the segmentation model

use crate::{
    config::PreprocessingConfig,
    error::{BgRemovalError, Result},
};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess image for model inference
    ///
    /// This function handles:
    /// - RGB conversion
    /// - Stretch resize to the working resolution (aspect ratio is not kept)
    /// - Normalization to tensor format (NCHW)
    ///
    /// # Arguments
    /// * `image` - Input image to preprocess
    /// * `preprocessing_config` - Working resolution and normalization constants
    ///
    /// # Returns
    /// * `Ok(tensor)` - `[1, 3, height, width]` tensor ready for inference
    /// * `Err(BgRemovalError)` - On invalid dimensions
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_width, target_height] = preprocessing_config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(BgRemovalError::processing(format!(
                "Invalid working resolution {}x{}",
                target_width, target_height
            )));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::invalid_image_data("image has zero width or height"));
        }

        let rgb_image = image.to_rgb8();
        let resized = if rgb_image.dimensions() == (target_width, target_height) {
            rgb_image
        } else {
            image::imageops::resize(
                &rgb_image,
                target_width,
                target_height,
                image::imageops::FilterType::Triangle,
            )
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
