//! Model output to foreground mask conversion

use crate::{
    config::OutputActivation,
    error::{BgRemovalError, Result},
    types::ForegroundMask,
};
use ndarray::Array4;

/// Converts raw prediction maps into masks aligned with the source image
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Turn a `[1, 1, h, w]` prediction into a mask of `original_dimensions`
    ///
    /// # Errors
    /// - Tensor is not batch 1, single channel
    /// - Tensor has an empty spatial extent
    pub fn tensor_to_mask(
        tensor: &Array4<f32>,
        activation: OutputActivation,
        original_dimensions: (u32, u32),
    ) -> Result<ForegroundMask> {
        let (height, width) = Self::validate_tensor_shape(tensor)?;

        let data = tensor
            .iter()
            .map(|&value| Self::quantize(Self::activate(value, activation)))
            .collect();

        let working_mask = ForegroundMask::new(data, (width as u32, height as u32));
        working_mask.resize(original_dimensions.0, original_dimensions.1)
    }

    /// Validate tensor shape for mask generation, returning `(height, width)`
    fn validate_tensor_shape(tensor: &Array4<f32>) -> Result<(usize, usize)> {
        let shape = tensor.shape();
        match *shape {
            [1, 1, height, width] if height > 0 && width > 0 => Ok((height, width)),
            _ => Err(BgRemovalError::inference(format!(
                "Invalid output tensor shape {:?}, expected [1, 1, h, w]",
                shape
            ))),
        }
    }

    fn activate(value: f32, activation: OutputActivation) -> f32 {
        match activation {
            OutputActivation::Sigmoid => 1.0 / (1.0 + (-value).exp()),
            OutputActivation::Identity => value,
        }
    }

    /// Scale to 0-255, truncating toward zero
    fn quantize(probability: f32) -> u8 {
        if probability.is_nan() {
            return 0;
        }
        (probability.clamp(0.0, 1.0) * 255.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_quantization() {
        let tensor = Array4::from_shape_vec((1, 1, 1, 3), vec![0.0, 40.0, -40.0]).unwrap();
        let mask =
            MaskPostprocessor::tensor_to_mask(&tensor, OutputActivation::Sigmoid, (3, 1)).unwrap();

        // sigmoid(0) = 0.5 -> 127.5 truncated
        assert_eq!(mask.data, vec![127, 255, 0]);
    }

    #[test]
    fn test_identity_clamps() {
        let tensor = Array4::from_shape_vec((1, 1, 2, 2), vec![1.0, 2.0, -1.0, f32::NAN]).unwrap();
        let mask =
            MaskPostprocessor::tensor_to_mask(&tensor, OutputActivation::Identity, (2, 2)).unwrap();

        assert_eq!(mask.data, vec![255, 255, 0, 0]);
    }

    #[test]
    fn test_resamples_to_original_dimensions() {
        let tensor = Array4::from_elem((1, 1, 16, 16), 1.0);
        let mask =
            MaskPostprocessor::tensor_to_mask(&tensor, OutputActivation::Identity, (37, 5)).unwrap();

        assert_eq!(mask.dimensions, (37, 5));
        assert_eq!(mask.data.len(), 37 * 5);
        assert!(mask.data.iter().all(|&v| v >= 254));
    }

    #[test]
    fn test_rejects_multichannel_output() {
        let tensor = Array4::<f32>::zeros((1, 3, 8, 8));
        let err = MaskPostprocessor::tensor_to_mask(&tensor, OutputActivation::Sigmoid, (8, 8))
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::InferenceFailure(_)));
    }
}
