//! Tensor conversion helpers shared by the inference engine

pub mod postprocessing;
pub mod preprocessing;

pub use postprocessing::MaskPostprocessor;
pub use preprocessing::ImagePreprocessor;
