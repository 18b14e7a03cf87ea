//! Inference backend abstraction and the shared inference engine
//!
//! The engine owns exactly one backend behind a mutex. Tensor preparation and
//! mask postprocessing run outside the lock so only the forward pass itself is
//! serialized across concurrent requests.

use crate::{
    config::{BackendType, ModelConfig, OutputActivation, PreprocessingConfig, ServiceConfig},
    error::{BgRemovalError, Result},
    types::{DecodedImage, ForegroundMask, ProcessingTimings},
    utils::{ImagePreprocessor, MaskPostprocessor},
};
use ndarray::Array4;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, span, warn, Level};

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Trait for inference backends
pub trait InferenceBackend: Send {
    /// Load the model described by `config`
    ///
    /// Returns the load time, or `None` when the backend was already initialized.
    ///
    /// # Errors
    /// - Model file missing or unreadable
    /// - Model graph rejected by the runtime
    fn initialize(&mut self, config: &ModelConfig) -> Result<Option<Duration>>;

    /// Run one forward pass and return the model's last output
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Runtime failure or unexpected output rank
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Expected input shape `(batch, channels, height, width)`
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Creates inference backends by type
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend instance
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>>;

    /// Backend types this factory can create
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends enabled by crate features
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            BackendType::Onnx => onnx_backend(),
            BackendType::Tract => tract_backend(),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        backends
    }
}

#[cfg(feature = "onnx")]
fn onnx_backend() -> Result<Box<dyn InferenceBackend>> {
    Ok(Box::new(crate::backends::OnnxBackend::new()))
}

#[cfg(not(feature = "onnx"))]
fn onnx_backend() -> Result<Box<dyn InferenceBackend>> {
    Err(BgRemovalError::invalid_config(
        "ONNX backend is not available in this build (enable the `onnx` feature)",
    ))
}

#[cfg(feature = "tract")]
fn tract_backend() -> Result<Box<dyn InferenceBackend>> {
    Ok(Box::new(crate::backends::TractBackend::new()))
}

#[cfg(not(feature = "tract"))]
fn tract_backend() -> Result<Box<dyn InferenceBackend>> {
    Err(BgRemovalError::invalid_config(
        "Tract backend is not available in this build (enable the `tract` feature)",
    ))
}

/// Anything that can turn an image into a foreground mask of the same size
pub trait MaskPredictor: Send + Sync {
    /// Predict a mask whose dimensions equal `image`'s
    ///
    /// # Errors
    /// - `InferenceFailure` when the model cannot produce a mask for this image
    fn predict(&self, image: &DecodedImage) -> Result<ForegroundMask>;

    /// Predict and record stage timings
    ///
    /// # Errors
    /// - Same as [`MaskPredictor::predict`]
    fn predict_with_timings(
        &self,
        image: &DecodedImage,
        timings: &mut ProcessingTimings,
    ) -> Result<ForegroundMask> {
        let start = Instant::now();
        let mask = self.predict(image)?;
        timings.inference_ms = start.elapsed().as_millis() as u64;
        Ok(mask)
    }
}

/// The process-wide segmentation model
pub struct InferenceEngine {
    backend: Mutex<Box<dyn InferenceBackend>>,
    backend_name: &'static str,
    preprocessing: PreprocessingConfig,
    activation: OutputActivation,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("backend", &self.backend_name)
            .field("preprocessing", &self.preprocessing)
            .field("activation", &self.activation)
            .finish()
    }
}

impl InferenceEngine {
    /// Wrap an already initialized backend
    #[must_use]
    pub fn new(
        backend: Box<dyn InferenceBackend>,
        preprocessing: PreprocessingConfig,
        activation: OutputActivation,
    ) -> Self {
        let backend_name = backend.name();
        Self {
            backend: Mutex::new(backend),
            backend_name,
            preprocessing,
            activation,
        }
    }

    /// Create and initialize the configured backend
    ///
    /// # Errors
    /// - Backend type not available in this build
    /// - Model loading failures
    pub fn from_config(config: &ServiceConfig, factory: &dyn BackendFactory) -> Result<Self> {
        let mut backend = factory.create_backend(config.model.backend)?;

        info!(
            backend = backend.name(),
            model = %config.model.model_path.display(),
            provider = %config.model.execution_provider,
            "🔧 Loading segmentation model"
        );

        if let Some(load_time) = backend.initialize(&config.model)? {
            info!(
                backend = backend.name(),
                load_ms = load_time.as_millis() as u64,
                "✅ Model ready"
            );
        }

        Ok(Self::new(
            backend,
            config.preprocessing.clone(),
            config.model.activation,
        ))
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    #[must_use]
    pub fn preprocessing(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    /// Run one zero tensor through the model
    ///
    /// # Errors
    /// - Any backend failure
    pub fn warm_up(&self) -> Result<Duration> {
        let [width, height] = self.preprocessing.target_size;
        let input = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        let start = Instant::now();
        self.run_backend(&input)?;
        let elapsed = start.elapsed();

        info!(
            backend = self.backend_name,
            warm_up_ms = elapsed.as_millis() as u64,
            "🔥 Warm-up inference complete"
        );
        Ok(elapsed)
    }

    fn lock_backend(&self) -> MutexGuard<'_, Box<dyn InferenceBackend>> {
        match self.backend.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(backend = self.backend_name, "⚠️ Recovering poisoned inference lock");
                poisoned.into_inner()
            },
        }
    }

    /// The only section that holds the backend lock
    fn run_backend(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let mut backend = self.lock_backend();

        match std::panic::catch_unwind(AssertUnwindSafe(|| backend.infer(input))) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(match e {
                BgRemovalError::InferenceFailure(_) => e,
                other => BgRemovalError::inference(other.to_string()),
            }),
            Err(_) => Err(BgRemovalError::inference(format!(
                "{} backend panicked during inference",
                self.backend_name
            ))),
        }
    }
}

impl MaskPredictor for InferenceEngine {
    fn predict(&self, image: &DecodedImage) -> Result<ForegroundMask> {
        let mut timings = ProcessingTimings::default();
        self.predict_with_timings(image, &mut timings)
    }

    #[instrument(
        skip(self, image, timings),
        fields(
            backend = self.backend_name,
            dimensions = %format!("{}x{}", image.image.width(), image.image.height())
        )
    )]
    fn predict_with_timings(
        &self,
        image: &DecodedImage,
        timings: &mut ProcessingTimings,
    ) -> Result<ForegroundMask> {
        let original_dimensions = image.dimensions();

        let input_tensor = {
            let _span = span!(
                Level::DEBUG,
                "preprocessing",
                original_width = %original_dimensions.0,
                original_height = %original_dimensions.1
            )
            .entered();
            let start = Instant::now();
            let tensor = ImagePreprocessor::preprocess_for_inference(&image.image, &self.preprocessing)?;
            timings.preprocessing_ms = start.elapsed().as_millis() as u64;
            tensor
        };

        let output_tensor = {
            let _span = span!(Level::INFO, "inference", backend = self.backend_name).entered();
            let start = Instant::now();
            let output = self.run_backend(&input_tensor)?;
            timings.inference_ms = start.elapsed().as_millis() as u64;
            output
        };

        let mask = {
            let _span = span!(
                Level::DEBUG,
                "postprocessing",
                output_shape = ?output_tensor.shape()
            )
            .entered();
            let start = Instant::now();
            let mask = MaskPostprocessor::tensor_to_mask(&output_tensor, self.activation, original_dimensions)?;
            timings.postprocessing_ms = start.elapsed().as_millis() as u64;
            mask
        };

        debug!(
            preprocessing_ms = timings.preprocessing_ms,
            inference_ms = timings.inference_ms,
            postprocessing_ms = timings.postprocessing_ms,
            "🎭 Mask predicted"
        );

        Ok(mask)
    }
}
