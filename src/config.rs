//! Configuration types for the background removal service

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the model file location
pub const MODEL_PATH_ENV: &str = "BGREMOVE_MODEL_PATH";

/// Environment variable overriding the root of the upload/output directories
pub const DATA_DIR_ENV: &str = "BGREMOVE_DATA_DIR";

/// Environment variable overriding the remote fetch timeout (seconds)
pub const FETCH_TIMEOUT_ENV: &str = "BGREMOVE_FETCH_TIMEOUT_SECS";

/// Default timeout for fetching remote images
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{}'. Expected one of: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// Inference backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown backend '{}'. Expected one of: onnx, tract",
                other
            ))),
        }
    }
}

/// Activation applied to the model's raw prediction map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Logistic sigmoid, for exports that emit logits
    #[default]
    Sigmoid,
    /// Values are already probabilities in [0, 1]
    Identity,
}

/// Model loading configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the ONNX model file
    pub model_path: PathBuf,

    /// Backend used to run the model
    pub backend: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Activation applied to the last prediction layer
    pub activation: OutputActivation,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            backend: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            activation: OutputActivation::default(),
        }
    }
}

/// Tensor preparation parameters for the segmentation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Working resolution `[width, height]`; inputs are stretched to it
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to [0, 1]
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation divided after mean subtraction
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: [1024, 1024],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

/// Filesystem layout for transient uploads and durable outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for uploads that live only for one request
    pub upload_dir: PathBuf,
    /// Directory for persisted artifacts
    pub output_dir: PathBuf,
}

impl StorageConfig {
    /// Place both directories under a common root
    #[must_use]
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            upload_dir: root.join("uploads"),
            output_dir: root.join("outputs"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::under(".")
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Model loading configuration
    pub model: ModelConfig,

    /// Tensor preparation parameters
    pub preprocessing: PreprocessingConfig,

    /// Timeout for fetching remote images, in seconds
    pub fetch_timeout_secs: u64,

    /// Upload and output directories
    pub storage: StorageConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            preprocessing: PreprocessingConfig::default(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            storage: StorageConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Load configuration from a JSON file; missing fields take their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - File is not valid JSON for this schema
    /// - Resulting configuration fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BGREMOVE_*` environment variable overrides
    ///
    /// # Errors
    /// - `BGREMOVE_FETCH_TIMEOUT_SECS` is not a positive integer
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model_path) = lookup(MODEL_PATH_ENV) {
            self.model.model_path = PathBuf::from(model_path);
        }

        if let Some(data_dir) = lookup(DATA_DIR_ENV) {
            self.storage = StorageConfig::under(data_dir);
        }

        if let Some(timeout) = lookup(FETCH_TIMEOUT_ENV) {
            self.fetch_timeout_secs = timeout.trim().parse().map_err(|_| {
                BgRemovalError::invalid_config(format!(
                    "{} must be a positive integer, got '{}'",
                    FETCH_TIMEOUT_ENV, timeout
                ))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Remote fetch timeout as a `Duration`
    #[must_use]
    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero working resolution
    /// - Non-positive or non-finite normalization std
    /// - Fetch timeout outside 1-600 seconds
    /// - Upload and output directories are the same path
    pub fn validate(&self) -> Result<()> {
        let [width, height] = self.preprocessing.target_size;
        if width == 0 || height == 0 {
            return Err(BgRemovalError::config_value_error(
                "target_size",
                format!("{}x{}", width, height),
                "1x1 and above",
            ));
        }

        if self
            .preprocessing
            .normalization_std
            .iter()
            .any(|std| !std.is_finite() || *std <= 0.0)
        {
            return Err(BgRemovalError::invalid_config(
                "normalization_std values must be positive and finite",
            ));
        }

        if self.fetch_timeout_secs == 0 || self.fetch_timeout_secs > 600 {
            return Err(BgRemovalError::config_value_error(
                "fetch_timeout_secs",
                self.fetch_timeout_secs,
                "1-600",
            ));
        }

        if self.storage.upload_dir == self.storage.output_dir {
            return Err(BgRemovalError::invalid_config(
                "upload_dir and output_dir must be different directories",
            ));
        }

        Ok(())
    }
}

/// Builder for `ServiceConfig`
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Set the model file path
    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model.model_path = path.into();
        self
    }

    /// Set the inference backend
    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.model.backend = backend;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.model.execution_provider = provider;
        self
    }

    /// Set both intra and inter threads (0 = auto-detect)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.model.intra_threads = threads;
        self.config.model.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    /// Set the activation applied to raw model output
    #[must_use]
    pub fn activation(mut self, activation: OutputActivation) -> Self {
        self.config.model.activation = activation;
        self
    }

    /// Set the model working resolution
    #[must_use]
    pub fn target_size(mut self, width: u32, height: u32) -> Self {
        self.config.preprocessing.target_size = [width, height];
        self
    }

    /// Set the remote fetch timeout in seconds
    #[must_use]
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    /// Place upload and output directories under `root`
    #[must_use]
    pub fn data_dir<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.config.storage = StorageConfig::under(root);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`ServiceConfig::validate`]
    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Default model location: `$BGREMOVE_MODEL_PATH`, else the user cache directory
#[must_use]
pub fn default_model_path() -> PathBuf {
    if let Ok(path) = std::env::var(MODEL_PATH_ENV) {
        return PathBuf::from(path);
    }

    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bgremove-service")
        .join("models")
        .join("birefnet.onnx")
}
