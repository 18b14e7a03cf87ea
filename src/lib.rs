#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Background Removal Service
//!
//! The core of a background removal service: resolve an image from whatever
//! shape a request carries, run one shared segmentation model over it, and
//! store the RGBA result under a fresh identity that can be served back later.
//!
//! ## Features
//!
//! - **Any ingress shape**: raw bytes, local paths, http(s) URLs, base64
//!   payloads and `data:` URIs, or already decoded images
//! - **One shared model**: a single [`InferenceEngine`] behind a mutex, loaded
//!   once at startup and injected into every request path
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Artifact store**: outputs persisted as `{uuid}.png`, uploads cleaned up
//!   on every exit path
//! - **Transport-agnostic handlers**: the JSON bodies and status codes a web
//!   route would return, usable from any router
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_service::{DefaultBackendFactory, RequestHandlers, ServiceConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::builder()
//!     .model_path("models/birefnet.onnx")
//!     .data_dir("./data")
//!     .build()?;
//!
//! // Loads the model once; clone `handlers` into every route
//! let handlers = RequestHandlers::bootstrap(&config, &DefaultBackendFactory).await?;
//!
//! let response = handlers
//!     .from_url("https://example.com/portrait.jpg")
//!     .await?;
//! println!("stored at {}", response.image_url);
//!
//! let png = handlers.get_image(&response.filename).await?;
//! # let _ = png;
//! # Ok(())
//! # }
//! ```
//!
//! ## Using the service directly
//!
//! ```rust,no_run
//! use bgremove_service::{
//!     BackgroundRemovalService, DefaultBackendFactory, ImageReference, ImageSourceResolver,
//!     InferenceEngine, ServiceConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::default().with_env_overrides()?;
//! let engine = Arc::new(InferenceEngine::from_config(&config, &DefaultBackendFactory)?);
//! let service = BackgroundRemovalService::new(ImageSourceResolver::from_config(&config)?, engine);
//!
//! let output = service
//!     .remove_background(ImageReference::parse("input.jpg")?)
//!     .await?;
//! output.composited.image().save("output.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line interface and tracing subscriber setup
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`, `tracing-files`: JSON and file log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod inference;
pub mod processor;
pub mod resolver;
pub mod store;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use config::{
    BackendType, ExecutionProvider, ModelConfig, OutputActivation, PreprocessingConfig,
    ServiceConfig, ServiceConfigBuilder, StorageConfig,
};
pub use error::{BgRemovalError, Result};
pub use handlers::{HandlerError, HandlerResult, RemovalResponse, RequestHandlers, StatusResponse};
pub use inference::{
    BackendFactory, DefaultBackendFactory, InferenceBackend, InferenceEngine, MaskPredictor,
};
pub use processor::BackgroundRemovalService;
pub use resolver::{ImageSourceResolver, ResolveTarget, Resolved};
pub use store::{ArtifactStore, TransientUpload};
pub use types::{
    ArtifactId, CompositedImage, DecodedImage, ForegroundMask, ImageReference, MaskStatistics,
    ProcessingTimings, RemovalOutput,
};
pub use utils::{ImagePreprocessor, MaskPostprocessor};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat, TracingOutput};
