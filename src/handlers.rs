//! Transport-agnostic request handlers
//!
//! Each handler maps one ingress shape onto the removal pipeline and returns
//! the JSON body a web route would send. Failures carry the status code the
//! route should answer with.

use crate::{
    config::ServiceConfig,
    error::{BgRemovalError, Result},
    inference::{BackendFactory, InferenceEngine},
    processor::BackgroundRemovalService,
    resolver::ImageSourceResolver,
    store::ArtifactStore,
    types::{ArtifactId, ImageReference, RemovalOutput},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Body returned after a successful removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalResponse {
    pub success: bool,
    /// `{uuid}.png`
    pub filename: String,
    /// `/images/{uuid}.png`
    pub image_url: String,
}

impl From<ArtifactId> for RemovalResponse {
    fn from(id: ArtifactId) -> Self {
        Self {
            success: true,
            filename: id.file_name(),
            image_url: id.retrieval_path(),
        }
    }
}

/// Health check body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

/// A failed request: status code plus a human-readable detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{status}: {detail}")]
pub struct HandlerError {
    pub status: u16,
    pub detail: String,
}

impl HandlerError {
    #[must_use]
    pub fn new<S: Into<String>>(status: u16, detail: S) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<BgRemovalError> for HandlerError {
    fn from(err: BgRemovalError) -> Self {
        let status = match &err {
            BgRemovalError::InvalidReference(_)
            | BgRemovalError::InvalidImageData(_)
            | BgRemovalError::UnsupportedContentType(_) => 400,
            BgRemovalError::SourceNotFound(_) | BgRemovalError::NotFound(_) => 404,
            BgRemovalError::SourceUnavailable(_) => 502,
            BgRemovalError::InferenceFailure(_)
            | BgRemovalError::ProcessingFailure(_)
            | BgRemovalError::Io(_)
            | BgRemovalError::InvalidConfig(_)
            | BgRemovalError::Model(_) => 500,
        };

        if status >= 500 {
            error!(status, error = %err, "❌ Request failed");
        } else {
            warn!(status, error = %err, "Request rejected");
        }

        Self::new(status, err.to_string())
    }
}

/// Handler-level result
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// Artifact retrieval without a loaded model
///
/// # Errors
/// - 404 `Image not found` for unknown or malformed names
pub async fn get_artifact(store: &ArtifactStore, filename: &str) -> HandlerResult<Vec<u8>> {
    match store.resolve(filename).await {
        Ok(bytes) => Ok(bytes),
        Err(BgRemovalError::NotFound(_)) => Err(HandlerError::new(404, "Image not found")),
        Err(e) => Err(e.into()),
    }
}

/// Entry points for the upload, URL, base64, retrieval and health routes
#[derive(Debug, Clone)]
pub struct RequestHandlers {
    service: BackgroundRemovalService,
    store: ArtifactStore,
}

impl RequestHandlers {
    #[must_use]
    pub fn new(service: BackgroundRemovalService, store: ArtifactStore) -> Self {
        Self { service, store }
    }

    /// Build the engine, resolver, service and store from configuration
    ///
    /// # Errors
    /// - Model loading failures
    /// - HTTP client or storage directory setup failures
    pub async fn bootstrap(config: &ServiceConfig, factory: &dyn BackendFactory) -> Result<Self> {
        config.validate()?;
        let engine = Arc::new(InferenceEngine::from_config(config, factory)?);
        Self::with_engine(config, engine).await
    }

    /// Build the resolver, service and store around an existing engine
    ///
    /// # Errors
    /// - HTTP client or storage directory setup failures
    pub async fn with_engine(config: &ServiceConfig, engine: Arc<InferenceEngine>) -> Result<Self> {
        let resolver = ImageSourceResolver::from_config(config)?;
        let service = BackgroundRemovalService::new(resolver, engine);
        let store = ArtifactStore::open(config.storage.clone()).await?;

        Ok(Self::new(service, store))
    }

    #[must_use]
    pub fn service(&self) -> &BackgroundRemovalService {
        &self.service
    }

    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Multipart upload route
    ///
    /// # Errors
    /// - 400 when the content type is missing or not `image/*`, or the bytes do not decode
    /// - 500 on inference or storage failure
    #[instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    pub async fn upload(&self, content_type: Option<&str>, bytes: &[u8]) -> HandlerResult<RemovalResponse> {
        let content_type = content_type.unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(BgRemovalError::UnsupportedContentType(format!(
                "'{content_type}', file must be an image"
            ))
            .into());
        }

        let upload = self.store.stage_upload(bytes).await?;
        let output = self.service.remove_background_staged(upload).await?;
        self.finish(output).await
    }

    /// Remote URL route
    ///
    /// # Errors
    /// - 400 for a malformed or non-http(s) URL, or undecodable content
    /// - 502 when the remote source cannot be fetched
    /// - 500 on inference or storage failure
    #[instrument(skip(self))]
    pub async fn from_url(&self, image_url: &str) -> HandlerResult<RemovalResponse> {
        let output = self
            .service
            .remove_background(ImageReference::Url(image_url.trim().to_string()))
            .await?;
        self.finish(output).await
    }

    /// Inline base64 route, with or without a `data:` URI prefix
    ///
    /// # Errors
    /// - 400 for invalid base64 or undecodable content
    /// - 500 on inference or storage failure
    #[instrument(skip(self, image_data), fields(payload_len = image_data.len()))]
    pub async fn from_base64(&self, image_data: &str) -> HandlerResult<RemovalResponse> {
        let reference = ImageReference::from_base64(image_data)?;
        let output = self.service.remove_background(reference).await?;
        self.finish(output).await
    }

    /// Artifact retrieval route
    ///
    /// # Errors
    /// - 404 `Image not found` for unknown or malformed names
    pub async fn get_image(&self, filename: &str) -> HandlerResult<Vec<u8>> {
        get_artifact(&self.store, filename).await
    }

    /// Health check route
    #[must_use]
    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            status: "online".to_string(),
            message: "Background Removal API is running".to_string(),
        }
    }

    async fn finish(&self, output: RemovalOutput) -> HandlerResult<RemovalResponse> {
        let id = self.store.persist(&output.composited).await?;
        info!(
            artifact = %id,
            total_ms = output.timings.total_ms,
            "📦 Result stored"
        );
        Ok(RemovalResponse::from(id))
    }
}
