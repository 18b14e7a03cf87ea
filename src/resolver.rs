//! Image source resolution
//!
//! Normalizes every [`ImageReference`] shape into either a decoded image or a
//! validated encoded buffer. Remote fetches share one HTTP client; decoding
//! runs on the blocking pool so the async runtime keeps serving other I/O.

use crate::{
    config::ServiceConfig,
    error::{BgRemovalError, Result},
    types::{DecodedImage, ImageReference},
};
use reqwest::{Client, Url};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

/// What the caller wants back from [`ImageSourceResolver::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveTarget {
    Decoded,
    Bytes,
}

/// Resolution result
#[derive(Debug, Clone)]
pub enum Resolved {
    Decoded(DecodedImage),
    /// Encoded image bytes that are known to decode
    Bytes(Vec<u8>),
}

/// Turns image references into decoded images or encoded bytes
#[derive(Debug, Clone)]
pub struct ImageSourceResolver {
    client: Client,
}

impl ImageSourceResolver {
    /// Create a resolver whose remote fetches time out after `fetch_timeout`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(fetch_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| BgRemovalError::invalid_config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Create a resolver using the configured fetch timeout
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Self::new(config.fetch_timeout())
    }

    /// Resolve `reference` into the requested representation
    ///
    /// # Errors
    /// - `InvalidReference` for a malformed or non-http(s) URL
    /// - `SourceNotFound` for a missing local file
    /// - `InvalidImageData` for a local path that is a directory
    /// - `SourceUnavailable` for transport errors, timeouts and non-2xx responses
    /// - `InvalidImageData` when the bytes do not decode
    #[instrument(skip(self, reference), fields(kind = reference.kind()))]
    pub async fn resolve(&self, reference: ImageReference, want: ResolveTarget) -> Result<Resolved> {
        let bytes = match reference {
            ImageReference::Decoded(image) => {
                return match want {
                    ResolveTarget::Decoded => Ok(Resolved::Decoded(image)),
                    ResolveTarget::Bytes => {
                        let encoded = run_blocking(move || image.encode()).await?;
                        Ok(Resolved::Bytes(encoded))
                    },
                };
            },
            ImageReference::Bytes(bytes) => bytes,
            ImageReference::Url(url) => self.fetch(&url).await?,
            ImageReference::Path(path) => read_path(&path).await?,
        };

        debug!(size_bytes = bytes.len(), "📥 Source bytes loaded");

        let (decoded, bytes) = run_blocking(move || {
            let decoded = DecodedImage::from_bytes(&bytes)?;
            Ok((decoded, bytes))
        })
        .await?;

        debug!(
            width = decoded.image.width(),
            height = decoded.image.height(),
            format = ?decoded.format,
            "🖼️ Source decoded"
        );

        Ok(match want {
            ResolveTarget::Decoded => Resolved::Decoded(decoded),
            ResolveTarget::Bytes => Resolved::Bytes(bytes),
        })
    }

    /// Resolve to a decoded image
    ///
    /// # Errors
    /// - Same as [`ImageSourceResolver::resolve`]
    pub async fn resolve_decoded(&self, reference: ImageReference) -> Result<DecodedImage> {
        match self.resolve(reference, ResolveTarget::Decoded).await? {
            Resolved::Decoded(image) => Ok(image),
            Resolved::Bytes(_) => Err(BgRemovalError::processing(
                "resolver returned bytes for a decoded request",
            )),
        }
    }

    /// Resolve to encoded bytes
    ///
    /// # Errors
    /// - Same as [`ImageSourceResolver::resolve`]
    pub async fn resolve_bytes(&self, reference: ImageReference) -> Result<Vec<u8>> {
        match self.resolve(reference, ResolveTarget::Bytes).await? {
            Resolved::Bytes(bytes) => Ok(bytes),
            Resolved::Decoded(_) => Err(BgRemovalError::processing(
                "resolver returned a decoded image for a bytes request",
            )),
        }
    }

    async fn fetch(&self, raw_url: &str) -> Result<Vec<u8>> {
        let url = Url::parse(raw_url)
            .map_err(|e| BgRemovalError::invalid_reference(format!("invalid URL '{raw_url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(BgRemovalError::invalid_reference(format!(
                "only absolute http(s) URLs are supported, got '{raw_url}'"
            )));
        }

        debug!(url = %url, "🌐 Fetching remote image");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| BgRemovalError::source_unavailable(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BgRemovalError::source_unavailable(
                url.as_str(),
                format!("HTTP status {status}"),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BgRemovalError::source_unavailable(url.as_str(), e))?;

        Ok(body.to_vec())
    }
}

async fn read_path(path: &Path) -> Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BgRemovalError::source_not_found(
            path.display().to_string(),
        )),
        Err(e) => match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => Err(BgRemovalError::invalid_image_data(format!(
                "'{}' is a directory, not an image file",
                path.display()
            ))),
            _ => Err(BgRemovalError::file_io_error("read image file", path, &e)),
        },
    }
}

/// Run CPU-bound work on the blocking pool
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BgRemovalError::processing(format!("Decoding task failed: {e}")))?
}
