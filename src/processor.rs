//! Background removal orchestration
//!
//! Resolver -> RGB normalization -> mask prediction -> compositing. The
//! predictor is shared by every request; the service itself holds no mutable
//! state and is cheap to clone.

use crate::{
    error::{BgRemovalError, Result},
    inference::MaskPredictor,
    resolver::ImageSourceResolver,
    store::TransientUpload,
    types::{CompositedImage, ImageReference, ProcessingTimings, RemovalOutput},
};
use image::DynamicImage;
use instant::Instant;
use std::sync::Arc;
use tracing::{info, instrument, span, Level};

/// Removes backgrounds from images referenced in any supported shape
#[derive(Clone)]
pub struct BackgroundRemovalService {
    resolver: ImageSourceResolver,
    predictor: Arc<dyn MaskPredictor>,
}

impl std::fmt::Debug for BackgroundRemovalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalService")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalService {
    #[must_use]
    pub fn new(resolver: ImageSourceResolver, predictor: Arc<dyn MaskPredictor>) -> Self {
        Self { resolver, predictor }
    }

    #[must_use]
    pub fn resolver(&self) -> &ImageSourceResolver {
        &self.resolver
    }

    /// Remove the background from `reference`
    ///
    /// The returned `origin` is the RGB8-normalized input; the composite is a
    /// copy of it with the predicted mask as alpha.
    ///
    /// # Errors
    /// - Resolver errors, unchanged
    /// - `InferenceFailure` from the predictor
    /// - `ProcessingFailure` when the blocking task dies or the mask does not fit
    #[instrument(skip(self, reference), fields(kind = reference.kind()))]
    pub async fn remove_background(&self, reference: ImageReference) -> Result<RemovalOutput> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        let resolve_start = Instant::now();
        let decoded = self.resolver.resolve_decoded(reference).await?;
        timings.resolve_ms = resolve_start.elapsed().as_millis() as u64;

        let origin = decoded.to_rgb();
        let predictor = Arc::clone(&self.predictor);
        let working = origin.clone();

        let (composited, mut timings) = tokio::task::spawn_blocking(move || {
            let mask = predictor.predict_with_timings(&working, &mut timings)?;

            let _span = span!(
                Level::DEBUG,
                "compositing",
                width = %mask.dimensions.0,
                height = %mask.dimensions.1
            )
            .entered();
            let composite_start = Instant::now();
            let rgb = match working.image {
                DynamicImage::ImageRgb8(rgb) => rgb,
                other => other.to_rgb8(),
            };
            let composited = CompositedImage::from_rgb_and_mask(&rgb, &mask)?;
            timings.postprocessing_ms += composite_start.elapsed().as_millis() as u64;

            Ok::<_, BgRemovalError>((composited, timings))
        })
        .await
        .map_err(|e| BgRemovalError::processing(format!("Background removal task failed: {e}")))??;

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        let (width, height) = composited.dimensions();
        info!(
            width,
            height,
            resolve_ms = timings.resolve_ms,
            preprocessing_ms = timings.preprocessing_ms,
            inference_ms = timings.inference_ms,
            postprocessing_ms = timings.postprocessing_ms,
            total_ms = timings.total_ms,
            "✅ Background removed"
        );

        Ok(RemovalOutput {
            composited,
            origin,
            timings,
        })
    }

    /// Process a staged upload and release it whatever the outcome
    ///
    /// # Errors
    /// - Same as [`BackgroundRemovalService::remove_background`]
    pub async fn remove_background_staged(&self, upload: TransientUpload) -> Result<RemovalOutput> {
        let result = self
            .remove_background(ImageReference::Path(upload.path().to_path_buf()))
            .await;
        upload.release().await;
        result
    }
}
