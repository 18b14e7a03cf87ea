//! Core types for image references, masks and removal results

use crate::error::{BgRemovalError, Result};
use base64::Engine;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::PathBuf;
use uuid::Uuid;

/// Where an input image comes from
///
/// Constructed by the request layer and consumed once by
/// [`ImageSourceResolver`](crate::resolver::ImageSourceResolver).
#[derive(Debug, Clone)]
pub enum ImageReference {
    /// Encoded image bytes already in memory
    Bytes(Vec<u8>),
    /// Remote http(s) location
    Url(String),
    /// Local file, content sniffed regardless of extension
    Path(PathBuf),
    /// Image that has already been decoded
    Decoded(DecodedImage),
}

impl ImageReference {
    /// Classify a free-form string as a URL or a local path
    ///
    /// # Errors
    /// - Empty string or a string containing NUL
    /// - A `scheme://` prefix other than `http` or `https`
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(BgRemovalError::invalid_reference("empty image reference"));
        }
        if trimmed.contains('\0') {
            return Err(BgRemovalError::invalid_reference(
                "image reference contains a NUL byte",
            ));
        }

        if let Some((scheme, _)) = trimmed.split_once("://") {
            let scheme = scheme.to_ascii_lowercase();
            return match scheme.as_str() {
                "http" | "https" => Ok(Self::Url(trimmed.to_string())),
                _ => Err(BgRemovalError::invalid_reference(format!(
                    "unsupported scheme '{}' in '{}'",
                    scheme, trimmed
                ))),
            };
        }

        Ok(Self::Path(PathBuf::from(trimmed)))
    }

    /// Decode an inline base64 payload, with or without a `data:` URI prefix
    ///
    /// Everything up to and including the first `base64,` is discarded, as is
    /// any ASCII whitespace in the remainder.
    ///
    /// # Errors
    /// - Payload is not valid standard-alphabet base64
    pub fn from_base64(payload: &str) -> Result<Self> {
        let encoded: String = payload
            .split_once("base64,")
            .map_or(payload, |(_, data)| data)
            .split_ascii_whitespace()
            .collect();

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| BgRemovalError::invalid_reference(format!("invalid base64 payload: {}", e)))?;

        Ok(Self::Bytes(bytes))
    }

    /// Short label for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Url(_) => "url",
            Self::Path(_) => "path",
            Self::Decoded(_) => "decoded",
        }
    }
}

/// A decoded raster plus the container format it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub image: DynamicImage,
    /// Source format, used only as a hint when re-encoding
    pub format: Option<ImageFormat>,
}

impl DecodedImage {
    #[must_use]
    pub fn new(image: DynamicImage, format: Option<ImageFormat>) -> Self {
        Self { image, format }
    }

    /// Decode encoded bytes, sniffing the container from the content
    ///
    /// # Errors
    /// - Bytes are empty, of an unknown format, or corrupt
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(BgRemovalError::invalid_image_data("empty image payload"));
        }

        let format = image::guess_format(bytes)
            .map_err(|e| BgRemovalError::invalid_image_data(format!("unrecognized image format: {}", e)))?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| BgRemovalError::invalid_image_data(format!("failed to decode {:?}: {}", format, e)))?;

        Ok(Self::new(image, Some(format)))
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Force 3-channel RGB8, dropping alpha and palette; the format hint is kept
    #[must_use]
    pub fn to_rgb(&self) -> Self {
        Self {
            image: DynamicImage::ImageRgb8(self.image.to_rgb8()),
            format: self.format,
        }
    }

    /// Encode with the source format hint, falling back to PNG
    ///
    /// # Errors
    /// - PNG encoding fails
    pub fn encode(&self) -> Result<Vec<u8>> {
        if let Some(format) = self.format.filter(|f| *f != ImageFormat::Png && f.writing_enabled()) {
            match encode_dynamic(&self.image, format) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    log::debug!("Re-encoding as {:?} failed ({}), falling back to PNG", format, e);
                },
            }
        }

        encode_dynamic(&self.image, ImageFormat::Png)
    }
}

fn encode_dynamic(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), format)
        .map_err(|e| BgRemovalError::processing(format!("failed to encode {:?}: {}", format, e)))?;
    Ok(buffer)
}

/// Per-pixel foreground confidence (0-255)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundMask {
    /// Row-major grayscale values
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl ForegroundMask {
    /// Create a new mask
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &ImageBuffer<Luma<u8>, Vec<u8>>) -> Self {
        Self::new(image.as_raw().clone(), image.dimensions())
    }

    /// Convert mask to a grayscale image
    ///
    /// # Errors
    /// - Data length does not match the dimensions
    pub fn to_image(&self) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (width, height) = self.dimensions;
        ImageBuffer::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            BgRemovalError::processing(format!(
                "mask data length {} does not match {}x{}",
                self.data.len(),
                width,
                height
            ))
        })
    }

    /// Resample to new dimensions with bicubic (Catmull-Rom) filtering
    ///
    /// # Errors
    /// - Data length does not match the current dimensions
    pub fn resize(&self, new_width: u32, new_height: u32) -> Result<Self> {
        if self.dimensions == (new_width, new_height) {
            return Ok(self.clone());
        }

        let current = self.to_image()?;
        let resized = image::imageops::resize(
            &current,
            new_width,
            new_height,
            image::imageops::FilterType::CatmullRom,
        );

        Ok(Self::from_image(&resized))
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let background_pixels = total_pixels - foreground_pixels;
        let ratio = |count: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                count as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: ratio(foreground_pixels),
            background_ratio: ratio(background_pixels),
        }
    }
}

/// Statistics about a foreground mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// RGBA image whose alpha channel is a foreground mask
#[derive(Debug, Clone, PartialEq)]
pub struct CompositedImage {
    image: RgbaImage,
}

impl CompositedImage {
    /// Attach `mask` as the alpha channel of `rgb`
    ///
    /// Color values are kept as-is, including where alpha is zero.
    ///
    /// # Errors
    /// - Mask dimensions differ from the image dimensions
    /// - Mask data length does not match its dimensions
    pub fn from_rgb_and_mask(rgb: &RgbImage, mask: &ForegroundMask) -> Result<Self> {
        let (width, height) = rgb.dimensions();
        if mask.dimensions != (width, height) {
            return Err(BgRemovalError::processing(format!(
                "mask is {}x{} but image is {}x{}",
                mask.dimensions.0, mask.dimensions.1, width, height
            )));
        }
        if mask.data.len() != (width as usize) * (height as usize) {
            return Err(BgRemovalError::processing(format!(
                "mask holds {} values for a {}x{} image",
                mask.data.len(),
                width,
                height
            )));
        }

        let mut image = RgbaImage::new(width, height);
        for ((out, src), alpha) in image.pixels_mut().zip(rgb.pixels()).zip(mask.data.iter()) {
            *out = image::Rgba([src[0], src[1], src[2], *alpha]);
        }

        Ok(Self { image })
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn into_inner(self) -> RgbaImage {
        self.image
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Encode as PNG with alpha
    ///
    /// # Errors
    /// - PNG encoding fails
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| BgRemovalError::processing(format!("failed to encode PNG: {}", e)))?;
        Ok(buffer)
    }
}

/// Timing breakdown for one removal request, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Fetching/reading and decoding the source
    pub resolve_ms: u64,

    /// Resize, normalize and tensor conversion
    pub preprocessing_ms: u64,

    /// Forward pass, including time spent waiting for the shared model
    pub inference_ms: u64,

    /// Activation, quantization, mask resampling and compositing
    pub postprocessing_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of the total spent in the forward pass
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }
}

/// Result of a background removal request
#[derive(Debug, Clone)]
pub struct RemovalOutput {
    /// Input with the predicted mask as alpha
    pub composited: CompositedImage,
    /// RGB8 normalized input, untouched by compositing
    pub origin: DecodedImage,
    pub timings: ProcessingTimings,
}

/// Identity of a persisted artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    /// Fresh random identity
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse `{uuid}` or `{uuid}.png`
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".png").unwrap_or(name);
        Uuid::try_parse(stem).ok().map(Self)
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// `{uuid}.png`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.png", self.0)
    }

    /// `/images/{uuid}.png`
    #[must_use]
    pub fn retrieval_path(&self) -> String {
        format!("/images/{}", self.file_name())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
