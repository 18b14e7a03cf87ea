//! Image source resolution across every reference shape

mod common;

use base64::Engine;
use bgremove_service::{
    error::BgRemovalError,
    types::{DecodedImage, ImageReference},
};
use common::{jpeg_bytes, png_bytes, resolver, serve_once};
use image::{DynamicImage, RgbImage};
use tempfile::TempDir;

#[tokio::test]
async fn test_every_shape_resolves_to_known_dimensions() {
    let dir = TempDir::new().unwrap();
    let png = png_bytes(40, 30);

    // Extension deliberately misleading: content is sniffed
    let path = dir.path().join("fixture.jpg");
    std::fs::write(&path, &png).unwrap();

    let url = serve_once(200, png.clone()).await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);

    let references = vec![
        ImageReference::Bytes(png.clone()),
        ImageReference::Path(path),
        ImageReference::Url(url),
        ImageReference::from_base64(&encoded).unwrap(),
        ImageReference::Decoded(DecodedImage::new(DynamicImage::ImageRgb8(RgbImage::new(40, 30)), None)),
    ];

    for reference in references {
        let kind = reference.kind();
        let decoded = resolver().resolve_decoded(reference).await.unwrap();
        assert_eq!(decoded.dimensions(), (40, 30), "{kind}");
    }
}

#[tokio::test]
async fn test_jpeg_source_keeps_format_hint() {
    let decoded = resolver()
        .resolve_decoded(ImageReference::Bytes(jpeg_bytes(16, 8)))
        .await
        .unwrap();
    assert_eq!(decoded.format, Some(image::ImageFormat::Jpeg));
    assert_eq!(decoded.dimensions(), (16, 8));
}

#[tokio::test]
async fn test_url_bytes_are_returned_unchanged() {
    let png = png_bytes(9, 9);
    let url = serve_once(200, png.clone()).await;

    let bytes = resolver().resolve_bytes(ImageReference::Url(url)).await.unwrap();
    assert_eq!(bytes, png);
}

#[tokio::test]
async fn test_data_uri_matches_raw_bytes() {
    let png = png_bytes(12, 7);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);

    let from_raw = resolver()
        .resolve_decoded(ImageReference::Bytes(png))
        .await
        .unwrap();
    let from_uri = resolver()
        .resolve_decoded(ImageReference::from_base64(&format!("data:image/png;base64,{encoded}")).unwrap())
        .await
        .unwrap();

    assert_eq!(from_uri.image, from_raw.image);
}

#[tokio::test]
async fn test_line_wrapped_data_uri_matches_raw_bytes() {
    let png = png_bytes(31, 17);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
    let wrapped = encoded
        .as_bytes()
        .chunks(76)
        .map(|line| std::str::from_utf8(line).unwrap())
        .collect::<Vec<_>>()
        .join("\r\n");
    assert!(wrapped.contains('\n'));

    let from_raw = resolver()
        .resolve_decoded(ImageReference::Bytes(png))
        .await
        .unwrap();
    let from_wrapped = resolver()
        .resolve_decoded(ImageReference::from_base64(&format!("data:image/png;base64,{wrapped}\n")).unwrap())
        .await
        .unwrap();

    assert_eq!(from_wrapped.image, from_raw.image);
}

#[tokio::test]
async fn test_directory_path_is_invalid_image_data() {
    let dir = TempDir::new().unwrap();
    let err = resolver()
        .resolve_decoded(ImageReference::Path(dir.path().to_path_buf()))
        .await
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::InvalidImageData(_)));
}

#[tokio::test]
async fn test_missing_path_is_source_not_found() {
    let dir = TempDir::new().unwrap();
    let err = resolver()
        .resolve_decoded(ImageReference::Path(dir.path().join("absent.png")))
        .await
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::SourceNotFound(_)));
}

#[tokio::test]
async fn test_unreachable_url_is_source_unavailable() {
    let err = resolver()
        .resolve_decoded(ImageReference::Url("http://127.0.0.1:1/missing.png".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::SourceUnavailable(_)));
}

#[tokio::test]
async fn test_error_status_is_source_unavailable() {
    let url = serve_once(404, b"not here".to_vec()).await;
    let err = resolver()
        .resolve_decoded(ImageReference::Url(url))
        .await
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::SourceUnavailable(_)));
}

#[tokio::test]
async fn test_non_image_body_is_invalid_image_data() {
    let url = serve_once(200, b"<html>hello</html>".to_vec()).await;
    let err = resolver()
        .resolve_decoded(ImageReference::Url(url))
        .await
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::InvalidImageData(_)));
}

#[tokio::test]
async fn test_malformed_bytes_are_invalid_image_data() {
    let mut truncated = png_bytes(20, 20);
    truncated.truncate(truncated.len() / 2);

    for bytes in [Vec::new(), b"definitely not an image".to_vec(), truncated] {
        let err = resolver()
            .resolve_decoded(ImageReference::Bytes(bytes))
            .await
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidImageData(_)), "{err}");
    }
}

#[test]
fn test_parse_classifies_references() {
    assert!(matches!(
        ImageReference::parse("https://example.com/cat.png").unwrap(),
        ImageReference::Url(_)
    ));
    assert!(matches!(
        ImageReference::parse("HTTP://example.com/cat.png").unwrap(),
        ImageReference::Url(_)
    ));
    assert!(matches!(
        ImageReference::parse("photos/cat.png").unwrap(),
        ImageReference::Path(_)
    ));

    for bad in ["", "   ", "ftp://example.com/cat.png", "file:///etc/passwd", "cat\0.png"] {
        let err = ImageReference::parse(bad).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidReference(_)), "{bad:?}");
    }
}

#[test]
fn test_invalid_base64_is_invalid_reference() {
    let err = ImageReference::from_base64("data:image/png;base64,@@@not-base64@@@").unwrap_err();
    assert!(matches!(err, BgRemovalError::InvalidReference(_)));
}
