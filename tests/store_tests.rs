//! Artifact persistence and retrieval

mod common;

use bgremove_service::{
    config::StorageConfig,
    error::BgRemovalError,
    store::ArtifactStore,
    types::{ArtifactId, CompositedImage, ForegroundMask},
};
use common::patterned_rgb;
use std::collections::HashSet;
use tempfile::TempDir;

fn composite(width: u32, height: u32) -> CompositedImage {
    let rgb = patterned_rgb(width, height, 4);
    let data = (0..width * height).map(|i| (i % 256) as u8).collect();
    CompositedImage::from_rgb_and_mask(&rgb, &ForegroundMask::new(data, (width, height))).unwrap()
}

#[tokio::test]
async fn test_persist_then_resolve_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(StorageConfig::under(dir.path())).await.unwrap();
    let image = composite(33, 21);

    let id = store.persist(&image).await.unwrap();
    let stored = store.resolve(&id.file_name()).await.unwrap();

    assert_eq!(stored, image.to_png_bytes().unwrap());
    assert_eq!(stored, std::fs::read(store.artifact_path(&id)).unwrap());

    let decoded = image::load_from_memory(&stored).unwrap().to_rgba8();
    assert_eq!(&decoded, image.image());
}

#[tokio::test]
async fn test_identities_are_unique_under_concurrency() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(StorageConfig::under(dir.path())).await.unwrap();
    let image = composite(4, 4);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            let image = image.clone();
            tokio::spawn(async move { store.persist(&image).await.unwrap() })
        })
        .collect();

    let ids: HashSet<ArtifactId> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(ids.len(), 16);
    assert_eq!(std::fs::read_dir(store.output_dir()).unwrap().count(), 16);
}

#[tokio::test]
async fn test_resolve_never_leaves_output_dir() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(StorageConfig::under(dir.path())).await.unwrap();

    let upload = store.stage_upload(b"secret").await.unwrap();
    let staged_name = upload
        .path()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();

    // A staged upload is named by a UUID too, but lives in the other directory
    let err = store.resolve(&staged_name).await.unwrap_err();
    assert!(matches!(err, BgRemovalError::NotFound(_)));

    let err = store
        .resolve(&format!("../uploads/{staged_name}"))
        .await
        .unwrap_err();
    assert!(matches!(err, BgRemovalError::NotFound(_)));
}

#[tokio::test]
async fn test_reopen_serves_existing_artifacts() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::under(dir.path());

    let id = {
        let store = ArtifactStore::open(config.clone()).await.unwrap();
        store.persist(&composite(5, 5)).await.unwrap()
    };

    let store = ArtifactStore::open(config).await.unwrap();
    assert!(store.resolve(&id.to_string()).await.is_ok());
}
