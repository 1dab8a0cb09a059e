//! # Local image store
//!
//! Filesystem implementation of `ImageStore`. Uploads are decoded, scaled to a
//! fixed height, re-encoded as JPEG and written under a fresh key. Every
//! upload gets its own file, even for identical bytes, so deleting one image
//! row never takes a file another row still points at.

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use domains::media::{storage_key_from_url, url_for_storage_key};
use domains::traits::ImageStore;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Height every stored image is scaled to.
pub const TARGET_HEIGHT: u32 = 480;
const KEY_DIRECTORY: &str = "images";

pub struct LocalImageStore {
    /// Root directory for all uploads (e.g., "./data/media")
    root_path: PathBuf,
    /// Public URL prefix the files are served under (e.g., "/media")
    url_prefix: String,
    max_upload_bytes: usize,
}

impl LocalImageStore {
    pub fn new(root: PathBuf, url_prefix: String, max_upload_bytes: usize) -> Self {
        Self {
            root_path: root,
            url_prefix,
            max_upload_bytes,
        }
    }

    /// Resolves a storage key to a path under the root, refusing anything
    /// that would escape it.
    fn path_for_key(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            bail!("refusing storage key outside the media root: {key}");
        }
        Ok(self.root_path.join(relative))
    }
}

fn accepted_format(data: &[u8]) -> Option<ImageFormat> {
    match image::guess_format(data) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP)) => Some(format),
        _ => None,
    }
}

/// Decodes, scales to [`TARGET_HEIGHT`] keeping the aspect ratio, and
/// re-encodes as JPEG.
fn normalise(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()
        .context("unable to decode image")?;
    if img.height() == 0 {
        bail!("image has zero height");
    }

    let width = ((f64::from(TARGET_HEIGHT) / f64::from(img.height())) * f64::from(img.width()))
        .round()
        .max(1.0) as u32;
    let resized = img.resize_exact(width, TARGET_HEIGHT, FilterType::Triangle);

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(&self, data: Bytes) -> anyhow::Result<String> {
        if data.len() > self.max_upload_bytes {
            bail!(
                "image of {} bytes exceeds the {} byte limit",
                data.len(),
                self.max_upload_bytes
            );
        }
        if accepted_format(&data).is_none() {
            bail!("The file is not an image!");
        }

        let jpeg = tokio::task::spawn_blocking(move || normalise(&data)).await??;

        let key = format!("{KEY_DIRECTORY}/{}.jpg", Uuid::now_v7().simple());
        let target_path = self.path_for_key(&key)?;
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target_path, &jpeg)
            .await
            .with_context(|| format!("unable to write {key}"))?;

        debug!(%key, bytes = jpeg.len(), "image stored");
        Ok(url_for_storage_key(&self.url_prefix, &key))
    }

    /// Deleting a file that is already gone succeeds.
    async fn delete(&self, image_url: &str) -> anyhow::Result<()> {
        let key = storage_key_from_url(image_url)
            .with_context(|| format!("no storage key in url {image_url}"))?;
        let path = self.path_for_key(&key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(%key, "image already absent");
                Ok(())
            }
            Err(err) => Err(err).with_context(|| format!("unable to delete {key}")),
        }
    }

    fn is_probably_image(&self, data: &[u8]) -> bool {
        accepted_format(data).is_some()
    }
}
