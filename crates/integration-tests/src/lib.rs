//! Shared fixtures: the engine wired to a real SQLite store (in memory) and a
//! local image store on a temporary directory.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use domains::testing::FixedClock;
use domains::traits::StreetSnapper;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use services::{Engine, EngineSettings, Ports};
use storage_adapters::{LocalImageStore, SqliteStore};
use tempfile::TempDir;
use uuid::Uuid;

pub const MEDIA_PREFIX: &str = "/media";

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

/// A small solid-colour PNG.
pub fn png(width: u32, height: u32) -> Bytes {
    let img = RgbImage::from_pixel(width, height, Rgb([90, 90, 90]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap_or_default();
    Bytes::from(out.into_inner())
}

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub clock: Arc<FixedClock>,
    pub engine: Engine,
    pub settings: EngineSettings,
    media_dir: TempDir,
}

impl Harness {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_snapper(None).await
    }

    pub async fn with_snapper(snapper: Option<Arc<dyn StreetSnapper>>) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStore::new("sqlite::memory:").await?);
        let media_dir = tempfile::tempdir()?;
        let media = Arc::new(LocalImageStore::new(
            media_dir.path().to_path_buf(),
            MEDIA_PREFIX.to_string(),
            5 * 1024 * 1024,
        ));
        let clock = Arc::new(FixedClock::new(t0()));
        let settings = EngineSettings::default();

        let ports = Ports::from_store(store.clone(), media, snapper, clock.clone());
        let engine = Engine::new(ports, &settings);
        Ok(Self {
            store,
            clock,
            engine,
            settings,
            media_dir,
        })
    }

    pub async fn user(&self) -> anyhow::Result<Uuid> {
        let id = Uuid::now_v7();
        self.engine.provision_user(id).await?;
        Ok(id)
    }

    pub async fn moderator(&self) -> anyhow::Result<Uuid> {
        let id = Uuid::now_v7();
        self.engine.promote_moderator(id).await?;
        Ok(id)
    }

    pub fn media_root(&self) -> &Path {
        self.media_dir.path()
    }

    /// Number of stored image files.
    pub fn stored_images(&self) -> usize {
        std::fs::read_dir(self.media_dir.path().join("images"))
            .map(|entries| entries.filter_map(Result::ok).count())
            .unwrap_or(0)
    }
}
