#![allow(dead_code)]

use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use image::{ImageFormat, RgbImage};
use stash_core::{
    MediaError,
    import::{FsImportConfig, FsImporter, ImportPipeline},
    index::{Indexer, MemoryIndexer},
    inspect::InspecterRegistry,
    item::Item,
    store::{FileSystemStore, Store},
};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<FileSystemStore>,
    pub index: Arc<MemoryIndexer>,
    pub importer: FsImporter,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(FsImportConfig {
            workers: 2,
            ..FsImportConfig::default()
        })
    }

    pub fn with_config(config: FsImportConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FileSystemStore::new(dir.path().join("store")));
        let index = Arc::new(MemoryIndexer::new());
        let pipeline = ImportPipeline::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&index) as Arc<dyn Indexer>,
            InspecterRegistry::with_defaults(),
        );
        let importer = FsImporter::new(pipeline, config);
        Self {
            dir,
            store,
            index,
            importer,
        }
    }

    /// A fresh directory under the harness root.
    pub fn subdir(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path).expect("create subdir");
        path
    }

    pub async fn stored_items(&self) -> Vec<Item> {
        let mut items = Vec::new();
        let mut stream = self.store.iterate();
        while let Some(item) = stream.recv().await {
            items.push(item.expect("decodable metadata"));
        }
        items
    }
}

/// A small solid-colour PNG; `seed` changes the colour and so the hash.
pub fn png(seed: u8) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::from_pixel(16, 8, image::Rgb([seed, 100, 200]))
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub fn write(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, bytes).expect("write file");
}

pub async fn drain(mut errors: mpsc::Receiver<MediaError>) -> Vec<MediaError> {
    let mut out = Vec::new();
    while let Some(err) = errors.recv().await {
        out.push(err);
    }
    out
}

/// Poll `check` until it passes or `limit` runs out.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check().await
}
