//! Content-addressed persistence of raw bytes plus a metadata record.

pub mod fs;

use std::{fmt, path::PathBuf};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncSeek},
    sync::mpsc,
};

use crate::{error::Result, item::Item};

pub use fs::FileSystemStore;

/// Seekable handle over stored content. Dropping it closes it.
pub trait ContentReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> ContentReader for T where T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized {}

/// Every stored item, one `Result` per metadata record. A record that fails
/// to decode arrives as `Err` and the walk keeps going.
pub type ItemStream = mpsc::Receiver<Result<Item>>;

/// Content never changes once written: a new byte sequence is a new hash and
/// therefore a new item. Only metadata goes through [`Store::update`].
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Persist content and metadata for a new hash. Fails with
    /// `DuplicateItem` when content for this hash is already present.
    async fn put(
        &self,
        item: &Item,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()>;

    /// Open the raw content for `hash`.
    async fn get(&self, hash: &str) -> Result<Box<dyn ContentReader>>;

    /// Read the metadata record for `hash`.
    async fn meta(&self, hash: &str) -> Result<Item>;

    /// Overwrite the metadata of an item that already exists.
    async fn update(&self, item: &Item) -> Result<()>;

    /// Walk the whole store. Each call starts a fresh walk.
    fn iterate(&self) -> ItemStream;

    /// Where the content for `hash` lives, without touching the disk.
    fn location(&self, hash: &str) -> PathBuf;
}
