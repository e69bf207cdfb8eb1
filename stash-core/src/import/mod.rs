//! Turning files on disk into stored, indexed items.
//!
//! [`FsImporter`] is the coordinator: batch imports drain a [`crate::scan`]
//! stream, watch imports are fed by [`crate::fs_watch`], and both submit to
//! the same bounded [`WorkerPool`], so the number of concurrent imports is
//! capped no matter how many sources are active.

mod fs;
mod pipeline;
mod pool;

use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::MediaError,
    scan::{MimeSet, mime_set},
};

pub use fs::{DEFAULT_DEBOUNCE, FsImportConfig, FsImporter};
pub use pipeline::ImportPipeline;
pub use pool::{InFlightPaths, PathGuard, WorkerPool};

/// Capacity of the error channels handed back to callers.
pub const ERROR_BUFFER: usize = 64;

/// Settings for one import run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportOptions {
    /// Directory to scan or watch. For watches, `None` falls back to the
    /// importer's configured directory.
    pub dir: Option<PathBuf>,
    /// Mime types to accept.
    pub mime_types: Vec<String>,
    /// Tags stamped on every item of the run.
    pub tags: Vec<String>,
    /// Shared "added" time for the whole batch; `None` means now, per item.
    pub added: Option<DateTime<Utc>>,
    pub delete_after_import: bool,
}

impl ImportOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mime_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn added_at(mut self, at: DateTime<Utc>) -> Self {
        self.added = Some(at);
        self
    }

    pub fn delete_after_import(mut self, delete: bool) -> Self {
        self.delete_after_import = delete;
        self
    }

    pub fn accepted(&self) -> MimeSet {
        mime_set(self.mime_types.iter().cloned())
    }
}

/// Source of items.
///
/// Both calls return immediately; work happens on spawned tasks and every
/// per-file failure arrives on the returned channel. The channel closes when
/// the run is over.
pub trait Importer: Send + Sync + fmt::Debug {
    /// Import everything under `opts.dir` once.
    fn import(&self, opts: ImportOptions) -> mpsc::Receiver<MediaError>;

    /// Keep importing new files until `shutdown` fires. In-flight work is
    /// drained before the channel closes.
    fn watch(&self, opts: ImportOptions, shutdown: CancellationToken) -> mpsc::Receiver<MediaError>;
}

/// A running watch import.
#[derive(Debug)]
pub struct WatchHandle {
    pub errors: mpsc::Receiver<MediaError>,
    pub shutdown: CancellationToken,
}

impl WatchHandle {
    /// Ask the watch to stop. Drain `errors` to wait for it.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

/// Importer that never imports anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullImporter;

impl Importer for NullImporter {
    fn import(&self, _opts: ImportOptions) -> mpsc::Receiver<MediaError> {
        let (_tx, rx) = mpsc::channel(1);
        rx
    }

    fn watch(&self, _opts: ImportOptions, shutdown: CancellationToken) -> mpsc::Receiver<MediaError> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            shutdown.cancelled().await;
            drop(tx);
        });
        rx
    }
}
