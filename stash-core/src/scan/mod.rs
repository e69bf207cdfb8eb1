//! Recursive directory scanning.
//!
//! [`scan`] walks a tree on a blocking thread and streams every qualifying
//! regular file over a bounded channel, so consumers pull candidates lazily
//! and the walk pauses when they fall behind. The producer closes the
//! channel when the walk ends.
//!
//! Error policy: an entry that cannot be read because of permissions, or that
//! vanished mid-walk, skips that subtree with a warning. Any other walk error
//! ends the scan and is delivered as the final `Err` item. A root that cannot
//! be read is such an error.

pub mod settings;

use std::{
    collections::HashSet,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{sync::mpsc, task::spawn_blocking};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{MediaError, Result};

pub use settings::{METAFILE_EXT, METAFILE_MIME, TAG_MIME, mime_for_path};

/// Number of scan results buffered ahead of the consumer.
pub const SCAN_BUFFER: usize = 100;

/// Set of mime types a scan or watch accepts.
pub type MimeSet = Arc<HashSet<String>>;

pub fn mime_set<I, S>(types: I) -> MimeSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Arc::new(types.into_iter().map(Into::into).collect())
}

/// A file that qualified for import.
#[derive(Clone, Debug)]
pub struct ScanResult {
    pub path: PathBuf,
    pub mime: String,
    pub metadata: fs::Metadata,
}

impl ScanResult {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Build a [`ScanResult`] if the path's mime type is accepted.
///
/// Unwanted or unrecognised types are logged and yield `None`.
pub fn scan_result_for(
    path: &Path,
    metadata: fs::Metadata,
    accepted: &HashSet<String>,
) -> Option<ScanResult> {
    match mime_for_path(path) {
        Some(mime) if accepted.contains(mime) => Some(ScanResult {
            path: path.to_path_buf(),
            mime: mime.to_string(),
            metadata,
        }),
        other => {
            debug!(
                path = %path.display(),
                mime = other.unwrap_or("<unknown>"),
                "skipping unwanted mime type"
            );
            None
        }
    }
}

/// Start a lazy scan of `root`.
pub fn scan(root: impl Into<PathBuf>, accepted: MimeSet) -> mpsc::Receiver<Result<ScanResult>> {
    let root = root.into();
    let (tx, rx) = mpsc::channel(SCAN_BUFFER);

    tokio::spawn(async move {
        let walk_tx = tx.clone();
        let walk = spawn_blocking(move || walk_tree(&root, &accepted, &walk_tx)).await;
        if let Err(join_err) = walk {
            let _ = tx
                .send(Err(MediaError::Internal(format!(
                    "directory walk panicked: {join_err}"
                ))))
                .await;
        }
    });

    rx
}

fn walk_tree(
    root: &Path,
    accepted: &HashSet<String>,
    tx: &mpsc::Sender<Result<ScanResult>>,
) {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() > 0 && is_skippable(&err) => {
                warn!(
                    path = ?err.path(),
                    error = %err,
                    "skipping unreadable directory entry"
                );
                continue;
            }
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                let _ = tx.blocking_send(Err(MediaError::Io(std::io::Error::other(
                    format!("scan of {path} aborted: {err}"),
                ))));
                return;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "file vanished during scan");
                continue;
            }
        };

        if let Some(result) = scan_result_for(entry.path(), metadata, accepted) {
            if tx.blocking_send(Ok(result)).is_err() {
                // Consumer hung up; nothing left to do.
                return;
            }
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(settings::is_hidden_name)
}

fn is_skippable(err: &walkdir::Error) -> bool {
    err.io_error().is_some_and(|io| {
        matches!(io.kind(), ErrorKind::PermissionDenied | ErrorKind::NotFound)
    })
}
