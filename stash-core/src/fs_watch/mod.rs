//! Watch imports.
//!
//! A thin wrapper around `notify`: raw notifications for a directory tree are
//! turned into one debounced import trigger per path. Each path has at most
//! one entry in the pending-import table, created on the first qualifying
//! event and removed when its debouncer fires, just before the import job is
//! submitted. A later event for the same path while that job runs starts a
//! new cycle; the worker pool's per-path lock keeps the two jobs apart.
//!
//! On shutdown the notify watcher is dropped, then every pending debounce
//! timer and running job is drained before the error channel closes.

use std::{
    collections::HashMap,
    fmt,
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    debounce::Debouncer,
    error::{MediaError, Result},
    import::{ERROR_BUFFER, ImportOptions, WorkerPool},
    scan::{MimeSet, mime_for_path, scan_result_for, settings::is_hidden_name},
};

/// Raw notifications buffered between the notify thread and the watch loop.
const WATCH_BUFFER: usize = 256;

#[derive(Debug)]
enum WatchMessage {
    Event(Event),
    Error(String),
}

/// Start watching `dir` and importing what lands there.
///
/// With no directory this is a no-op watch: nothing is monitored and the
/// returned channel closes once `shutdown` fires. A directory that cannot be
/// created or watched is reported on the channel, which then also stays open
/// until `shutdown`.
pub fn watch(
    pool: WorkerPool,
    dir: Option<PathBuf>,
    opts: ImportOptions,
    debounce: Duration,
    shutdown: CancellationToken,
) -> mpsc::Receiver<MediaError> {
    let (err_tx, err_rx) = mpsc::channel(ERROR_BUFFER);

    tokio::spawn(async move {
        let Some(dir) = dir.filter(|dir| !dir.as_os_str().is_empty()) else {
            debug!("no watch directory configured; idling until shutdown");
            shutdown.cancelled().await;
            return;
        };

        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            let _ = err_tx.send(MediaError::Io(err)).await;
            shutdown.cancelled().await;
            return;
        }

        let (raw_tx, raw_rx) = mpsc::channel(WATCH_BUFFER);
        let watcher = match init_watcher(&dir, raw_tx) {
            Ok(watcher) => watcher,
            Err(err) => {
                let _ = err_tx.send(err).await;
                shutdown.cancelled().await;
                return;
            }
        };
        info!(dir = %dir.display(), "watching for new files");

        let pending = PendingImports::new(JobContext {
            pool,
            opts: Arc::new(opts.clone()),
            accepted: opts.accepted(),
            err_tx: err_tx.clone(),
            debounce,
            tracker: TaskTracker::new(),
        });

        run_watch_loop(&dir, raw_rx, &pending, &err_tx, &shutdown).await;

        // Stop the notify stream first so nothing new gets scheduled.
        drop(watcher);
        pending.drain().await;
        info!(dir = %dir.display(), "watch stopped");
    });

    err_rx
}

async fn run_watch_loop(
    root: &Path,
    mut raw_rx: mpsc::Receiver<WatchMessage>,
    pending: &PendingImports,
    err_tx: &mpsc::Sender<MediaError>,
    shutdown: &CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            msg = raw_rx.recv() => msg,
        };

        match msg {
            Some(WatchMessage::Event(event)) => {
                for path in import_candidates(&event) {
                    if is_hidden_below(root, path) {
                        continue;
                    }
                    if !mime_for_path(path).is_some_and(|mime| pending.ctx.accepted.contains(mime)) {
                        continue;
                    }
                    pending.schedule(path);
                }
            }
            Some(WatchMessage::Error(error)) => {
                warn!(dir = %root.display(), %error, "watcher reported an error");
                if err_tx.send(MediaError::Watch(error)).await.is_err() {
                    // Nobody is listening any more; keep importing regardless.
                    debug!("watch error receiver dropped");
                }
            }
            None => break,
        }
    }
}

/// Paths in `event` that might now hold a complete file worth importing.
fn import_candidates(event: &Event) -> Vec<&Path> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().map(PathBuf::as_path).collect()
        }
        // Both the old and the new name are reported; only the new one matters.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().map(PathBuf::as_path).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// Whether `path`, or any directory between `root` and it, is a dotfile.
fn is_hidden_below(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_str().is_some_and(is_hidden_name),
        _ => false,
    })
}

fn init_watcher(root: &Path, tx: mpsc::Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let root_display = root.display().to_string();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if let Err(err) = tx.blocking_send(WatchMessage::Event(event)) {
                    warn!("fs_watch channel send failed for {}: {}", root_display, err);
                }
            }
            Err(err) => {
                let _ = tx.blocking_send(WatchMessage::Error(err.to_string()));
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| {
        MediaError::Watch(format!(
            "failed to create watcher for {}: {}",
            root.display(),
            err
        ))
    })?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|err| MediaError::Watch(format!("failed to watch {}: {}", root.display(), err)))?;

    Ok(watcher)
}

/// Everything a fired debouncer needs to run its import.
#[derive(Clone)]
struct JobContext {
    pool: WorkerPool,
    opts: Arc<ImportOptions>,
    accepted: MimeSet,
    err_tx: mpsc::Sender<MediaError>,
    debounce: Duration,
    tracker: TaskTracker,
}

/// The pending-import table: path → debouncer for that path.
#[derive(Clone)]
struct PendingImports {
    table: Arc<Mutex<HashMap<PathBuf, Debouncer>>>,
    ctx: JobContext,
}

impl PendingImports {
    fn new(ctx: JobContext) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            ctx,
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<PathBuf, Debouncer>> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn schedule(&self, path: &Path) {
        let mut table = self.lock_table();
        let debouncer = table.entry(path.to_path_buf()).or_insert_with(|| {
            let pending = self.clone();
            let path = path.to_path_buf();
            Debouncer::tracked(self.ctx.debounce, self.ctx.tracker.clone(), move || {
                let pending = pending.clone();
                let path = path.clone();
                async move { pending.fire(path).await }
            })
        });
        debouncer.trigger();
    }

    /// Runs once the path has been quiet for the debounce window.
    async fn fire(&self, path: PathBuf) {
        self.lock_table().remove(&path);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file vanished before import");
                return;
            }
            Err(err) => {
                let _ = self.ctx.err_tx.send(MediaError::Io(err)).await;
                return;
            }
        };
        if !metadata.is_file() {
            return;
        }
        let Some(scan_result) = scan_result_for(&path, metadata, &self.ctx.accepted) else {
            return;
        };

        if let Err(err) = self.ctx.pool.submit(scan_result, Arc::clone(&self.ctx.opts)).await {
            let _ = self.ctx.err_tx.send(err).await;
        }
    }

    /// Let every scheduled trigger fire and every job finish, then drop the
    /// table.
    async fn drain(&self) {
        self.ctx.tracker.close();
        self.ctx.tracker.wait().await;
        self.lock_table().clear();
    }
}

impl fmt::Debug for PendingImports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.table.lock().ok().map(|table| table.len());
        f.debug_struct("PendingImports")
            .field("pending", &pending)
            .field("debounce", &self.ctx.debounce)
            .field("tasks", &self.ctx.tracker.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use notify::event::{DataChange, RemoveKind};

    use super::*;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn creates_and_writes_are_candidates() {
        let created = event(EventKind::Create(CreateKind::File), &["/in/a.jpg"]);
        assert_eq!(import_candidates(&created), [Path::new("/in/a.jpg")]);

        let written = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/in/a.jpg"],
        );
        assert_eq!(import_candidates(&written), [Path::new("/in/a.jpg")]);
    }

    #[test]
    fn renames_use_the_new_name() {
        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/in/.a.jpg.part", "/in/a.jpg"],
        );
        assert_eq!(import_candidates(&renamed), [Path::new("/in/a.jpg")]);
    }

    #[test]
    fn removals_and_folders_are_ignored() {
        let removed = event(EventKind::Remove(RemoveKind::File), &["/in/a.jpg"]);
        assert!(import_candidates(&removed).is_empty());

        let folder = event(EventKind::Create(CreateKind::Folder), &["/in/sub"]);
        assert!(import_candidates(&folder).is_empty());
    }

    #[test]
    fn hidden_paths_below_root_are_skipped() {
        let root = Path::new("/home/me/.inbox");
        assert!(!is_hidden_below(root, Path::new("/home/me/.inbox/a.jpg")));
        assert!(is_hidden_below(root, Path::new("/home/me/.inbox/.a.jpg")));
        assert!(is_hidden_below(root, Path::new("/home/me/.inbox/.tmp/a.jpg")));
    }
}
