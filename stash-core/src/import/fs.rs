use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use tokio::{
    sync::{Semaphore, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ERROR_BUFFER, ImportOptions, ImportPipeline, Importer, WorkerPool};
use crate::{error::MediaError, fs_watch, scan};

/// Default quiet period before a watched file is imported.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FsImportConfig {
    /// Directory watched when a watch request names none.
    pub watch_dir: Option<PathBuf>,
    pub workers: usize,
    pub debounce: Duration,
}

impl Default for FsImportConfig {
    fn default() -> Self {
        Self {
            watch_dir: None,
            workers: num_cpus::get(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Filesystem importer: the import coordinator.
///
/// Batch imports and watches share one [`WorkerPool`], so the worker count
/// bounds concurrent imports across every active source.
#[derive(Clone)]
pub struct FsImporter {
    pool: WorkerPool,
    config: Arc<FsImportConfig>,
}

impl FsImporter {
    pub fn new(pipeline: ImportPipeline, config: FsImportConfig) -> Self {
        let pool = WorkerPool::spawn(pipeline, config.workers);
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn config(&self) -> &FsImportConfig {
        &self.config
    }
}

impl Importer for FsImporter {
    fn import(&self, opts: ImportOptions) -> mpsc::Receiver<MediaError> {
        let (err_tx, err_rx) = mpsc::channel(ERROR_BUFFER);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let Some(dir) = opts.dir.clone() else {
                let _ = err_tx
                    .send(MediaError::Internal("import needs a source directory".into()))
                    .await;
                return;
            };

            let opts = Arc::new(opts);
            let mut found = scan::scan(&dir, opts.accepted());
            // Keeps the scan a little ahead of the workers without buffering the tree.
            let permits = Arc::new(Semaphore::new(pool.workers() * 2));
            let mut jobs = JoinSet::new();
            let mut dispatched = 0usize;

            while let Some(next) = found.recv().await {
                let scan_result = match next {
                    Ok(scan_result) => scan_result,
                    Err(err) => {
                        let _ = err_tx.send(err).await;
                        continue;
                    }
                };

                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let pool = pool.clone();
                let opts = Arc::clone(&opts);
                let job_err_tx = err_tx.clone();
                dispatched += 1;
                jobs.spawn(async move {
                    let _permit = permit;
                    if let Err(err) = pool.submit(scan_result, opts).await {
                        let _ = job_err_tx.send(err).await;
                    }
                });

                // Reap finished jobs as we go so the set stays small.
                while let Some(done) = jobs.try_join_next() {
                    report_join(done, &err_tx).await;
                }
            }

            while let Some(done) = jobs.join_next().await {
                report_join(done, &err_tx).await;
            }
            info!(dir = %dir.display(), dispatched, "batch import finished");
        });

        err_rx
    }

    fn watch(&self, opts: ImportOptions, shutdown: CancellationToken) -> mpsc::Receiver<MediaError> {
        let dir = opts.dir.clone().or_else(|| self.config.watch_dir.clone());
        debug!(dir = ?dir, debounce = ?self.config.debounce, "starting watch import");
        fs_watch::watch(
            self.pool.clone(),
            dir,
            opts,
            self.config.debounce,
            shutdown,
        )
    }
}

async fn report_join(done: Result<(), tokio::task::JoinError>, err_tx: &mpsc::Sender<MediaError>) {
    if let Err(join_err) = done {
        let _ = err_tx
            .send(MediaError::Internal(format!("import job panicked: {join_err}")))
            .await;
    }
}

impl fmt::Debug for FsImporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsImporter")
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish()
    }
}
