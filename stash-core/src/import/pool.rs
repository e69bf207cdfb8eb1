use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, mpsc, oneshot};
use tracing::{debug, trace};

use super::{ImportOptions, ImportPipeline};
use crate::{
    error::{MediaError, Result},
    item::Item,
    scan::ScanResult,
};

struct ImportJob {
    scan: ScanResult,
    opts: Arc<ImportOptions>,
    reply: oneshot::Sender<Result<Item>>,
}

impl fmt::Debug for ImportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportJob")
            .field("path", &self.scan.path)
            .field("mime", &self.scan.mime)
            .finish()
    }
}

/// Fixed set of workers draining one shared job queue.
///
/// Workers exit once every handle to the pool is gone and the queue is
/// empty.
#[derive(Clone)]
pub struct WorkerPool {
    jobs: mpsc::Sender<ImportJob>,
    workers: usize,
    in_flight: InFlightPaths,
}

impl WorkerPool {
    pub fn spawn(pipeline: ImportPipeline, workers: usize) -> Self {
        let workers = workers.max(1);
        let (jobs, rx) = mpsc::channel::<ImportJob>(workers);
        let rx = Arc::new(AsyncMutex::new(rx));
        let pipeline = Arc::new(pipeline);

        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(job) = job else { break };
                    trace!(worker_id, path = %job.scan.path.display(), "import job dequeued");
                    let outcome = pipeline.import_single(&job.scan, &job.opts).await;
                    // The submitter may have gone away; the work is done either way.
                    let _ = job.reply.send(outcome);
                }
                debug!(worker_id, "import worker stopped");
            });
        }

        Self {
            jobs,
            workers,
            in_flight: InFlightPaths::default(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn in_flight(&self) -> &InFlightPaths {
        &self.in_flight
    }

    /// Run one file through a worker and wait for the outcome.
    ///
    /// Holds the per-path lock for the whole job, so two submissions for the
    /// same path never run at the same time.
    pub async fn submit(&self, scan: ScanResult, opts: Arc<ImportOptions>) -> Result<Item> {
        let _path = self.in_flight.acquire(&scan.path).await;

        let (reply, outcome) = oneshot::channel();
        self.jobs
            .send(ImportJob { scan, opts, reply })
            .await
            .map_err(|_| MediaError::Cancelled("import workers have stopped".into()))?;

        outcome
            .await
            .map_err(|_| MediaError::Cancelled("import worker dropped the job".into()))?
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("queue_capacity", &self.jobs.capacity())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

/// Per-path async locks. An entry lives only while someone holds or waits
/// for that path.
#[derive(Clone, Default)]
pub struct InFlightPaths {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl InFlightPaths {
    pub async fn acquire(&self, path: &Path) -> PathGuard {
        let lock = {
            let mut locks = self.lock_map();
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };
        let guard = lock.lock_owned().await;
        PathGuard {
            paths: self.clone(),
            path: path.to_path_buf(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_map().is_empty()
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for InFlightPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths = self.locks.lock().ok().map(|locks| locks.len());
        f.debug_struct("InFlightPaths").field("paths", &paths).finish()
    }
}

/// Exclusive hold on one path; released on drop.
pub struct PathGuard {
    paths: InFlightPaths,
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.paths.lock_map();
        let unused = locks
            .get(&self.path)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if unused {
            locks.remove(&self.path);
        }
    }
}

impl fmt::Debug for PathGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathGuard").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use image::{ImageFormat, RgbImage};
    use tokio::{io::AsyncRead, time::timeout};

    use super::*;
    use crate::{
        index::MemoryIndexer,
        inspect::InspecterRegistry,
        store::{ContentReader, FileSystemStore, ItemStream, Store},
    };

    /// Store that holds every write open for a while and remembers the most
    /// writes it ever saw at once.
    #[derive(Debug)]
    struct SlowStore {
        inner: FileSystemStore,
        hold: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowStore {
        fn new(root: PathBuf, hold: Duration) -> Self {
            Self {
                inner: FileSystemStore::new(root),
                hold,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        async fn writing<T>(&self, write: impl Future<Output = Result<T>>) -> Result<T> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            let out = write.await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            out
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Store for SlowStore {
        async fn put(&self, item: &Item, data: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
            self.writing(self.inner.put(item, data)).await
        }

        async fn get(&self, hash: &str) -> Result<Box<dyn ContentReader>> {
            self.inner.get(hash).await
        }

        async fn meta(&self, hash: &str) -> Result<Item> {
            self.inner.meta(hash).await
        }

        async fn update(&self, item: &Item) -> Result<()> {
            self.writing(self.inner.update(item)).await
        }

        fn iterate(&self) -> ItemStream {
            self.inner.iterate()
        }

        fn location(&self, hash: &str) -> PathBuf {
            self.inner.location(hash)
        }
    }

    fn png_file(dir: &Path, name: &str, seed: u8) -> ScanResult {
        let path = dir.join(name);
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(8, 8, image::Rgb([seed, 0, 0]))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        std::fs::write(&path, out.into_inner()).unwrap();
        ScanResult {
            metadata: std::fs::metadata(&path).unwrap(),
            path,
            mime: "image/png".into(),
        }
    }

    fn slow_pool(dir: &Path) -> (Arc<SlowStore>, WorkerPool) {
        let store = Arc::new(SlowStore::new(dir.join("store"), Duration::from_millis(200)));
        let pipeline = ImportPipeline::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(MemoryIndexer::new()),
            InspecterRegistry::with_defaults(),
        );
        (store, WorkerPool::spawn(pipeline, 2))
    }

    #[tokio::test]
    async fn same_path_submissions_never_write_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pool) = slow_pool(dir.path());
        let scan = png_file(dir.path(), "a.png", 1);
        let opts = Arc::new(ImportOptions::default());

        let (first, second) = tokio::join!(
            pool.submit(scan.clone(), Arc::clone(&opts)),
            pool.submit(scan, Arc::clone(&opts)),
        );

        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.hash, second.hash);
        assert_eq!(store.peak(), 1);
        assert!(pool.in_flight().is_empty());
    }

    #[tokio::test]
    async fn different_paths_write_side_by_side() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pool) = slow_pool(dir.path());
        let opts = Arc::new(ImportOptions::default());

        let (a, b) = tokio::join!(
            pool.submit(png_file(dir.path(), "a.png", 1), Arc::clone(&opts)),
            pool.submit(png_file(dir.path(), "b.png", 2), Arc::clone(&opts)),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(store.peak(), 2);
    }

    #[tokio::test]
    async fn same_path_is_exclusive() {
        let paths = InFlightPaths::default();
        let first = paths.acquire(Path::new("/in/a.jpg")).await;

        let blocked = timeout(Duration::from_millis(50), paths.acquire(Path::new("/in/a.jpg"))).await;
        assert!(blocked.is_err());

        let other = timeout(Duration::from_millis(50), paths.acquire(Path::new("/in/b.jpg"))).await;
        assert!(other.is_ok());
        drop(other);

        drop(first);
        let second = timeout(Duration::from_millis(50), paths.acquire(Path::new("/in/a.jpg"))).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn entries_are_removed_when_released() {
        let paths = InFlightPaths::default();
        {
            let _a = paths.acquire(Path::new("/a")).await;
            let _b = paths.acquire(Path::new("/b")).await;
            assert_eq!(paths.len(), 2);
        }
        assert!(paths.is_empty());
    }
}
