//! The service facade the CLI (and any API layer) talks to.

use std::{fmt, sync::Arc};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    cache::ThumbnailCache,
    config::ServiceConfig,
    error::{MediaError, Result},
    export::Exporter,
    import::{ImportOptions, ImportPipeline, Importer, WatchHandle},
    index::{Indexer, Pagination, SearchQuery, SearchResult, reindex_store},
    inspect::{InspecterRegistry, Thumbnail},
    item::{Item, now},
    store::{ContentReader, Store},
    thumbnails::ThumbnailService,
};

#[derive(Clone)]
pub struct Service {
    store: Arc<dyn Store>,
    indexer: Arc<dyn Indexer>,
    importer: Arc<dyn Importer>,
    exporter: Arc<dyn Exporter>,
    inspecters: InspecterRegistry,
    thumbnails: ThumbnailService,
}

impl Service {
    /// Build every component named in `config`. Must be called inside a
    /// tokio runtime; importers may start their workers right away.
    pub fn new(
        config: &ServiceConfig,
        registry: &crate::registry::ComponentRegistry,
        inspecters: InspecterRegistry,
    ) -> Result<Self> {
        let store = registry.store(&config.store)?;
        let indexer = registry.indexer(&config.index)?;
        let exporter = registry.exporter(&config.export)?;
        let pipeline = ImportPipeline::new(Arc::clone(&store), Arc::clone(&indexer), inspecters.clone());
        let importer = registry.importer(&config.import, pipeline)?;
        let thumbnails = ThumbnailService::new(
            Arc::clone(&store),
            inspecters.clone(),
            ThumbnailCache::new(config.cache_path.clone()),
            config.thumbnails.concurrency,
        );

        debug!(
            store = %config.store.kind,
            index = %config.index.kind,
            import = %config.import.kind,
            export = %config.export.kind,
            "service components ready"
        );

        Ok(Self {
            store,
            indexer,
            importer,
            exporter,
            inspecters,
            thumbnails,
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn indexer(&self) -> &Arc<dyn Indexer> {
        &self.indexer
    }

    pub fn exporter(&self) -> &Arc<dyn Exporter> {
        &self.exporter
    }

    pub fn inspecters(&self) -> &InspecterRegistry {
        &self.inspecters
    }

    /// One-off import of `opts.dir`. The channel closes when every file has
    /// been handled.
    pub fn import(&self, opts: ImportOptions) -> mpsc::Receiver<MediaError> {
        self.importer.import(opts)
    }

    /// Start a watch import. Stop it with [`WatchHandle::stop`] and drain
    /// its error channel to wait for in-flight jobs.
    pub fn watch_import(&self, opts: ImportOptions) -> WatchHandle {
        let shutdown = CancellationToken::new();
        let errors = self.importer.watch(opts, shutdown.clone());
        WatchHandle { errors, shutdown }
    }

    pub fn reindex_from_store(&self) -> mpsc::Receiver<MediaError> {
        reindex_store(Arc::clone(&self.store), Arc::clone(&self.indexer))
    }

    /// Soft-deleted items are `NotFound` unless `allow_deleted` is set.
    pub async fn item(&self, hash: &str, allow_deleted: bool) -> Result<Item> {
        let item = self.store.meta(hash).await?;
        if item.is_deleted() && !allow_deleted {
            return Err(MediaError::NotFound(format!("{hash} is deleted")));
        }
        Ok(item)
    }

    /// Raw content, subject to the same visibility rule as [`Service::item`].
    pub async fn content(&self, hash: &str, allow_deleted: bool) -> Result<(Item, Box<dyn ContentReader>)> {
        let item = self.item(hash, allow_deleted).await?;
        let reader = self.store.get(hash).await?;
        Ok((item, reader))
    }

    pub async fn search(&self, query: &SearchQuery, page: Pagination) -> Result<SearchResult> {
        self.indexer.search(query, page).await
    }

    pub async fn list_tags(&self) -> Result<Vec<String>> {
        self.indexer.list_tags().await
    }

    pub async fn thumbnail(&self, hash: &str, size: u32) -> Result<Thumbnail> {
        let item = self.item(hash, false).await?;
        self.thumbnails.thumbnail(&item, size).await
    }

    pub async fn set_tags<I, S>(&self, hash: &str, tags: I) -> Result<Item>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut item = self.item(hash, true).await?;
        item.tags.clear();
        for tag in tags {
            item.add_tag(tag.as_ref());
        }
        self.save(item).await
    }

    /// No-op when the tag is already present.
    pub async fn add_tag(&self, hash: &str, tag: &str) -> Result<Item> {
        let mut item = self.item(hash, true).await?;
        if !item.add_tag(tag) {
            return Ok(item);
        }
        self.save(item).await
    }

    /// No-op when the tag is absent.
    pub async fn remove_tag(&self, hash: &str, tag: &str) -> Result<Item> {
        let mut item = self.item(hash, true).await?;
        if !item.remove_tag(tag) {
            return Ok(item);
        }
        self.save(item).await
    }

    pub async fn set_description(&self, hash: &str, description: impl Into<String>) -> Result<Item> {
        let mut item = self.item(hash, true).await?;
        item.description = description.into();
        self.save(item).await
    }

    pub async fn soft_delete(&self, hash: &str) -> Result<Item> {
        let mut item = self.item(hash, true).await?;
        item.deleted = Some(now());
        self.save(item).await
    }

    pub async fn restore(&self, hash: &str) -> Result<Item> {
        let mut item = self.item(hash, true).await?;
        item.deleted = None;
        self.save(item).await
    }

    /// Update metadata, then re-index.
    async fn save(&self, item: Item) -> Result<Item> {
        self.store.update(&item).await?;
        self.indexer.index(&item).await?;
        Ok(item)
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("store", &self.store)
            .field("indexer", &self.indexer)
            .field("importer", &self.importer)
            .field("exporter", &self.exporter)
            .field("inspecters", &self.inspecters)
            .field("thumbnails", &self.thumbnails)
            .finish()
    }
}
