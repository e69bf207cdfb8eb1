use std::{fmt, io::SeekFrom, sync::Arc};

use tokio::{fs, io::AsyncSeekExt, task::spawn_blocking};
use tracing::info;

use super::ImportOptions;
use crate::{
    error::{MediaError, Result},
    hash::content_hash,
    index::Indexer,
    inspect::InspecterRegistry,
    item::{Item, adjust_time, now},
    scan::ScanResult,
    store::Store,
};

/// The per-file import steps: inspect, hash, merge or store, index and,
/// optionally, remove the source.
#[derive(Clone)]
pub struct ImportPipeline {
    store: Arc<dyn Store>,
    indexer: Arc<dyn Indexer>,
    inspecters: InspecterRegistry,
}

impl ImportPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        indexer: Arc<dyn Indexer>,
        inspecters: InspecterRegistry,
    ) -> Self {
        Self {
            store,
            indexer,
            inspecters,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn indexer(&self) -> &Arc<dyn Indexer> {
        &self.indexer
    }

    pub fn inspecters(&self) -> &InspecterRegistry {
        &self.inspecters
    }

    /// Import one file. Any failure aborts this file only.
    ///
    /// Storage happens before indexing, so an index failure leaves a stored
    /// but unindexed item until the next reindex from the store.
    pub async fn import_single(&self, scan: &ScanResult, opts: &ImportOptions) -> Result<Item> {
        let inspecters = self.inspecters.clone();
        let path = scan.path.clone();
        let mime = scan.mime.clone();
        let (file, inspection, hash) = spawn_blocking(move || -> Result<_> {
            let mut file = std::fs::File::open(&path)?;
            let mut inspecter = inspecters.inspecter_for(&mime)?;
            let inspection = inspecter.inspect(&mut file)?;
            let hash = content_hash(&mut file)?;
            Ok((file, inspection, hash))
        })
        .await
        .map_err(|e| MediaError::Internal(format!("inspect task failed: {e}")))??;

        let inspected_created = inspection.created.is_some();
        let mut item = Item {
            item_type: inspection.item_type,
            mime: scan.mime.clone(),
            hash,
            name: scan.file_name(),
            added: opts.added.map(adjust_time).unwrap_or_else(now),
            created: inspection.created.map(adjust_time).unwrap_or_else(now),
            deleted: None,
            location: inspection.location,
            description: String::new(),
            tags: Vec::new(),
            meta: inspection.meta,
        };
        for tag in &opts.tags {
            item.add_tag(tag);
        }

        match self.store.meta(&item.hash).await {
            Ok(previous) => {
                item.merge_previous(&previous, inspected_created);
                drop(file);
                self.store.update(&item).await?;
            }
            Err(err) if err.is_not_found() => {
                let mut file = fs::File::from_std(file);
                file.seek(SeekFrom::Start(0)).await?;
                self.store.put(&item, &mut file).await?;
            }
            Err(err) => return Err(err),
        }

        self.indexer.index(&item).await?;

        if opts.delete_after_import {
            fs::remove_file(&scan.path).await?;
        }

        info!(name = %item.name, item_type = %item.item_type, hash = %item.hash, "import success");
        Ok(item)
    }
}

impl fmt::Debug for ImportPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportPipeline")
            .field("store", &self.store)
            .field("indexer", &self.indexer)
            .field("inspecters", &self.inspecters)
            .finish()
    }
}
