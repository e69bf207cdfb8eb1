//! Component registry: type name → constructor.
//!
//! Built once at startup and handed to [`crate::service::Service::new`].
//! Nothing registers itself implicitly; [`ComponentRegistry::with_defaults`]
//! is the fixed list of built-in implementations.

use std::{collections::HashMap, fmt, path::PathBuf, sync::Arc};

use crate::{
    config::{
        CONF_DEBOUNCE_MS, CONF_PATH, CONF_WATCH, CONF_WORKERS, ComponentConfig, FS_IMPORT,
        FS_STORE, MEMORY_INDEX, NULL_EXPORT, NULL_IMPORT,
    },
    error::{MediaError, Result},
    export::{Exporter, NullExporter},
    import::{FsImportConfig, FsImporter, ImportPipeline, Importer, NullImporter},
    index::{Indexer, MemoryIndexer},
    store::{FileSystemStore, Store},
};

pub type StoreFactory = Arc<dyn Fn(&ComponentConfig) -> Result<Arc<dyn Store>> + Send + Sync>;
pub type IndexerFactory = Arc<dyn Fn(&ComponentConfig) -> Result<Arc<dyn Indexer>> + Send + Sync>;
pub type ImporterFactory =
    Arc<dyn Fn(&ComponentConfig, ImportPipeline) -> Result<Arc<dyn Importer>> + Send + Sync>;
pub type ExporterFactory =
    Arc<dyn Fn(&ComponentConfig) -> Result<Arc<dyn Exporter>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ComponentRegistry {
    stores: HashMap<String, StoreFactory>,
    indexers: HashMap<String, IndexerFactory>,
    importers: HashMap<String, ImporterFactory>,
    exporters: HashMap<String, ExporterFactory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register_store(FS_STORE, |conf| {
                let root = conf.get_path(CONF_PATH)?.unwrap_or_else(default_store_path);
                Ok(Arc::new(FileSystemStore::new(root)) as Arc<dyn Store>)
            })
            .register_indexer(MEMORY_INDEX, |_| Ok(Arc::new(MemoryIndexer::new()) as Arc<dyn Indexer>))
            .register_importer(FS_IMPORT, |conf, pipeline| {
                let config = fs_import_config(conf)?;
                Ok(Arc::new(FsImporter::new(pipeline, config)) as Arc<dyn Importer>)
            })
            .register_importer(NULL_IMPORT, |_, _| Ok(Arc::new(NullImporter) as Arc<dyn Importer>))
            .register_exporter(NULL_EXPORT, |_| Ok(Arc::new(NullExporter) as Arc<dyn Exporter>));
        registry
    }

    pub fn register_store<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ComponentConfig) -> Result<Arc<dyn Store>> + Send + Sync + 'static,
    {
        self.stores.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_indexer<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ComponentConfig) -> Result<Arc<dyn Indexer>> + Send + Sync + 'static,
    {
        self.indexers.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_importer<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ComponentConfig, ImportPipeline) -> Result<Arc<dyn Importer>>
            + Send
            + Sync
            + 'static,
    {
        self.importers.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_exporter<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ComponentConfig) -> Result<Arc<dyn Exporter>> + Send + Sync + 'static,
    {
        self.exporters.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn store(&self, conf: &ComponentConfig) -> Result<Arc<dyn Store>> {
        let factory = lookup(&self.stores, "Store", &conf.kind)?;
        factory(conf)
    }

    pub fn indexer(&self, conf: &ComponentConfig) -> Result<Arc<dyn Indexer>> {
        let factory = lookup(&self.indexers, "Indexer", &conf.kind)?;
        factory(conf)
    }

    pub fn importer(
        &self,
        conf: &ComponentConfig,
        pipeline: ImportPipeline,
    ) -> Result<Arc<dyn Importer>> {
        let factory = lookup(&self.importers, "Importer", &conf.kind)?;
        factory(conf, pipeline)
    }

    pub fn exporter(&self, conf: &ComponentConfig) -> Result<Arc<dyn Exporter>> {
        let factory = lookup(&self.exporters, "Exporter", &conf.kind)?;
        factory(conf)
    }
}

fn lookup<'a, F>(factories: &'a HashMap<String, F>, kind: &str, name: &str) -> Result<&'a F> {
    factories
        .get(name)
        .ok_or_else(|| MediaError::Internal(format!("{kind} does not exist: `{name}`")))
}

/// `~/.stash/store`, where an fs-store without a `path` keeps its files.
pub fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stash")
        .join("store")
}

fn fs_import_config(conf: &ComponentConfig) -> Result<FsImportConfig> {
    let defaults = FsImportConfig::default();
    Ok(FsImportConfig {
        watch_dir: conf.get_path(CONF_WATCH)?,
        workers: conf
            .get_u64(CONF_WORKERS)?
            .map_or(defaults.workers, |n| (n as usize).max(1)),
        debounce: conf.get_duration_ms(CONF_DEBOUNCE_MS)?.unwrap_or(defaults.debounce),
    })
}

fn sorted_names<F>(factories: &HashMap<String, F>) -> Vec<&str> {
    let mut names: Vec<&str> = factories.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("stores", &sorted_names(&self.stores))
            .field("indexers", &sorted_names(&self.indexers))
            .field("importers", &sorted_names(&self.importers))
            .field("exporters", &sorted_names(&self.exporters))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn unknown_names_are_reported_by_kind() {
        let registry = ComponentRegistry::with_defaults();
        let err = registry.indexer(&ComponentConfig::new("elastic")).unwrap_err();
        assert_eq!(err.to_string(), "Internal error: Indexer does not exist: `elastic`");
    }

    #[test]
    fn fs_store_defaults_below_home() {
        let registry = ComponentRegistry::with_defaults();
        let fallback = registry.store(&ComponentConfig::new(FS_STORE)).unwrap();
        assert!(fallback.location("sha1-x").starts_with(default_store_path()));
        assert!(default_store_path().ends_with(".stash/store"));

        let store = registry
            .store(&ComponentConfig::new(FS_STORE).with(CONF_PATH, "/srv/stash"))
            .unwrap();
        assert!(store.location("sha1-x").starts_with("/srv/stash"));
    }

    #[test]
    fn fs_import_conf_is_parsed() {
        let conf = ComponentConfig::new(FS_IMPORT)
            .with(CONF_WATCH, "/inbox")
            .with(CONF_WORKERS, 0u64)
            .with(CONF_DEBOUNCE_MS, 250u64);
        let parsed = fs_import_config(&conf).unwrap();
        assert_eq!(parsed.watch_dir, Some("/inbox".into()));
        assert_eq!(parsed.workers, 1);
        assert_eq!(parsed.debounce, Duration::from_millis(250));

        let bad = ComponentConfig::new(FS_IMPORT).with(CONF_WATCH, true);
        assert!(fs_import_config(&bad).is_err());
    }
}
