use std::path::{Path, PathBuf};

use stash_core::config::ServiceConfig;

use crate::sources::FileConfig;

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub service: ServiceConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    /// Defaults for a user whose home directory is `home`.
    pub fn defaults_for(home: &Path) -> Self {
        Self {
            service: ServiceConfig::rooted_at(home.join(".stash"), home.join("stash-import")),
            metadata: ConfigMetadata::default(),
        }
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    /// Render as a config file, the same shape the loader reads back.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&FileConfig::from(self))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
    /// Set when the loader wrote a fresh default file on this run.
    pub wrote_default: Option<PathBuf>,
}

impl From<&Config> for FileConfig {
    fn from(config: &Config) -> Self {
        let service = &config.service;
        FileConfig {
            cache_path: Some(service.cache_path.clone()),
            store: Some(service.store.clone()),
            index: Some(service.index.clone()),
            import: Some(service.import.clone()),
            export: Some(service.export.clone()),
            thumbnails: Some(service.thumbnails),
        }
    }
}
