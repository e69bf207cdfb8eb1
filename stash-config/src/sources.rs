use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use stash_core::config::{ComponentConfig, ThumbnailConfig};

use crate::util::{parse_path, parse_u64};

/// Raw configuration as written in a TOML or JSON file. Every section is
/// optional; the loader fills the gaps.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<ComponentConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<ComponentConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<ComponentConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<ComponentConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<ThumbnailConfig>,
}

/// Overrides taken from the process environment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    pub watch_dir: Option<PathBuf>,
    pub import_workers: Option<u64>,
    pub debounce_ms: Option<u64>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `gather` uses the real environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            config_path: lookup("STASH_CONFIG").as_deref().and_then(parse_path),
            store_path: lookup("STASH_STORE_PATH").as_deref().and_then(parse_path),
            cache_path: lookup("STASH_CACHE_PATH").as_deref().and_then(parse_path),
            watch_dir: lookup("STASH_WATCH_DIR").as_deref().and_then(parse_path),
            import_workers: lookup("STASH_IMPORT_WORKERS").as_deref().and_then(parse_u64),
            debounce_ms: lookup("STASH_DEBOUNCE_MS").as_deref().and_then(parse_u64),
        }
    }
}
