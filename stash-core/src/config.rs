//! Service wiring settings.
//!
//! Each pluggable component is described by a [`ComponentConfig`]: `type`
//! names a constructor in the [`crate::registry::ComponentRegistry`] and
//! `conf` is a free-form table that only that constructor interprets.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{MediaError, Result},
    thumbnails::DEFAULT_THUMBNAIL_CONCURRENCY,
};

pub const FS_STORE: &str = "fs-store";
pub const MEMORY_INDEX: &str = "memory-index";
pub const FS_IMPORT: &str = "fs-import";
pub const NULL_IMPORT: &str = "null-import";
pub const NULL_EXPORT: &str = "null-export";

/// Conf key holding the fs-store root.
pub const CONF_PATH: &str = "path";
/// Conf key holding the fs-import default watch directory.
pub const CONF_WATCH: &str = "watch";
pub const CONF_DEBOUNCE_MS: &str = "debounce_ms";
pub const CONF_WORKERS: &str = "workers";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub conf: Map<String, Value>,
}

impl ComponentConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            conf: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conf.insert(key.into(), value.into());
        self
    }

    /// String value for `key`. Present but not a string is an error.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.conf.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(MediaError::Internal(format!(
                "{} conf `{key}` must be a string, got {other}",
                self.kind
            ))),
        }
    }

    /// Non-negative integer value for `key`.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.conf.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                MediaError::Internal(format!(
                    "{} conf `{key}` must be a non-negative integer, got {value}",
                    self.kind
                ))
            }),
        }
    }

    pub fn get_path(&self, key: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .get_str(key)?
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from))
    }

    pub fn get_duration_ms(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.get_u64(key)?.map(Duration::from_millis))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Renders allowed to run at the same time.
    pub concurrency: usize,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_THUMBNAIL_CONCURRENCY,
        }
    }
}

/// Everything [`crate::service::Service::new`] needs besides the registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub cache_path: PathBuf,
    pub store: ComponentConfig,
    pub index: ComponentConfig,
    pub import: ComponentConfig,
    pub export: ComponentConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
}

impl ServiceConfig {
    /// Defaults rooted at `base` (normally `~/.stash`), with new files picked
    /// up from `watch_dir`.
    pub fn rooted_at(base: impl Into<PathBuf>, watch_dir: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let watch_dir = watch_dir.into();
        Self {
            cache_path: base.join("cache"),
            store: ComponentConfig::new(FS_STORE)
                .with(CONF_PATH, base.join("store").to_string_lossy().into_owned()),
            index: ComponentConfig::new(MEMORY_INDEX),
            import: ComponentConfig::new(FS_IMPORT)
                .with(CONF_WATCH, watch_dir.to_string_lossy().into_owned())
                .with(CONF_DEBOUNCE_MS, 5_000u64)
                .with(CONF_WORKERS, num_cpus::get() as u64),
            export: ComponentConfig::new(NULL_EXPORT),
            thumbnails: ThumbnailConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::rooted_at(home.join(".stash"), home.join("stash-import"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn watch_must_be_a_string() {
        let conf = ComponentConfig::new(FS_IMPORT).with(CONF_WATCH, 42);
        let err = conf.get_str(CONF_WATCH).unwrap_err();
        assert!(err.to_string().contains("must be a string"));

        let conf = ComponentConfig::new(FS_IMPORT).with(CONF_WATCH, "/tmp/in");
        assert_eq!(conf.get_path(CONF_WATCH).unwrap(), Some(PathBuf::from("/tmp/in")));
        assert_eq!(conf.get_path("missing").unwrap(), None);
    }

    #[test]
    fn component_shape_round_trips_through_json() {
        let raw = json!({ "type": "fs-store", "conf": { "path": "/srv/stash" } });
        let parsed: ComponentConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.kind, FS_STORE);
        assert_eq!(parsed.get_str(CONF_PATH).unwrap(), Some("/srv/stash"));
    }

    #[test]
    fn defaults_point_below_base() {
        let config = ServiceConfig::rooted_at("/base", "/inbox");
        assert_eq!(config.cache_path, PathBuf::from("/base/cache"));
        assert_eq!(config.store.get_path(CONF_PATH).unwrap(), Some(PathBuf::from("/base/store")));
        assert_eq!(config.import.get_u64(CONF_DEBOUNCE_MS).unwrap(), Some(5_000));
        assert_eq!(config.thumbnails.concurrency, 4);
    }
}
