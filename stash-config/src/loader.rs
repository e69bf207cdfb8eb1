use std::{
    fs,
    path::{Path, PathBuf},
};

use stash_core::config::{
    CONF_DEBOUNCE_MS, CONF_PATH, CONF_WATCH, CONF_WORKERS, ComponentConfig, FS_IMPORT, FS_STORE,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    models::{Config, ConfigMetadata},
    sources::{EnvConfig, FileConfig},
    util::{expand_home, home_dir},
    validation::ConfigWarnings,
};

/// Relative locations tried, in order, when no path is given.
const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["stash.toml", "config/stash.toml"];

/// Per-user location, relative to the home directory. Also where a default
/// file is written on first run.
const HOME_CONFIG_LOCATION: &str = ".stash/config.toml";

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Overrides the home directory used for `~` and default locations.
    pub home: Option<PathBuf>,
    /// Replaces the process environment.
    pub env: Option<EnvConfig>,
    pub write_default: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse configuration {path}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write default configuration {path}")]
    WriteDefault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render configuration")]
    Render(#[from] toml::ser::Error),
    #[error("invalid component configuration: {0}")]
    Component(#[from] stash_core::MediaError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_home<P: Into<PathBuf>>(mut self, home: P) -> Self {
        self.options.home = Some(home.into());
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.options.env = Some(env);
        self
    }

    /// Write the defaults to `~/.stash/config.toml` when no file is found.
    pub fn write_default_if_missing(mut self, write: bool) -> Self {
        self.options.write_default = write;
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let env = self.options.env.clone().unwrap_or_else(EnvConfig::gather);
        let home = self.options.home.clone().unwrap_or_else(home_dir);

        let (file, config_path) = self.load_file_config(&env, &home)?;
        let mut warnings = ConfigWarnings::default();

        let wrote_default = if config_path.is_none() && self.options.write_default {
            let path = home.join(HOME_CONFIG_LOCATION);
            write_default(&path, &home)?;
            info!(path = %path.display(), "wrote default configuration");
            Some(path)
        } else {
            None
        };
        if config_path.is_none() && wrote_default.is_none() {
            warnings.push_with_hint(
                "No stash.toml found; using defaults and environment variables",
                "Run `stashd dump-config > stash.toml` to scaffold one",
            );
        }

        let mut config = compose(file, &env, &home)?;
        config.metadata = ConfigMetadata {
            config_path,
            env_file_loaded,
            wrote_default,
        };
        validate(&mut config, &mut warnings)?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        loaded.or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err.into()),
        })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
        home: &Path,
    ) -> Result<(FileConfig, Option<PathBuf>), ConfigLoadError> {
        let resolved = if let Some(explicit) = &self.options.config_path {
            Some((explicit.clone(), ConfigPathProvenance::Explicit))
        } else if let Some(from_env) = &env.config_path {
            Some((from_env.clone(), ConfigPathProvenance::Env))
        } else {
            DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .chain(std::iter::once(home.join(HOME_CONFIG_LOCATION)))
                .find(|candidate| candidate.exists())
                .map(|path| (path, ConfigPathProvenance::Default))
        };

        let Some((path, provenance)) = resolved else {
            return Ok((FileConfig::default(), None));
        };
        let path = expand_home(&path, home);
        if !path.exists() {
            if provenance == ConfigPathProvenance::Default {
                return Ok((FileConfig::default(), None));
            }
            return Err(ConfigLoadError::MissingConfig { path });
        }

        debug!(path = %path.display(), ?provenance, "loading configuration file");
        let file = parse_file(&path)?;
        Ok((file, Some(path)))
    }
}

/// `.json` files are JSON; anything else is TOML.
pub fn parse_file(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents).map_err(|source| ConfigLoadError::ParseJson {
            path: path.to_path_buf(),
            source,
        }),
        _ => toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_default(path: &Path, home: &Path) -> Result<(), ConfigLoadError> {
    let rendered = Config::defaults_for(home).to_toml_string()?;
    let write = |path: &Path| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, rendered.as_bytes())
    };
    write(path).map_err(|source| ConfigLoadError::WriteDefault {
        path: path.to_path_buf(),
        source,
    })
}

/// File values over defaults, environment over both.
fn compose(file: FileConfig, env: &EnvConfig, home: &Path) -> Result<Config, ConfigLoadError> {
    let defaults = Config::defaults_for(home);
    let FileConfig {
        cache_path,
        store,
        index,
        import,
        export,
        thumbnails,
    } = file;

    let mut service = defaults.service;
    if let Some(cache_path) = cache_path {
        service.cache_path = cache_path;
    }
    if let Some(store) = store {
        service.store = store;
    }
    if let Some(index) = index {
        service.index = index;
    }
    if let Some(import) = import {
        service.import = import;
    }
    if let Some(export) = export {
        service.export = export;
    }
    if let Some(thumbnails) = thumbnails {
        service.thumbnails = thumbnails;
    }

    if let Some(cache_path) = &env.cache_path {
        service.cache_path = cache_path.clone();
    }
    if let Some(store_path) = &env.store_path {
        set_path(&mut service.store, CONF_PATH, store_path);
    }
    if let Some(watch_dir) = &env.watch_dir {
        set_path(&mut service.import, CONF_WATCH, watch_dir);
    }
    if let Some(workers) = env.import_workers {
        service.import.conf.insert(CONF_WORKERS.into(), workers.into());
    }
    if let Some(debounce_ms) = env.debounce_ms {
        service.import.conf.insert(CONF_DEBOUNCE_MS.into(), debounce_ms.into());
    }

    service.cache_path = expand_home(&service.cache_path, home);
    expand_conf_path(&mut service.store, CONF_PATH, home)?;
    expand_conf_path(&mut service.import, CONF_WATCH, home)?;

    Ok(Config {
        service,
        metadata: ConfigMetadata::default(),
    })
}

fn set_path(component: &mut ComponentConfig, key: &str, path: &Path) {
    component
        .conf
        .insert(key.into(), path.to_string_lossy().into_owned().into());
}

fn expand_conf_path(component: &mut ComponentConfig, key: &str, home: &Path) -> Result<(), ConfigLoadError> {
    if let Some(path) = component.get_path(key)? {
        set_path(component, key, &expand_home(&path, home));
    }
    Ok(())
}

/// Clamp values that would stall the service and record why.
fn validate(config: &mut Config, warnings: &mut ConfigWarnings) -> Result<(), ConfigLoadError> {
    let service = &mut config.service;

    if service.import.kind == FS_IMPORT {
        if service.import.get_u64(CONF_WORKERS)? == Some(0) {
            service.import.conf.insert(CONF_WORKERS.into(), 1u64.into());
            warnings.push("import.conf.workers was 0; using 1 worker");
        }
        if service.import.get_u64(CONF_DEBOUNCE_MS)? == Some(0) {
            service.import.conf.insert(CONF_DEBOUNCE_MS.into(), 1u64.into());
            warnings.push_with_hint(
                "import.conf.debounce_ms was 0; using 1ms",
                "files still being written may be imported half-finished",
            );
        }
        if service.import.get_path(CONF_WATCH)?.is_none() {
            warnings.push("import.conf.watch is not set; watch imports need an explicit directory");
        }
    }

    if service.store.kind == FS_STORE && service.store.get_path(CONF_PATH)?.is_none() {
        warnings.push_with_hint(
            "store.conf.path is not set",
            "the fs-store falls back to ~/.stash/store",
        );
    }

    if service.thumbnails.concurrency == 0 {
        service.thumbnails.concurrency = 1;
        warnings.push("thumbnails.concurrency was 0; using 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_file_values() {
        let home = Path::new("/home/me");
        let file: FileConfig = toml::from_str(
            r#"
            [store]
            type = "fs-store"
            conf = { path = "~/archive" }
            "#,
        )
        .unwrap();

        let config = compose(file.clone(), &EnvConfig::default(), home).unwrap();
        assert_eq!(
            config.service.store.get_path(CONF_PATH).unwrap(),
            Some(PathBuf::from("/home/me/archive"))
        );

        let env = EnvConfig {
            store_path: Some("/mnt/big".into()),
            debounce_ms: Some(100),
            ..EnvConfig::default()
        };
        let config = compose(file, &env, home).unwrap();
        assert_eq!(
            config.service.store.get_path(CONF_PATH).unwrap(),
            Some(PathBuf::from("/mnt/big"))
        );
        assert_eq!(config.service.import.get_u64(CONF_DEBOUNCE_MS).unwrap(), Some(100));
    }

    #[test]
    fn zero_values_are_clamped_with_warnings() {
        let mut config = Config::defaults_for(Path::new("/home/me"));
        config.service.import.conf.insert(CONF_WORKERS.into(), 0u64.into());
        config.service.thumbnails.concurrency = 0;

        let mut warnings = ConfigWarnings::default();
        validate(&mut config, &mut warnings).unwrap();

        assert_eq!(config.service.import.get_u64(CONF_WORKERS).unwrap(), Some(1));
        assert_eq!(config.service.thumbnails.concurrency, 1);
        assert_eq!(warnings.items.len(), 2);
    }
}
