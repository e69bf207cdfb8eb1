use std::{fs, path::PathBuf};

use stash_config::{ConfigLoadError, ConfigLoader, EnvConfig};
use stash_core::config::{CONF_PATH, CONF_WATCH, MEMORY_INDEX};

fn isolated(home: &std::path::Path) -> ConfigLoader {
    ConfigLoader::new()
        .with_home(home)
        .with_env(EnvConfig::default())
        .with_env_file(home.join("no-such.env"))
}

#[test]
fn explicit_toml_file_is_used() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("custom.toml");
    fs::write(
        &path,
        r#"
        cache_path = "~/thumbs"

        [store]
        type = "fs-store"
        conf = { path = "/srv/archive" }

        [thumbnails]
        concurrency = 8
        "#,
    )
    .unwrap();

    let load = isolated(home.path()).with_config_path(&path).load().unwrap();
    let config = load.config;

    assert_eq!(config.metadata.config_path, Some(path));
    assert_eq!(config.service.cache_path, home.path().join("thumbs"));
    assert_eq!(
        config.service.store.get_path(CONF_PATH).unwrap(),
        Some(PathBuf::from("/srv/archive"))
    );
    assert_eq!(config.service.index.kind, MEMORY_INDEX);
    assert_eq!(config.service.thumbnails.concurrency, 8);
}

#[test]
fn json_files_are_accepted() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("stash.json");
    fs::write(
        &path,
        r#"{ "import": { "type": "fs-import", "conf": { "watch": "/in", "workers": 3 } } }"#,
    )
    .unwrap();

    let config = isolated(home.path()).with_config_path(&path).load().unwrap().config;
    assert_eq!(
        config.service.import.get_path(CONF_WATCH).unwrap(),
        Some(PathBuf::from("/in"))
    );
}

#[test]
fn missing_explicit_file_is_an_error() {
    let home = tempfile::tempdir().unwrap();
    let err = isolated(home.path())
        .with_config_path(home.path().join("nope.toml"))
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn env_config_path_is_honoured() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("from-env.toml");
    fs::write(&path, "[thumbnails]\nconcurrency = 2\n").unwrap();

    let env = EnvConfig {
        config_path: Some(path.clone()),
        ..EnvConfig::default()
    };
    let config = isolated(home.path()).with_env(env).load().unwrap().config;
    assert_eq!(config.service.thumbnails.concurrency, 2);
    assert_eq!(config.metadata.config_path, Some(path));
}

#[test]
fn first_run_writes_a_default_file_that_loads_back() {
    let home = tempfile::tempdir().unwrap();

    let first = isolated(home.path()).write_default_if_missing(true).load().unwrap();
    let written = first.config.metadata.wrote_default.clone().unwrap();
    assert_eq!(written, home.path().join(".stash/config.toml"));
    assert!(written.exists());

    let second = isolated(home.path()).load().unwrap();
    assert_eq!(second.config.metadata.config_path, Some(written));
    assert_eq!(second.config.service, first.config.service);
}

#[test]
fn malformed_toml_reports_the_path() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("broken.toml");
    fs::write(&path, "[store\ntype = ").unwrap();

    let err = isolated(home.path()).with_config_path(&path).load().unwrap_err();
    assert!(err.to_string().contains("broken.toml"));
}
