//! # stashd
//!
//! Command line front end for the stash media archive.
//!
//! - `import <dir>` runs a one-off batch import
//! - `reindex` rebuilds the search index from the store
//! - `watch` imports new files until interrupted
//! - `dump-config` prints the default configuration

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use stash_config::{Config, ConfigLoad, ConfigLoader, util::home_dir};
use stash_core::{
    MediaError, Service, import::ImportOptions, inspect::InspecterRegistry, item::now,
    registry::ComponentRegistry,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "stashd", version)]
#[command(about = "Personal media archive: import, index and watch for new photos and videos")]
struct Cli {
    /// Configuration file (TOML, or JSON when it ends in .json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import every supported file below a directory once
    Import(ImportArgs),
    /// Rebuild the search index from the store
    Reindex,
    /// Import new files as they appear until Ctrl-C
    Watch(WatchArgs),
    /// Print the default configuration as TOML
    DumpConfig,
}

#[derive(ClapArgs, Debug, Clone)]
struct ImportArgs {
    /// Directory to import from
    dir: PathBuf,

    /// Tags applied to every imported item (comma separated)
    #[arg(long = "tag", value_delimiter = ',', value_name = "TAGS")]
    tags: Vec<String>,

    /// Remove source files once they are stored
    #[arg(long)]
    delete: bool,
}

#[derive(ClapArgs, Debug, Clone)]
struct WatchArgs {
    /// Directory to watch; defaults to the importer's configured directory
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Remove source files once they are stored
    #[arg(long)]
    delete: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::DumpConfig = cli.command {
        let rendered = Config::defaults_for(&home_dir())
            .to_toml_string()
            .context("rendering default configuration")?;
        print!("{rendered}");
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(cli.config)?;
    let inspecters = InspecterRegistry::with_defaults();
    let service = Service::new(
        config.service(),
        &ComponentRegistry::with_defaults(),
        inspecters.clone(),
    )
    .context("building service from configuration")?;

    match cli.command {
        Command::Import(args) => {
            let opts = ImportOptions::new(&args.dir)
                .mime_types(inspecters.mime_types())
                .tags(args.tags)
                .added_at(now())
                .delete_after_import(args.delete);
            info!(dir = %args.dir.display(), "starting import");
            let failed = log_errors(service.import(opts), "import error").await;
            info!(failed, "import finished");
        }
        Command::Reindex => {
            let failed = log_errors(service.reindex_from_store(), "reindex error").await;
            info!(failed, "reindex finished");
        }
        Command::Watch(args) => watch(&service, &inspecters, args).await?,
        Command::DumpConfig => {}
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new().write_default_if_missing(true);
    if let Some(path) = path {
        loader = loader.with_config_path(path);
    }

    let ConfigLoad { config, warnings } = loader.load().context("loading configuration")?;
    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "using configuration file");
    }
    if let Some(path) = &config.metadata.wrote_default {
        info!(path = %path.display(), "wrote default configuration");
    }
    for warning in warnings.iter() {
        warn!("config: {warning}");
    }
    Ok(config)
}

async fn watch(service: &Service, inspecters: &InspecterRegistry, args: WatchArgs) -> anyhow::Result<()> {
    let opts = ImportOptions {
        dir: args.dir,
        ..ImportOptions::default()
    }
    .mime_types(inspecters.mime_types())
    .delete_after_import(args.delete);

    let mut handle = service.watch_import(opts);
    info!("watching for new files, Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl-C")?;
                info!("stopping watch, waiting for in-flight imports");
                handle.stop();
                break;
            }
            err = handle.errors.recv() => match err {
                Some(err) => warn!(error = %err, "watch import error"),
                None => return Ok(()),
            },
        }
    }

    let failed = log_errors(handle.errors, "watch import error").await;
    info!(failed, "watch stopped");
    Ok(())
}

/// Log every error until the channel closes; returns how many there were.
async fn log_errors(mut errors: mpsc::Receiver<MediaError>, what: &'static str) -> usize {
    let mut count = 0;
    while let Some(err) = errors.recv().await {
        count += 1;
        warn!(error = %err, "{what}");
    }
    count
}
