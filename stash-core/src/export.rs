//! Copying items back out of the archive.

use std::{fmt, path::Path};

use async_trait::async_trait;

use crate::{error::Result, item::Item};

#[async_trait]
pub trait Exporter: Send + Sync + fmt::Debug {
    /// Write the whole archive into `dir` as plain files.
    async fn flatten(&self, dir: &Path) -> Result<()>;

    /// Write the given items into `dir`.
    async fn export(&self, dir: &Path, items: &[Item]) -> Result<()>;

    /// Export one item to the exporter's own destination.
    async fn export_item(&self, item: &Item) -> Result<()>;
}

/// Exporter that accepts everything and writes nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullExporter;

#[async_trait]
impl Exporter for NullExporter {
    async fn flatten(&self, _dir: &Path) -> Result<()> {
        Ok(())
    }

    async fn export(&self, _dir: &Path, _items: &[Item]) -> Result<()> {
        Ok(())
    }

    async fn export_item(&self, _item: &Item) -> Result<()> {
        Ok(())
    }
}
