//! Thumbnail generation on top of the store.
//!
//! Requests for the same `(hash, size)` are coalesced so one render serves
//! every concurrent caller, and a semaphore caps how many renders run at
//! once across all keys.

use std::{
    fmt,
    io::Cursor,
    sync::Arc,
};

use tokio::{io::AsyncReadExt, sync::Semaphore, task::spawn_blocking};
use tracing::{debug, warn};

use crate::{
    cache::ThumbnailCache,
    error::{MediaError, Result},
    inspect::{InspecterRegistry, Thumbnail},
    item::Item,
    singleflight::SingleFlight,
    store::Store,
};

/// Concurrent renders allowed when nothing else is configured.
pub const DEFAULT_THUMBNAIL_CONCURRENCY: usize = 4;

/// 1×1 transparent GIF served for types that have no thumbnailer.
pub const TINY_GIF: &[u8] = &[
    71, 73, 70, 56, 57, 97, 1, 0, 1, 0, 128, 0, 0, 255, 255, 255, 0, 0, 0, 44, 0, 0, 0, 0, 1, 0,
    1, 0, 0, 2, 2, 68, 1, 0, 59,
];

pub fn placeholder() -> Thumbnail {
    Thumbnail {
        data: TINY_GIF.to_vec(),
        mime: "image/gif".to_string(),
    }
}

#[derive(Clone)]
pub struct ThumbnailService {
    store: Arc<dyn Store>,
    inspecters: InspecterRegistry,
    cache: ThumbnailCache,
    flight: Arc<SingleFlight<(String, u32), Thumbnail>>,
    permits: Arc<Semaphore>,
}

impl ThumbnailService {
    pub fn new(
        store: Arc<dyn Store>,
        inspecters: InspecterRegistry,
        cache: ThumbnailCache,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            inspecters,
            cache,
            flight: Arc::new(SingleFlight::new()),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.cache
    }

    /// Thumbnail for `item` whose longest side is at most `size` pixels.
    pub async fn thumbnail(&self, item: &Item, size: u32) -> Result<Thumbnail> {
        let key = (item.hash.clone(), size);
        self.flight
            .run(key, || self.render_cached(item, size))
            .await
    }

    async fn render_cached(&self, item: &Item, size: u32) -> Result<Thumbnail> {
        match self.cache.get(&item.hash, size).await {
            Ok(Some(hit)) => {
                debug!(hash = %item.hash, size, "thumbnail cache hit");
                return Ok(hit);
            }
            Ok(None) => {}
            // A broken entry is regenerated and overwritten.
            Err(err) => warn!(hash = %item.hash, size, error = %err, "thumbnail cache read failed"),
        }

        let mut inspecter = match self.inspecters.inspecter_for(&item.mime) {
            Ok(inspecter) if inspecter.as_thumbnailer().is_some() => inspecter,
            Ok(_) | Err(MediaError::UnknownMimeType(_)) => return Ok(placeholder()),
            Err(err) => return Err(err),
        };

        let mut content = Vec::new();
        self.store
            .get(&item.hash)
            .await?
            .read_to_end(&mut content)
            .await?;

        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| MediaError::Cancelled("thumbnail service shut down".into()))?;

        let item_for_render = item.clone();
        let thumbnail = spawn_blocking(move || {
            inspecter.ensure_meta(&item_for_render)?;
            let thumbnailer = inspecter.as_thumbnailer().ok_or_else(|| {
                MediaError::Thumbnail(format!("no thumbnailer for {}", item_for_render.mime))
            })?;
            thumbnailer.thumbnail(&mut Cursor::new(content), size)
        })
        .await
        .map_err(|err| MediaError::Internal(format!("Failed to join thumbnail task: {err}")))??;

        self.cache.put(&item.hash, size, &thumbnail).await?;
        debug!(hash = %item.hash, size, bytes = thumbnail.data.len(), "thumbnail generated");
        Ok(thumbnail)
    }
}

impl fmt::Debug for ThumbnailService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailService")
            .field("store", &self.store)
            .field("cache", &self.cache)
            .field("flight", &self.flight)
            .field("permits_available", &self.permits.available_permits())
            .finish()
    }
}
