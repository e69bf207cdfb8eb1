//! Pluggable, mime-specific metadata extraction.
//!
//! An [`Inspecter`] turns a readable stream into an [`Inspection`]; some also
//! know how to render a thumbnail. Implementations are looked up through an
//! [`InspecterRegistry`] that the caller builds and hands to the service, so
//! there is no process-wide registration order to worry about.

mod photo;
mod tag;
mod video;

use std::{
    collections::HashMap,
    fmt,
    io::{Read, Seek},
    sync::Arc,
};

use crate::{
    error::{MediaError, Result},
    item::{Inspection, Item},
};

pub use photo::{PHOTO_MIME_TYPES, PhotoInspecter, PhotoMeta};
pub use tag::{TAG_SIZE_MAX, TagInspecter, TagMeta};
pub use video::{VIDEO_MIME_TYPES, VideoInspecter, VideoMeta};

/// Blocking, seekable byte source handed to inspecters and thumbnailers.
pub trait ReadSeek: Read + Seek + Send {}

impl<T> ReadSeek for T where T: Read + Seek + Send + ?Sized {}

/// Encoded thumbnail bytes plus their mime type.
#[derive(Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub data: Vec<u8>,
    pub mime: String,
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("mime", &self.mime)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Extracts type-specific facts from one file.
///
/// Inspecters are stateful: [`Inspecter::ensure_meta`] decodes an item's
/// opaque metadata into the inspecter itself so a later thumbnail call can
/// use it. Calls are blocking and run off the async executor.
pub trait Inspecter: Send {
    fn inspect(&mut self, reader: &mut dyn ReadSeek) -> Result<Inspection>;

    /// Decode `item.meta` into this inspecter, if not already done.
    fn ensure_meta(&mut self, item: &Item) -> Result<()>;

    fn as_thumbnailer(&self) -> Option<&dyn Thumbnailer> {
        None
    }
}

pub trait Thumbnailer: Send + Sync {
    /// Render a thumbnail whose longest side is at most `max_dimension`.
    fn thumbnail(&self, reader: &mut dyn ReadSeek, max_dimension: u32) -> Result<Thumbnail>;
}

pub type InspecterFactory = Arc<dyn Fn() -> Box<dyn Inspecter> + Send + Sync>;

/// Mime type → inspecter factory.
#[derive(Clone, Default)]
pub struct InspecterRegistry {
    factories: HashMap<String, InspecterFactory>,
}

impl InspecterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in tag, photo and video inspecters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(crate::scan::TAG_MIME, || Box::new(TagInspecter::default()));
        for mime in PHOTO_MIME_TYPES {
            registry.register(mime, || Box::new(PhotoInspecter::default()));
        }
        for mime in VIDEO_MIME_TYPES {
            registry.register(mime, || Box::new(VideoInspecter::default()));
        }
        registry
    }

    /// Register (or replace) the factory for `mime`.
    pub fn register<F>(&mut self, mime: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Inspecter> + Send + Sync + 'static,
    {
        self.factories.insert(mime.into(), Arc::new(factory));
        self
    }

    pub fn is_registered(&self, mime: &str) -> bool {
        self.factories.contains_key(mime)
    }

    /// Every registered mime type, sorted.
    pub fn mime_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// A fresh inspecter for `mime`.
    pub fn inspecter_for(&self, mime: &str) -> Result<Box<dyn Inspecter>> {
        self.factories
            .get(mime)
            .map(|factory| factory())
            .ok_or_else(|| MediaError::UnknownMimeType(mime.to_string()))
    }
}

impl fmt::Debug for InspecterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InspecterRegistry")
            .field("mime_types", &self.mime_types())
            .finish()
    }
}

/// Total stream length, leaving the cursor at the start.
pub(crate) fn stream_len(reader: &mut dyn ReadSeek) -> Result<u64> {
    let len = reader.seek(std::io::SeekFrom::End(0))?;
    reader.rewind()?;
    Ok(len)
}

/// Decode an item's meta blob into `T`, treating null as "nothing stored".
pub(crate) fn decode_meta<T>(item: &Item) -> Result<Option<T>>
where
    T: serde::de::DeserializeOwned,
{
    if item.meta.is_null() {
        return Ok(None);
    }
    serde_json::from_value(item.meta.clone())
        .map(Some)
        .map_err(|err| {
            MediaError::InvalidMedia(format!("bad meta for {}: {err}", item.hash))
        })
}
