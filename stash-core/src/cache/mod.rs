//! On-disk thumbnail cache.
//!
//! A typed facade around `cacache`: entries are integrity-checked on read,
//! so a corrupted file surfaces as an error instead of a broken image.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    error::{MediaError, Result},
    inspect::Thumbnail,
};

/// Cache key for a thumbnail of `hash` bounded to `size` pixels.
pub fn thumbnail_key(hash: &str, size: u32) -> String {
    format!("thumb-{hash}-{size}")
}

fn mime_key(key: &str) -> String {
    format!("{key}.mime")
}

#[derive(Clone, PartialEq, Eq)]
pub struct ThumbnailCache {
    root: PathBuf,
}

impl ThumbnailCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `Ok(None)` when nothing is cached under this key.
    pub async fn get(&self, hash: &str, size: u32) -> Result<Option<Thumbnail>> {
        let key = thumbnail_key(hash, size);
        // The mime entry is written last, so its presence means the data
        // entry is complete.
        let Some(mime) = self.read(&mime_key(&key)).await? else {
            return Ok(None);
        };
        let Some(data) = self.read(&key).await? else {
            return Ok(None);
        };
        let mime = String::from_utf8(mime)
            .map_err(|e| MediaError::Cache(format!("cached mime for {key} is not utf-8: {e}")))?;
        Ok(Some(Thumbnail { data, mime }))
    }

    pub async fn put(&self, hash: &str, size: u32, thumbnail: &Thumbnail) -> Result<()> {
        let key = thumbnail_key(hash, size);
        self.write(&key, &thumbnail.data).await?;
        self.write(&mime_key(&key), thumbnail.mime.as_bytes()).await
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match cacache::read(&self.root, key).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(cacache::Error::EntryNotFound(_, _)) => Ok(None),
            Err(cacache::Error::IntegrityError(err)) => Err(MediaError::Cache(format!(
                "cache entry failed integrity check: {key} ({err})"
            ))),
            Err(cacache::Error::SizeMismatch(wanted, actual)) => Err(MediaError::Cache(format!(
                "cache entry size mismatch: key={key}, wanted={wanted}, actual={actual}"
            ))),
            Err(err) => Err(MediaError::Cache(format!("cacache read failed for {key}: {err}"))),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        cacache::write(&self.root, key, bytes)
            .await
            .map(|_| ())
            .map_err(|e| MediaError::Cache(format!("cacache write failed for {key}: {e}")))
    }
}

impl fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThumbnailCache").field(&self.root).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ThumbnailCache::new(dir.path().to_path_buf());
        assert_eq!(cache.get("sha1-abc", 200).await.unwrap(), None);

        let thumb = Thumbnail {
            data: vec![1, 2, 3],
            mime: "image/jpeg".into(),
        };
        cache.put("sha1-abc", 200, &thumb).await.unwrap();

        assert_eq!(cache.get("sha1-abc", 200).await.unwrap(), Some(thumb));
        assert_eq!(cache.get("sha1-abc", 400).await.unwrap(), None);
    }

    #[test]
    fn keys_include_hash_and_size() {
        assert_eq!(thumbnail_key("sha1-abc", 200), "thumb-sha1-abc-200");
    }
}
