use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{
    fs,
    io::{self, AsyncRead, AsyncWriteExt},
    sync::mpsc,
};
use tracing::debug;
use uuid::Uuid;

use super::{ContentReader, ItemStream, Store};
use crate::{
    error::{MediaError, Result},
    hash::{HASH_PREFIX_LEN, is_valid_hash},
    item::Item,
    scan::{self, METAFILE_EXT, METAFILE_MIME},
};

/// Sharded, content-addressed file store.
///
/// Content for `sha1-abcd...` lives at `<root>/ab/cd/sha1-abcd...` and its
/// metadata next to it with a `.meta` suffix. The shard is a pure function of
/// the hash, so nothing about the layout is persisted separately.
#[derive(Clone, Debug)]
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `ab/cd` for `sha1-abcd...`. Bounds fan-out to 256 × 256 directories.
    pub fn shard(hash: &str) -> Option<PathBuf> {
        let first = hash.get(HASH_PREFIX_LEN..HASH_PREFIX_LEN + 2)?;
        let second = hash.get(HASH_PREFIX_LEN + 2..HASH_PREFIX_LEN + 4)?;
        Some(Path::new(first).join(second))
    }

    fn content_path(&self, hash: &str) -> Result<PathBuf> {
        if !is_valid_hash(hash) {
            return Err(MediaError::InvalidMedia(format!(
                "invalid content hash: {hash}"
            )));
        }
        Ok(self.location(hash))
    }

    fn meta_path(&self, hash: &str) -> Result<PathBuf> {
        self.content_path(hash).map(|path| with_suffix(&path, METAFILE_EXT))
    }

    async fn write_content(
        &self,
        path: &Path,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        let tmp = temp_sibling(path);
        let mut file = fs::File::create(&tmp).await.map_err(|err| {
            MediaError::Internal(format!(
                "failed to create temp content {:?}: {err}",
                tmp
            ))
        })?;
        let copied = io::copy(data, &mut file).await;
        let flushed = match copied {
            Ok(_) => file.flush().await,
            Err(err) => Err(err),
        };
        drop(file);
        if let Err(err) = flushed {
            let _ = fs::remove_file(&tmp).await;
            return Err(MediaError::Io(err));
        }

        fs::rename(&tmp, path).await.map_err(|err| {
            MediaError::Internal(format!(
                "failed to move content {:?} -> {:?}: {err}",
                tmp, path
            ))
        })
    }

    async fn write_meta(&self, item: &Item) -> Result<()> {
        let path = self.meta_path(&item.hash)?;
        let mut encoded = serde_json::to_vec(item)?;
        encoded.push(b'\n');

        let tmp = temp_sibling(&path);
        fs::write(&tmp, &encoded).await?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(MediaError::Io(err));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FileSystemStore {
    async fn put(
        &self,
        item: &Item,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        let content = self.content_path(&item.hash)?;
        if fs::try_exists(&content).await? {
            return Err(MediaError::DuplicateItem(item.hash.clone()));
        }

        if let Some(dir) = content.parent() {
            fs::create_dir_all(dir).await?;
        }

        // Both halves run side by side; either failing fails the put. A
        // half-written pair may be left behind, which is harmless because the
        // content file is only ever valid bytes for its own hash.
        let (data_res, meta_res) =
            tokio::join!(self.write_content(&content, data), self.write_meta(item));
        data_res?;
        meta_res?;

        debug!(hash = %item.hash, path = %content.display(), "stored item");
        Ok(())
    }

    async fn get(&self, hash: &str) -> Result<Box<dyn ContentReader>> {
        let path = self.content_path(hash)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(MediaError::NotFound(format!("content for {hash}")))
            }
            Err(err) => Err(MediaError::Io(err)),
        }
    }

    async fn meta(&self, hash: &str) -> Result<Item> {
        let path = self.meta_path(hash)?;
        read_metafile(&path).await.map_err(|err| {
            if err.is_not_found() {
                MediaError::NotFound(format!("metadata for {hash}"))
            } else {
                err
            }
        })
    }

    async fn update(&self, item: &Item) -> Result<()> {
        self.write_meta(item).await
    }

    fn iterate(&self) -> ItemStream {
        let (tx, rx) = mpsc::channel(1);
        let mut metafiles = scan::scan(&self.root, scan::mime_set([METAFILE_MIME]));

        tokio::spawn(async move {
            while let Some(found) = metafiles.recv().await {
                let decoded = match found {
                    Ok(result) => read_metafile(&result.path).await,
                    Err(err) => Err(err),
                };
                if tx.send(decoded).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    fn location(&self, hash: &str) -> PathBuf {
        match Self::shard(hash) {
            Some(shard) => self.root.join(shard).join(hash),
            None => self.root.join(hash),
        }
    }
}

async fn read_metafile(path: &Path) -> Result<Item> {
    let bytes = fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|err| {
        MediaError::InvalidMedia(format!(
            "corrupt metadata {}: {err}",
            path.display()
        ))
    })
}

fn with_suffix(path: &Path, ext: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Dot-prefixed so scans never pick up a write in progress.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp-{}", Uuid::new_v4().simple()))
}
