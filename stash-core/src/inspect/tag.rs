use std::io::{BufRead, BufReader, Read};

use serde::{Deserialize, Serialize};

use super::{Inspecter, ReadSeek, decode_meta};
use crate::{
    error::{MediaError, Result},
    item::{Inspection, Item, ItemType},
};

/// Longest slug a tag file may carry.
pub const TAG_SIZE_MAX: u64 = 512;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagMeta {
    pub slug: String,
}

/// Tags are stored like any other item: a tiny file holding the slug on its
/// first line, e.g. `albums/summer-2015`.
#[derive(Debug, Default)]
pub struct TagInspecter {
    meta: Option<TagMeta>,
}

impl TagInspecter {
    pub fn slug(&self) -> Option<&str> {
        self.meta.as_ref().map(|meta| meta.slug.as_str())
    }
}

impl Inspecter for TagInspecter {
    fn inspect(&mut self, reader: &mut dyn ReadSeek) -> Result<Inspection> {
        reader.rewind()?;
        let mut line = Vec::new();
        BufReader::new((&mut *reader).take(TAG_SIZE_MAX)).read_until(b'\n', &mut line)?;

        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if line.is_empty() {
            return Err(MediaError::InvalidMedia("empty tag file".into()));
        }

        let meta = TagMeta {
            slug: String::from_utf8_lossy(&line).into_owned(),
        };
        let mut inspection = Inspection::new(ItemType::Tag);
        inspection.meta = serde_json::to_value(&meta)?;
        self.meta = Some(meta);
        Ok(inspection)
    }

    fn ensure_meta(&mut self, item: &Item) -> Result<()> {
        if self.meta.is_none() {
            self.meta = decode_meta(item)?;
        }
        Ok(())
    }
}
