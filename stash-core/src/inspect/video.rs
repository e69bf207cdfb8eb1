use serde::{Deserialize, Serialize};

use super::{Inspecter, ReadSeek, decode_meta, stream_len};
use crate::{
    error::Result,
    item::{Inspection, Item, ItemType},
};

pub const VIDEO_MIME_TYPES: [&str; 3] = ["video/mp4", "video/x-m4v", "video/quicktime"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VideoMeta {
    pub size: u64,
}

/// Container-agnostic video inspecter. Atom walking for duration, dimensions
/// and location belongs to a dedicated implementation registered over this
/// one; this records the size so the item is still complete.
#[derive(Debug, Default)]
pub struct VideoInspecter {
    meta: Option<VideoMeta>,
}

impl Inspecter for VideoInspecter {
    fn inspect(&mut self, reader: &mut dyn ReadSeek) -> Result<Inspection> {
        let meta = VideoMeta {
            size: stream_len(reader)?,
        };
        let mut inspection = Inspection::new(ItemType::Video);
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

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn records_size() {
        let mut inspecter = VideoInspecter::default();
        let inspection = inspecter
            .inspect(&mut Cursor::new(vec![0u8; 1234]))
            .unwrap();
        assert_eq!(inspection.item_type, ItemType::Video);
        assert_eq!(inspection.meta, serde_json::json!({ "Size": 1234 }));
        assert!(inspecter.as_thumbnailer().is_none());
    }
}
