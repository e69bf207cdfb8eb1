use std::io::{BufReader, Cursor};

use image::{ColorType, ImageReader, codecs::jpeg::JpegEncoder};
use serde::{Deserialize, Serialize};

use super::{Inspecter, ReadSeek, Thumbnail, Thumbnailer, decode_meta, stream_len};
use crate::{
    error::{MediaError, Result},
    item::{Inspection, Item, ItemType},
};

pub const PHOTO_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

const THUMBNAIL_JPEG_QUALITY: u8 = 85;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhotoMeta {
    pub size: u64,
    pub width: u32,
    pub height: u32,
}

/// Still images. Records pixel dimensions; capture time and location stay
/// unset because EXIF parsing is left to richer inspecters.
#[derive(Debug, Default)]
pub struct PhotoInspecter {
    meta: Option<PhotoMeta>,
}

impl PhotoInspecter {
    pub fn meta(&self) -> Option<&PhotoMeta> {
        self.meta.as_ref()
    }
}

impl Inspecter for PhotoInspecter {
    fn inspect(&mut self, reader: &mut dyn ReadSeek) -> Result<Inspection> {
        let size = stream_len(reader)?;
        let (width, height) = ImageReader::new(BufReader::new(&mut *reader))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| MediaError::InvalidMedia(format!("Failed to decode image: {e}")))?;

        let meta = PhotoMeta {
            size,
            width,
            height,
        };
        let mut inspection = Inspection::new(ItemType::Photo);
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

    fn as_thumbnailer(&self) -> Option<&dyn Thumbnailer> {
        Some(self)
    }
}

impl Thumbnailer for PhotoInspecter {
    fn thumbnail(&self, reader: &mut dyn ReadSeek, max_dimension: u32) -> Result<Thumbnail> {
        reader.rewind()?;
        let decoded = ImageReader::new(BufReader::new(&mut *reader))
            .with_guessed_format()?
            .decode()
            .map_err(|e| MediaError::Thumbnail(format!("Failed to decode image: {e}")))?;

        let max = max_dimension.max(1);
        let fitted = if decoded.width() > max || decoded.height() > max {
            decoded.thumbnail(max, max)
        } else {
            decoded
        };
        let rgb = fitted.to_rgb8();

        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, THUMBNAIL_JPEG_QUALITY)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8.into())
            .map_err(|e| MediaError::Thumbnail(format!("Failed to encode thumbnail: {e}")))?;

        Ok(Thumbnail {
            data: out.into_inner(),
            mime: "image/jpeg".to_string(),
        })
    }
}
