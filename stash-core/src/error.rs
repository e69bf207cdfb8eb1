use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate item: {0}")]
    DuplicateItem(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown mime type: {0}")]
    UnknownMimeType(String),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),

    #[error("Thumbnail generation failed: {0}")]
    Thumbnail(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// An error produced once and handed to every caller of a coalesced
    /// request.
    #[error(transparent)]
    Shared(Arc<MediaError>),
}

impl MediaError {
    pub fn is_not_found(&self) -> bool {
        match self {
            MediaError::NotFound(_) => true,
            MediaError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            MediaError::Shared(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        match self {
            MediaError::DuplicateItem(_) => true,
            MediaError::Shared(inner) => inner.is_duplicate(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
