use std::path::Path;

/// Extension of the metadata file stored next to every content file.
pub const METAFILE_EXT: &str = "meta";

/// Pseudo mime type for metadata files, so store-wide scans can tell them
/// apart from content.
pub const METAFILE_MIME: &str = "application/vnd.stash.meta+json";

/// Mime type of tag items.
pub const TAG_MIME: &str = "application/vnd.stash.tag";

/// Static extension → mime table used by the scanner and the watcher.
///
/// Keeping the list in one place keeps batch scans and watch imports from
/// disagreeing about which files qualify.
pub const EXTENSION_MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("tag", TAG_MIME),
    (METAFILE_EXT, METAFILE_MIME),
];

/// Resolve the mime type for a path from its (case-insensitive) extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSION_MIME_TYPES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, mime)| *mime)
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}
