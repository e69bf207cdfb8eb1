use std::path::{Path, PathBuf};

/// Replace a leading `~` with `home`. Other paths are returned unchanged.
pub fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// The current user's home directory, or `.` when it cannot be determined.
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn parse_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

pub fn parse_u64(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}
