use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const ARCHIVE_SUFFIX: &str = ".tar";
pub const CHECKPOINT_FILE_NAME: &str = "last_fetched_id";

/// Joins a catalog clone path onto the clone directory. Only normal
/// components are kept, so a record can never escape `clone_dir`.
pub fn repo_path(clone_dir: &Path, clone_path: &str) -> PathBuf {
    let mut path = clone_dir.to_path_buf();
    for component in Path::new(clone_path).components() {
        if let Component::Normal(segment) = component {
            path.push(sanitize_segment(&segment.to_string_lossy()));
        }
    }
    path
}

pub fn archive_path(repo_path: &Path) -> PathBuf {
    let mut name: OsString = repo_path.as_os_str().to_owned();
    name.push(ARCHIVE_SUFFIX);
    PathBuf::from(name)
}

pub fn checkpoint_path(clone_dir: &Path) -> PathBuf {
    clone_dir.join(CHECKPOINT_FILE_NAME)
}

/// Removes whatever occupies `path`, a directory tree or a single file.
/// A missing path is not an error.
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Unreadable directories count as non-empty so they go through update.
pub fn is_dir_empty(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => false,
    }
}

fn sanitize_segment(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|ch| match ch {
            '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            _ => ch,
        })
        .collect();
    while sanitized.ends_with('.') || sanitized.ends_with(' ') {
        sanitized.pop();
    }
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}
