//! Output directory file operations.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

async fn ensure_parent(path: &Path) -> io::Result<()> {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
    _ => Ok(()),
  }
}

/// Writes `contents`, creating parent directories.
pub async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
  ensure_parent(path).await?;
  fs::write(path, contents).await
}

/// Writes to a sibling temp file then renames it over `path`, so readers
/// never observe a partially written file.
pub async fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
  ensure_parent(path).await?;

  let mut name = path.file_name().map(OsString::from).unwrap_or_default();
  name.push(".tmp");
  let temp_path: PathBuf = path.with_file_name(name);

  fs::write(&temp_path, contents).await?;
  fs::rename(&temp_path, path).await
}

pub async fn copy_file(from: &Path, to: &Path) -> io::Result<()> {
  ensure_parent(to).await?;
  fs::copy(from, to).await.map(|_| ())
}

/// Removes everything under `dir` and recreates it empty.
pub async fn clear_dir(dir: &Path) -> io::Result<()> {
  match fs::remove_dir_all(dir).await {
    Ok(()) => {}
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => return Err(e),
  }
  fs::create_dir_all(dir).await
}
