//! Whole-document persistence with replace semantics.
//!
//! Documents are written to a uniquely named temporary file in the target
//! directory, synced, then renamed over the destination. A reader therefore
//! sees either the previous document or the new one, never a torn write.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::trace;
use uuid::Uuid;

/// Atomically replace `path` with `contents` (blocking)
pub fn write_atomic_blocking(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir)?;

    let tmp_path = temp_path(path);
    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        sync_dir(&dir);
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    } else {
        trace!("Replaced {} ({} bytes)", path.display(), contents.len());
    }

    result
}

/// Read a document, mapping "not found" to `None` (blocking)
pub fn read_optional_blocking(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove a document; returns whether anything was removed (blocking)
pub fn remove_if_exists_blocking(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            sync_dir(&parent_dir(path));
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Atomically replace `path` with `contents`
pub async fn write_atomic(path: &Path, contents: Vec<u8>) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &contents))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Read a document, mapping "not found" to `None`
pub async fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove a document; returns whether anything was removed
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || remove_if_exists_blocking(&path))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    parent_dir(path).join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Persist the rename itself; failure here only weakens crash durability
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_remove() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("doc.json");

        assert_eq!(read_optional(&path).await.unwrap(), None);

        write_atomic(&path, b"first".to_vec()).await.unwrap();
        write_atomic(&path, b"second".to_vec()).await.unwrap();
        assert_eq!(read_optional(&path).await.unwrap(), Some(b"second".to_vec()));

        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!remove_if_exists(&path).await.unwrap());
        assert_eq!(read_optional(&path).await.unwrap(), None);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.json");

        for i in 0..5 {
            write_atomic_blocking(&path, format!("{}", i).as_bytes()).unwrap();
        }

        let entries: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "4");
    }
}
