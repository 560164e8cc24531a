//! Filesystem access for served files and uploads.
//!
//! Provides:
//! - Resolution of GET paths under the served root
//! - Existence and directory checks
//! - Directory enumeration for listings
//! - Upload destinations under the uploads directory
//!
//! Paths are joined verbatim; nothing stops `..` from escaping the root.
//! Access is not synchronized between connections.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tracing::{debug, info};

use crate::protocol::html::ListingEntry;

/// Served root plus uploads directory
#[derive(Debug)]
pub struct Storage {
    /// Directory GET paths are resolved against
    root: PathBuf,
    /// Directory uploads are written to, created on demand
    upload_dir: PathBuf,
}

impl Storage {
    /// Create a new storage instance
    pub fn new(root: impl Into<PathBuf>, upload_dir: impl Into<PathBuf>) -> Arc<Self> {
        let root = root.into();
        let upload_dir = upload_dir.into();
        info!(
            root = %root.display(),
            upload_dir = %upload_dir.display(),
            "Initializing storage"
        );
        Arc::new(Self { root, upload_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Map a GET path such as `/docs/a.txt` to a filesystem path.
    pub fn resolve(&self, target: &str) -> PathBuf {
        let relative = target.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    pub async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok()
    }

    pub async fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
    }

    /// Immediate children of `path`, sorted by name.
    pub async fn list_children(&self, path: &Path) -> io::Result<Vec<ListingEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            entries.push(ListingEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Open a file for streaming, returning it with its length.
    ///
    /// Directories are rejected here so that no length is announced for
    /// something that cannot be read.
    pub async fn open(&self, path: &Path) -> io::Result<(File, u64)> {
        let metadata = fs::metadata(path).await?;
        if metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        let file = File::open(path).await?;
        Ok((file, metadata.len()))
    }

    /// Whole file as text, invalid UTF-8 replaced.
    pub async fn read_text(&self, path: &Path) -> io::Result<String> {
        let bytes = fs::read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Destination path for an upload, creating the uploads directory if
    /// it does not exist yet. The name is used verbatim.
    pub async fn create(&self, file_name: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.upload_dir).await?;
        let destination = self.upload_dir.join(file_name);
        debug!(path = %destination.display(), "Upload destination");
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, Arc<Storage>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("b.png"), [0x89, b'P']).unwrap();
        let storage = Storage::new(dir.path(), dir.path().join("uploaded"));
        (dir, storage)
    }

    #[test]
    fn test_resolve() {
        let storage = Storage::new("/srv/files", "/srv/uploaded");
        assert_eq!(storage.resolve("/"), PathBuf::from("/srv/files"));
        assert_eq!(
            storage.resolve("/docs/a.txt"),
            PathBuf::from("/srv/files/docs/a.txt")
        );
    }

    #[tokio::test]
    async fn test_exists_and_is_dir() {
        let (_dir, storage) = fixture();
        let file = storage.resolve("/a.txt");
        let docs = storage.resolve("/docs");

        assert!(storage.exists(&file).await);
        assert!(!storage.is_dir(&file).await);
        assert!(storage.is_dir(&docs).await);
        assert!(!storage.exists(&storage.resolve("/missing.txt")).await);
    }

    #[tokio::test]
    async fn test_list_children_sorted() {
        let (_dir, storage) = fixture();
        let entries = storage.list_children(storage.root()).await.unwrap();

        assert_eq!(
            entries,
            vec![
                ListingEntry {
                    name: "a.txt".to_string(),
                    is_dir: false
                },
                ListingEntry {
                    name: "docs".to_string(),
                    is_dir: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_children_of_file_fails() {
        let (_dir, storage) = fixture();
        assert!(storage.list_children(&storage.resolve("/a.txt")).await.is_err());
    }

    #[tokio::test]
    async fn test_open_reports_length() {
        let (_dir, storage) = fixture();
        let (_file, len) = storage.open(&storage.resolve("/docs/b.png")).await.unwrap();
        assert_eq!(len, 2);
    }

    #[tokio::test]
    async fn test_open_directory_rejected() {
        let (_dir, storage) = fixture();
        let err = storage.open(&storage.resolve("/docs")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_read_text() {
        let (_dir, storage) = fixture();
        let text = storage.read_text(&storage.resolve("/a.txt")).await.unwrap();
        assert_eq!(text, "alpha");
    }

    #[tokio::test]
    async fn test_create_makes_upload_dir() {
        let (dir, storage) = fixture();
        assert!(!dir.path().join("uploaded").exists());

        let destination = storage.create("notes.txt").await.unwrap();
        assert_eq!(destination, dir.path().join("uploaded").join("notes.txt"));
        assert!(dir.path().join("uploaded").is_dir());
    }
}
