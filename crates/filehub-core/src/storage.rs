//! The storage capability handlers are written against.
//!
//! One narrow trait instead of concrete types, so handler logic can be tested
//! against a substitute backing store. [`FsStorage`] is the production
//! implementation: [`PathResolver`] + [`FsStore`] + the archive inspector.

use crate::archive::{self, ArchiveEntry, ArchiveError};
use crate::paths::{PathError, PathResolver};
use crate::store::{FsStore, StoreError};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

/// Path resolution, byte storage and archive inspection behind one seam.
///
/// `resolve` is pure; everything else does I/O on the caller's task.
pub trait Storage: Send + Sync + 'static {
    /// Readable stream for stored file content.
    type Reader: AsyncRead + Send + Unpin + 'static;

    /// Confine a client-relative path to the storage root.
    fn resolve(&self, rel: &str) -> Result<PathBuf, PathError>;

    /// The storage root itself.
    fn root(&self) -> &Path;

    /// `(is_regular_file, size)`; missing paths are `(false, 0)`.
    fn exists(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<(bool, u64), StoreError>> + Send;

    fn size(&self, path: &Path) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn open(&self, path: &Path) -> impl Future<Output = Result<Self::Reader, StoreError>> + Send;

    /// Atomic write; returns the byte count.
    fn write<R>(
        &self,
        path: &Path,
        reader: &mut R,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send
    where
        R: AsyncRead + Send + Unpin + ?Sized;

    /// Entry listing for a zip container at `path`.
    fn list_archive(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Vec<ArchiveEntry>, ArchiveError>> + Send;

    /// Total bytes stored under the root (startup gauge seed).
    fn total_size(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Filesystem-backed [`Storage`].
#[derive(Debug, Clone)]
pub struct FsStorage {
    resolver: PathResolver,
    store: FsStore,
}

impl FsStorage {
    /// Create the storage root if missing and canonicalize it, so prefix
    /// checks hold even when the configured path contains symlinks.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        Ok(Self {
            resolver: PathResolver::new(root.clone()),
            store: FsStore::new(root),
        })
    }
}

impl Storage for FsStorage {
    type Reader = tokio::fs::File;

    fn resolve(&self, rel: &str) -> Result<PathBuf, PathError> {
        self.resolver.resolve(rel)
    }

    fn root(&self) -> &Path {
        self.resolver.root()
    }

    async fn exists(&self, path: &Path) -> Result<(bool, u64), StoreError> {
        self.store.exists(path).await
    }

    async fn size(&self, path: &Path) -> Result<u64, StoreError> {
        self.store.size(path).await
    }

    async fn open(&self, path: &Path) -> Result<Self::Reader, StoreError> {
        self.store.open(path).await
    }

    async fn write<R>(&self, path: &Path, reader: &mut R) -> Result<u64, StoreError>
    where
        R: AsyncRead + Send + Unpin + ?Sized,
    {
        self.store.write(path, reader).await
    }

    async fn list_archive(&self, path: &Path) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let path = path.to_owned();
        tokio::task::spawn_blocking(move || archive::list_entries(&path))
            .await
            .map_err(|e| ArchiveError::Io(io::Error::other(e)))?
    }

    async fn total_size(&self) -> Result<u64, StoreError> {
        self.store.total_size().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn resolve_then_write_then_open() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();

        let dest = storage.resolve("notes/today.txt").unwrap();
        let mut payload: &[u8] = b"remember the milk";
        storage.write(&dest, &mut payload).await.unwrap();

        let (is_file, size) = storage.exists(&dest).await.unwrap();
        assert!(is_file);
        assert_eq!(size, 17);

        let mut reader = storage.open(&dest).await.unwrap();
        let mut got = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut got)
            .await
            .unwrap();
        assert_eq!(got, b"remember the milk");
    }

    #[tokio::test]
    async fn resolved_paths_stay_under_root() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();
        let abs = storage.resolve("a/b/c.txt").unwrap();
        assert!(abs.starts_with(storage.root()));
        assert!(storage.resolve("../escape.txt").is_err());
    }
}
