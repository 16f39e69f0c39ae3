//! Crash-safe byte storage rooted at a single directory.
//!
//! Writes never mutate the destination in place: bytes are streamed into a
//! temporary file in the destination's directory, and the final rename is the
//! single commit point. A reader racing a writer sees either the old content
//! or the new content in full, never a mix. Two writers to the same path race
//! at the rename; the last rename wins (accepted limitation, no locking).

use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::warn;
use walkdir::WalkDir;

/// Errors from the byte store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(PathBuf),

    #[error("path escapes storage root: {0}")]
    OutsideRoot(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Filesystem-backed store confined to a storage root.
///
/// The store holds no state besides the root path; size and existence are
/// answered by the filesystem directly so they can never go stale.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Whether `path` is a regular file, and its size.
    ///
    /// A missing path is `(false, 0)`, not an error; directories report
    /// `(false, size)` so callers treat them as non-servable.
    pub async fn exists(&self, path: &Path) -> Result<(bool, u64), StoreError> {
        match fs::metadata(path).await {
            Ok(meta) => Ok((meta.is_file(), meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok((false, 0)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn size(&self, path: &Path) -> Result<u64, StoreError> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn open(&self, path: &Path) -> Result<fs::File, StoreError> {
        match fs::File::open(path).await {
            Ok(f) => Ok(f),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stream `reader` into `path` atomically, returning the byte count.
    ///
    /// The destination's parent directories are created as needed. The bytes
    /// go into a fresh temp file in the same directory as the destination
    /// (same filesystem, so the commit rename is atomic), and the rename only
    /// happens after the full stream has been copied and the temp file
    /// closed. Any earlier failure removes the temp file and leaves a
    /// pre-existing destination untouched.
    pub async fn write<R>(&self, path: &Path, reader: &mut R) -> Result<u64, StoreError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if !path.starts_with(&self.root) {
            return Err(StoreError::OutsideRoot(path.to_owned()));
        }
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::OutsideRoot(path.to_owned()))?;
        fs::create_dir_all(parent).await?;

        let (std_file, tmp_path) = NamedTempFile::with_prefix_in(".tmp_", parent)?.into_parts();
        let mut file = fs::File::from_std(std_file);

        let written = match tokio::io::copy(reader, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                discard_temp(tmp_path);
                return Err(e.into());
            }
        };
        if let Err(e) = file.flush().await {
            drop(file);
            discard_temp(tmp_path);
            return Err(e.into());
        }
        drop(file);

        // The commit point.
        tmp_path.persist(path).map_err(|e| {
            discard_temp(e.path);
            StoreError::Io(e.error)
        })?;

        Ok(written)
    }

    /// Total size of all regular files under the root.
    ///
    /// Full directory walk; used once at startup to seed the storage gauge.
    pub async fn total_size(&self) -> Result<u64, StoreError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let mut total = 0u64;
            for entry in WalkDir::new(&root) {
                let entry = entry.map_err(|e| StoreError::Io(io::Error::other(e)))?;
                if entry.file_type().is_file() {
                    total += entry.metadata().map(|m| m.len()).unwrap_or(0);
                }
            }
            Ok(total)
        })
        .await
        .map_err(|e| StoreError::Io(io::Error::other(e)))?
    }
}

/// Remove a leftover temp file. Cleanup failure is logged, never returned:
/// the caller's original error is the one that matters.
fn discard_temp(tmp_path: tempfile::TempPath) {
    let shown = tmp_path.to_path_buf();
    if let Err(e) = tmp_path.close() {
        warn!(path = %shown.display(), error = %e, "failed to remove temporary file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::TempDir;
    use tokio::io::ReadBuf;

    fn store(dir: &TempDir) -> FsStore {
        FsStore::new(dir.path())
    }

    async fn write_bytes(store: &FsStore, path: &Path, bytes: &[u8]) -> Result<u64, StoreError> {
        let mut reader = bytes;
        store.write(path, &mut reader).await
    }

    /// Reader that yields some bytes and then fails, to simulate a client
    /// that dies mid-upload.
    struct FailingReader {
        remaining: Vec<u8>,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.remaining.is_empty() {
                return Poll::Ready(Err(io::Error::other("stream interrupted")));
            }
            let n = self.remaining.len().min(buf.remaining());
            buf.put_slice(&self.remaining[..n]);
            self.remaining.drain(..n);
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let dest = dir.path().join("a/b/c.txt");

        let n = write_bytes(&store, &dest, b"hello world").await.unwrap();
        assert_eq!(n, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");

        let (is_file, size) = store.exists(&dest).await.unwrap();
        assert!(is_file);
        assert_eq!(size, 11);
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error_for_exists() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let (is_file, size) = store.exists(&dir.path().join("nope")).await.unwrap();
        assert!(!is_file);
        assert_eq!(size, 0);
        assert!(matches!(
            store.size(&dir.path().join("nope")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_paths_outside_root() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let err = write_bytes(&store, Path::new("/tmp/elsewhere.txt"), b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OutsideRoot(_)));
    }

    #[tokio::test]
    async fn interrupted_write_leaves_original_intact() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let dest = dir.path().join("doc.txt");

        write_bytes(&store, &dest, b"original content").await.unwrap();

        let mut failing = FailingReader {
            remaining: b"partial garb".to_vec(),
        };
        let err = store.write(&dest, &mut failing).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        // Destination untouched, temp file cleaned up.
        assert_eq!(std::fs::read(&dest).unwrap(), b"original content");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp_"))
            .collect();
        assert!(leftovers.is_empty(), "temp file not cleaned up");
    }

    #[tokio::test]
    async fn sequential_writes_last_writer_wins() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let dest = dir.path().join("contested.bin");

        let first = vec![0xAAu8; 64 * 1024];
        let second = vec![0x55u8; 48 * 1024];
        write_bytes(&store, &dest, &first).await.unwrap();
        write_bytes(&store, &dest, &second).await.unwrap();

        let got = std::fs::read(&dest).unwrap();
        assert_eq!(got, second, "destination must reflect one payload in full");
    }

    #[tokio::test]
    async fn total_size_sums_regular_files() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        write_bytes(&store, &dir.path().join("a.bin"), &[0u8; 100])
            .await
            .unwrap();
        write_bytes(&store, &dir.path().join("sub/b.bin"), &[0u8; 50])
            .await
            .unwrap();
        assert_eq!(store.total_size().await.unwrap(), 150);
    }
}
