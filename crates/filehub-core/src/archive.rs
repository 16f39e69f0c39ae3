//! Zip archive inspection without extraction.
//!
//! Listings report entry names and modification times only; content is never
//! decompressed. Names written by pre-UTF-8 zip tools are stored in a legacy
//! single-byte code page; for our locale that is IBM866, so non-UTF-8 names
//! are reinterpreted through it. One undecodable name must not fail the whole
//! listing: the raw bytes are kept (lossily) and a warning is logged.

use serde::Serialize;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Errors from archive inspection.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The container is malformed (bad signature, truncated central
    /// directory, corrupt entry headers).
    #[error("unreadable archive: {0}")]
    Unreadable(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One file entry inside a zip container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub mod_time: String,
}

/// List the file entries of a zip container, in container order.
///
/// Directory entries are skipped. Blocking; async callers go through
/// `spawn_blocking`.
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        if entry.is_dir() {
            continue;
        }
        entries.push(ArchiveEntry {
            name: decode_entry_name(entry.name_raw()),
            mod_time: format_mod_time(entry.last_modified().unwrap_or_default()),
        });
    }

    Ok(entries)
}

/// Decode a stored entry name.
///
/// Names flagged UTF-8 arrive as valid UTF-8 bytes; everything else is
/// treated as IBM866. A failed legacy decode falls back to a lossy rendition
/// of the raw bytes so the rest of the listing survives.
fn decode_entry_name(raw: &[u8]) -> String {
    if let Ok(name) = std::str::from_utf8(raw) {
        return name.to_owned();
    }
    let (decoded, _, had_errors) = encoding_rs::IBM866.decode(raw);
    if had_errors {
        warn!("archive entry name not decodable as IBM866, keeping raw bytes");
        return String::from_utf8_lossy(raw).into_owned();
    }
    decoded.into_owned()
}

fn format_mod_time(dt: zip::DateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}
