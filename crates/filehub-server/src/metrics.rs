//! Request and storage counters, exposed in Prometheus text format.
//!
//! Lock-free atomic counters shared across request tasks. The storage gauge
//! is advisory: seeded by a full walk at startup and adjusted by upload
//! deltas, it tracks the true filesystem usage eventually but is never read
//! to make authorization or capacity decisions.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// Completed HTTP requests
    requests_total: AtomicU64,

    /// Bytes accepted through uploads and save-backs
    bytes_uploaded_total: AtomicU64,

    /// Bytes served to download clients
    bytes_downloaded_total: AtomicU64,

    /// Advisory total of stored bytes under the root
    total_storage_bytes: AtomicI64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upload: bytes received plus the net change to stored size
    /// (negative when an overwrite shrank the file).
    #[inline]
    pub fn record_upload(&self, bytes: u64, storage_delta: i64) {
        self.bytes_uploaded_total.fetch_add(bytes, Ordering::Relaxed);
        self.total_storage_bytes
            .fetch_add(storage_delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_download(&self, bytes: u64) {
        self.bytes_downloaded_total
            .fetch_add(bytes, Ordering::Relaxed);
    }

    /// Seed the storage gauge from the startup directory walk.
    pub fn set_storage_bytes(&self, bytes: i64) {
        self.total_storage_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn storage_bytes(&self) -> i64 {
        self.total_storage_bytes.load(Ordering::Relaxed)
    }

    /// Render all series in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(512);
        series(
            &mut out,
            "filehub_requests_total",
            "counter",
            "Total number of HTTP requests",
            self.requests_total.load(Ordering::Relaxed) as i64,
        );
        series(
            &mut out,
            "filehub_bytes_uploaded_total",
            "counter",
            "Total number of bytes uploaded",
            self.bytes_uploaded_total.load(Ordering::Relaxed) as i64,
        );
        series(
            &mut out,
            "filehub_bytes_downloaded_total",
            "counter",
            "Total number of bytes downloaded",
            self.bytes_downloaded_total.load(Ordering::Relaxed) as i64,
        );
        series(
            &mut out,
            "filehub_total_storage_bytes",
            "gauge",
            "Total size of all stored files in bytes",
            self.total_storage_bytes.load(Ordering::Relaxed),
        );
        out
    }
}

fn series(out: &mut String, name: &str, kind: &str, help: &str, value: i64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_delta_adjusts_storage_gauge() {
        let m = ServerMetrics::new();
        m.set_storage_bytes(1000);
        m.record_upload(300, 300);
        m.record_upload(100, -50); // overwrite that shrank a file
        assert_eq!(m.storage_bytes(), 1250);
    }

    #[test]
    fn render_contains_all_series() {
        let m = ServerMetrics::new();
        m.record_request();
        m.record_download(42);
        let text = m.render();
        assert!(text.contains("filehub_requests_total 1"));
        assert!(text.contains("filehub_bytes_downloaded_total 42"));
        assert!(text.contains("# TYPE filehub_total_storage_bytes gauge"));
    }
}
