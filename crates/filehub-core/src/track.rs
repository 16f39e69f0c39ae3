//! Reconciliation of the external editor's save-back callback.
//!
//! The editor posts a notification when a document's editing session changes
//! state. Only the must-save statuses (2: ready for saving, 3: save error on
//! the editor side) carry a new document version; everything else is a
//! presence signal and is acknowledged without side effects. One pass, no
//! internal retries: the editor service has its own retry policy.

use crate::editor::EditorSession;
use crate::storage::Storage;
use crate::store::StoreError;
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::json;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio_util::io::StreamReader;
use tracing::{debug, info};
use url::Url;

/// Statuses that require persisting a new document version.
const MUST_SAVE_STATUSES: [i64; 2] = [2, 3];

/// Callback payload from the external editor.
///
/// `status` and `key` are mandatory (deserialization fails without them);
/// `url` is only required for must-save statuses and is validated in
/// [`TrackReconciler::reconcile`].
#[derive(Debug, Deserialize)]
pub struct TrackNotification {
    pub status: i64,
    #[serde(default)]
    pub url: Option<String>,
    pub key: String,
    #[serde(default)]
    pub actions: Vec<TrackAction>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackAction {
    #[serde(rename = "type", default)]
    pub kind: i64,
    #[serde(rename = "userid", default)]
    pub user_id: String,
}

impl TrackNotification {
    pub fn is_must_save(&self) -> bool {
        MUST_SAVE_STATUSES.contains(&self.status)
    }
}

/// Byte accounting for a committed save-back, for the caller's metrics.
#[derive(Debug, Clone, Copy)]
pub struct SaveOutcome {
    pub bytes_written: u64,
    /// Net change to stored bytes (negative when the new version shrank).
    pub storage_delta: i64,
}

/// How a failed reconciliation maps onto an HTTP response class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackErrorKind {
    BadRequest,
    Unauthorized,
    Upstream,
    Internal,
}

/// Reconciliation failure carrying everything the log line needs.
///
/// The client only ever sees `message`; `source` and `context` stay in the
/// structured log so internals never leak into the HTTP response body.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TrackError {
    pub kind: TrackErrorKind,
    pub message: &'static str,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub context: serde_json::Value,
}

impl TrackError {
    fn new(
        kind: TrackErrorKind,
        message: &'static str,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            message,
            source,
            context,
        }
    }
}

/// Applies a validated notification against the store.
pub struct TrackReconciler<S> {
    storage: S,
    client: reqwest::Client,
    /// Internal host (optionally `host:port`) the document fetch is rewritten
    /// to, avoiding a round-trip over the public address.
    internal_host: Option<String>,
}

impl<S: Storage + Clone> TrackReconciler<S> {
    pub fn new(
        storage: S,
        internal_host: Option<String>,
        fetch_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            storage,
            client,
            internal_host,
        })
    }

    /// Run one notification to completion.
    ///
    /// Authentication has already happened at the boundary; this only
    /// validates the payload, fetches the updated document and commits it.
    /// `Ok(None)` means the status carried no new version to persist.
    pub async fn reconcile(
        &self,
        notification: &TrackNotification,
    ) -> Result<Option<SaveOutcome>, TrackError> {
        if !notification.is_must_save() {
            debug!(status = notification.status, "track status acknowledged without action");
            return Ok(None);
        }

        let Some(url) = notification.url.as_deref() else {
            return Err(TrackError::new(
                TrackErrorKind::BadRequest,
                "missing url field",
                None,
                json!({ "status": notification.status }),
            ));
        };

        let rel_path = EditorSession::decode_document_key(&notification.key).map_err(|e| {
            TrackError::new(
                TrackErrorKind::BadRequest,
                "failed to decode key",
                Some(Box::new(e)),
                json!({ "key": notification.key }),
            )
        })?;

        // The key was minted by this server, so a resolution failure means
        // corruption, not client error.
        let dest = self.storage.resolve(&rel_path).map_err(|e| {
            TrackError::new(
                TrackErrorKind::Internal,
                "failed to resolve document path",
                Some(Box::new(e)),
                json!({ "path": rel_path }),
            )
        })?;

        let (_, old_size) = self.storage.exists(&dest).await.map_err(|e| {
            TrackError::new(
                TrackErrorKind::Internal,
                "failed to stat document",
                Some(Box::new(e)),
                json!({ "path": rel_path }),
            )
        })?;

        let fetch_url = self.rewrite_url(url)?;
        let response = self
            .client
            .get(fetch_url.clone())
            .send()
            .await
            .map_err(|e| {
                TrackError::new(
                    TrackErrorKind::Upstream,
                    "failed to download updated document",
                    Some(Box::new(e)),
                    json!({ "url": fetch_url }),
                )
            })?;

        if !response.status().is_success() {
            return Err(TrackError::new(
                TrackErrorKind::Upstream,
                "document download returned non-success status",
                None,
                json!({ "url": fetch_url, "status": response.status().as_u16() }),
            ));
        }

        let stream = response.bytes_stream().map_err(io::Error::other);
        let mut reader = StreamReader::new(stream);
        let written = self
            .storage
            .write(&dest, &mut reader)
            .await
            .map_err(|e| store_error(e, &rel_path))?;

        info!(path = %rel_path, bytes = written, "document saved from editor callback");
        Ok(Some(SaveOutcome {
            bytes_written: written,
            storage_delta: written as i64 - old_size as i64,
        }))
    }

    /// Rewrite the fetch URL onto the internal document-service address when
    /// one is configured; otherwise the notification URL is used as-is.
    fn rewrite_url(&self, raw: &str) -> Result<String, TrackError> {
        let Some(internal) = self.internal_host.as_deref() else {
            return Ok(raw.to_owned());
        };

        let mut url = Url::parse(raw).map_err(|e| {
            TrackError::new(
                TrackErrorKind::BadRequest,
                "invalid document url",
                Some(Box::new(e)),
                json!({ "url": raw }),
            )
        })?;

        let (host, port) = match internal.rsplit_once(':') {
            Some((h, p)) if p.parse::<u16>().is_ok() => (h, p.parse::<u16>().ok()),
            _ => (internal, None),
        };
        let _ = url.set_scheme("http");
        url.set_host(Some(host)).map_err(|e| {
            TrackError::new(
                TrackErrorKind::Internal,
                "invalid internal document-service host",
                Some(Box::new(e)),
                json!({ "host": internal }),
            )
        })?;
        let _ = url.set_port(port);

        Ok(url.into())
    }
}

fn store_error(e: StoreError, rel_path: &str) -> TrackError {
    TrackError::new(
        TrackErrorKind::Internal,
        "failed to write document",
        Some(Box::new(e)),
        json!({ "path": rel_path }),
    )
}
