//! Shared application state and request dispatch.

use crate::handlers::{self, HttpBody};
use crate::metrics::ServerMetrics;
use filehub_core::{EditorSession, Storage, TrackReconciler};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Everything a request handler can reach, shared across connection tasks.
pub struct AppState<S: Storage + Clone> {
    pub storage: S,
    pub editor: EditorSession,
    pub reconciler: TrackReconciler<S>,
    pub metrics: ServerMetrics,
    pub api_key: String,
    pub doc_server_url: String,
    pub storage_path: String,
    pub port: u16,
}

/// Dispatch one request and emit the completion log line.
pub async fn handle<S: Storage + Clone>(
    state: Arc<AppState<S>>,
    req: Request<Incoming>,
) -> Response<HttpBody> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let resp = route(&state, req).await;

    state.metrics.record_request();
    info!(
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        duration = ?start.elapsed(),
        "request completed"
    );
    resp
}

async fn route<S: Storage + Clone>(
    state: &Arc<AppState<S>>,
    req: Request<Incoming>,
) -> Response<HttpBody> {
    let path = req.uri().path().to_owned();
    match (req.method(), path.as_str()) {
        (&Method::GET, "/health" | "/ready") => handlers::text(StatusCode::OK, "OK"),
        (&Method::GET, "/info") => handlers::info_page(state),
        (&Method::GET, "/metrics") => handlers::metrics_page(state),
        (&Method::GET, "/edit") => handlers::edit(state, &req),
        // The callback URL is derived from the public base, which carries
        // the /d prefix; accept the bare path too.
        (&Method::POST, "/track" | "/d/track") => handlers::track(state, req).await,
        _ if path == "/d" || path.starts_with("/d/") => {
            let rel = &path["/d".len()..];
            match *req.method() {
                Method::GET | Method::HEAD => handlers::serve_file(state, &req, rel).await,
                Method::POST => handlers::upload(state, req).await,
                Method::OPTIONS => handlers::file_options(),
                _ => handlers::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
            }
        }
        _ => handlers::text(StatusCode::NOT_FOUND, "Not Found"),
    }
}
