//! Request handlers for every route the server exposes.
//!
//! Handlers are generic over [`Storage`] so they can be exercised against a
//! substitute store; the router owns dispatch and the per-request log line.
//! Error bodies carry only a short human message, details go to the log.

use crate::editor_page;
use crate::router::AppState;
use bytes::Bytes;
use filehub_core::{Storage, TrackErrorKind, TrackNotification};
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use std::io;
use std::sync::Arc;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{error, info, warn};

/// Every response body is boxed down to one type so routing stays simple.
pub type HttpBody = UnsyncBoxBody<Bytes, io::Error>;

pub fn empty_body() -> HttpBody {
    Full::new(Bytes::new())
        .map_err(io::Error::other)
        .boxed_unsync()
}

fn full_body(bytes: impl Into<Bytes>) -> HttpBody {
    Full::new(bytes.into())
        .map_err(io::Error::other)
        .boxed_unsync()
}

/// Plain-text response.
pub fn text(status: StatusCode, body: &'static str) -> Response<HttpBody> {
    let mut resp = Response::new(full_body(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

fn json(status: StatusCode, body: String) -> Response<HttpBody> {
    let mut resp = Response::new(full_body(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

fn html(body: String) -> Response<HttpBody> {
    let mut resp = Response::new(full_body(body));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    resp
}

/// First value of a query parameter, percent-decoded.
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// `GET`/`HEAD /d/{path}`. A `HEAD` against a `.zip` answers with the JSON
/// entry listing instead of the usual size headers.
pub async fn serve_file<S: Storage + Clone>(
    state: &Arc<AppState<S>>,
    req: &Request<Incoming>,
    rel: &str,
) -> Response<HttpBody> {
    let Ok(rel) = percent_decode_str(rel).decode_utf8() else {
        return text(StatusCode::BAD_REQUEST, "Invalid path");
    };
    let Ok(path) = state.storage.resolve(&rel) else {
        return text(StatusCode::BAD_REQUEST, "Invalid path");
    };

    match state.storage.exists(&path).await {
        Ok((true, _)) => {}
        Ok((false, _)) => return text(StatusCode::NOT_FOUND, "Not Found"),
        Err(e) => {
            error!(path = %rel, error = %e, "failed to stat file");
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    }

    let is_zip = rel.to_ascii_lowercase().ends_with(".zip");
    let head = req.method() == Method::HEAD;

    if head && is_zip {
        return match state.storage.list_archive(&path).await {
            Ok(entries) => match serde_json::to_string(&entries) {
                Ok(body) => json(StatusCode::OK, body),
                Err(e) => {
                    error!(path = %rel, error = %e, "failed to encode archive listing");
                    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
                }
            },
            Err(e) => {
                error!(path = %rel, error = %e, "failed to read archive");
                text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };
    }

    let size = match state.storage.size(&path).await {
        Ok(size) => size,
        Err(e) => {
            error!(path = %rel, error = %e, "failed to stat file");
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let mut resp = if head {
        Response::new(empty_body())
    } else {
        let reader = match state.storage.open(&path).await {
            Ok(reader) => reader,
            Err(e) => {
                error!(path = %rel, error = %e, "failed to open file");
                return text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
            }
        };
        // Counted per chunk as bytes leave the process, so an aborted
        // download only contributes what was actually sent.
        let counter = Arc::clone(state);
        let stream = ReaderStream::new(reader).map_ok(move |chunk| {
            counter.metrics.record_download(chunk.len() as u64);
            Frame::data(chunk)
        });
        Response::new(StreamBody::new(stream).boxed_unsync())
    };
    resp.headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    resp
}

/// `POST /d/...?path=rel` multipart upload.
///
/// Accepts either the shared `X-API-Key` or a valid editor bearer token.
/// The destination comes from the `path` query parameter (`filename` as a
/// fallback name), never from the request path.
pub async fn upload<S: Storage + Clone>(
    state: &Arc<AppState<S>>,
    req: Request<Incoming>,
) -> Response<HttpBody> {
    if !authorized(state, &req) {
        return text(StatusCode::FORBIDDEN, "Forbidden");
    }

    let query = req.uri().query().map(str::to_owned);
    let Some(rel) = query_param(query.as_deref(), "path")
        .or_else(|| query_param(query.as_deref(), "filename"))
    else {
        return text(StatusCode::BAD_REQUEST, "Missing 'path' query param");
    };

    let dest = match state.storage.resolve(&rel) {
        Ok(dest) => dest,
        Err(e) => {
            warn!(path = %rel, error = %e, "upload path rejected");
            return text(StatusCode::BAD_REQUEST, "Invalid path");
        }
    };

    let boundary = match req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| multer::parse_boundary(v).ok())
    {
        Some(boundary) => boundary,
        None => return text(StatusCode::BAD_REQUEST, "Bad Request"),
    };

    let (_, old_size) = match state.storage.exists(&dest).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(path = %rel, error = %e, "failed to stat upload target");
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let mut multipart = multer::Multipart::new(req.into_body().into_data_stream(), boundary);
    let written = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if matches!(field.name(), Some("file" | "filename")) => {
                let mut reader = StreamReader::new(field.map_err(io::Error::other));
                match state.storage.write(&dest, &mut reader).await {
                    Ok(written) => break written,
                    Err(e) => {
                        error!(path = %rel, error = %e, "upload failed");
                        return text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
                    }
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => return text(StatusCode::BAD_REQUEST, "Bad Request"),
            Err(e) => {
                warn!(path = %rel, error = %e, "malformed multipart body");
                return text(StatusCode::BAD_REQUEST, "Bad Request");
            }
        }
    };

    // Overwrites only contribute the net size change to the gauge.
    let delta = written as i64 - old_size as i64;
    state.metrics.record_upload(written, delta);
    info!(path = %rel, size = written, "file uploaded");

    let mut resp = Response::new(empty_body());
    *resp.status_mut() = StatusCode::CREATED;
    resp
}

fn authorized<S: Storage + Clone>(state: &Arc<AppState<S>>, req: &Request<Incoming>) -> bool {
    if let Some(key) = req.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        if key == state.api_key {
            return true;
        }
    }
    bearer_token(req).is_some_and(|token| state.editor.verify(token))
}

fn bearer_token(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// `GET /edit?file=...` renders the editor bootstrap page.
pub fn edit<S: Storage + Clone>(
    state: &Arc<AppState<S>>,
    req: &Request<Incoming>,
) -> Response<HttpBody> {
    let query = req.uri().query();
    let file = query_param(query, "file").unwrap_or_default();
    let file = file.trim_start_matches('/');
    if file.is_empty() || file.contains("..") {
        return text(StatusCode::BAD_REQUEST, "Invalid file");
    }

    let username = query_param(query, "username").unwrap_or_else(|| "Аноним".to_owned());
    let user_id = query_param(query, "userId").unwrap_or_else(|| "9999".to_owned());

    match state.editor.descriptor(file) {
        Ok(descriptor) => html(editor_page::render(
            &descriptor,
            &state.doc_server_url,
            &username,
            &user_id,
        )),
        Err(e) => {
            error!(file, error = %e, "failed to build editor page");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// `POST /track` save-back callback from the editor service.
///
/// Every success path, including the no-op statuses, answers with exactly
/// `{"error":0}`; the editor treats anything else as a delivery failure.
pub async fn track<S: Storage + Clone>(
    state: &Arc<AppState<S>>,
    req: Request<Incoming>,
) -> Response<HttpBody> {
    match bearer_token(&req) {
        Some(token) if state.editor.verify(token) => {}
        Some(_) => return text(StatusCode::UNAUTHORIZED, "Invalid JWT token"),
        None => {
            return text(
                StatusCode::UNAUTHORIZED,
                "Missing or invalid Authorization header",
            );
        }
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "failed to read track body");
            return text(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };
    let notification: TrackNotification = match serde_json::from_slice(&body) {
        Ok(notification) => notification,
        Err(e) => {
            warn!(error = %e, "failed to parse track payload");
            return text(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    match state.reconciler.reconcile(&notification).await {
        Ok(outcome) => {
            if let Some(outcome) = outcome {
                state
                    .metrics
                    .record_upload(outcome.bytes_written, outcome.storage_delta);
            }
            json(StatusCode::OK, "{\"error\":0}".to_owned())
        }
        Err(e) => {
            error!(
                error = %e,
                source = ?e.source,
                context = %e.context,
                "track reconciliation failed"
            );
            let status = match e.kind {
                TrackErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                TrackErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                TrackErrorKind::Upstream | TrackErrorKind::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let mut resp = Response::new(full_body(e.message));
            *resp.status_mut() = status;
            resp
        }
    }
}

/// `GET /info` service summary.
pub fn info_page<S: Storage + Clone>(state: &Arc<AppState<S>>) -> Response<HttpBody> {
    let body = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
        "storage": {
            "path": state.storage_path,
            "total_size_bytes": state.metrics.storage_bytes(),
        },
    });
    json(StatusCode::OK, body.to_string())
}

/// `GET /metrics` Prometheus text exposition.
pub fn metrics_page<S: Storage + Clone>(state: &Arc<AppState<S>>) -> Response<HttpBody> {
    let mut resp = Response::new(full_body(state.metrics.render()));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    resp
}

/// `OPTIONS /d/...` capability preflight.
pub fn file_options() -> Response<HttpBody> {
    let mut resp = Response::new(empty_body());
    let headers = resp.headers_mut();
    headers.insert(
        header::ALLOW,
        HeaderValue::from_static("GET, HEAD, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    resp
}
