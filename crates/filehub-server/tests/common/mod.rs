//! Shared test harness: a real server on an ephemeral port plus a reqwest
//! client wired with the test credentials.

use filehub_core::{EditorSession, FsStorage, Storage, TrackReconciler};
use filehub_server::metrics::ServerMetrics;
use filehub_server::{AppState, Server};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const API_KEY: &str = "test-api-key";
pub const JWT_SECRET: &str = "test-jwt-secret";

pub struct TestServer {
    pub server: Server,
    pub client: reqwest::Client,
    // Held so the storage root outlives the server.
    storage_dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        let storage_dir = TempDir::new().unwrap();
        let storage = FsStorage::new(storage_dir.path()).unwrap();

        let metrics = ServerMetrics::new();
        let initial = storage.total_size().await.unwrap();
        metrics.set_storage_bytes(initial as i64);

        let editor = EditorSession::new(JWT_SECRET, "http://files.test/d", "ru");
        let reconciler =
            TrackReconciler::new(storage.clone(), None, Duration::from_secs(5)).unwrap();

        let storage_path = storage_dir.path().display().to_string();
        let state = Arc::new(AppState {
            storage,
            editor,
            reconciler,
            metrics,
            api_key: API_KEY.to_owned(),
            doc_server_url: "http://docserver.test:8000".to_owned(),
            storage_path,
            port: 0,
        });

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let server = Server::start(state, addr).await.unwrap();

        Self {
            server,
            client: reqwest::Client::new(),
            storage_dir,
        }
    }

    /// Graceful stop; hands back the storage root for post-shutdown asserts.
    pub async fn stop(self) -> TempDir {
        self.server.stop().await;
        self.storage_dir
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.url(), path)
    }

    /// Authenticated multipart upload of `content` to the given storage path.
    pub async fn upload(&self, rel: &str, content: Vec<u8>) -> reqwest::Response {
        self.upload_with_key(rel, content, API_KEY).await
    }

    pub async fn upload_with_key(
        &self,
        rel: &str,
        content: Vec<u8>,
        key: &str,
    ) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(content).file_name("upload.bin");
        let form = reqwest::multipart::Form::new().part("file", part);
        self.client
            .post(self.url(&format!("/d/upload?path={rel}")))
            .header("X-API-Key", key)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn head(&self, path: &str) -> reqwest::Response {
        self.client.head(self.url(path)).send().await.unwrap()
    }

    /// A token signed with the test secret, as the editor service would send.
    pub fn bearer_token(&self) -> String {
        EditorSession::new(JWT_SECRET, "http://files.test/d", "ru")
            .issue("http://files.test/d/x", "http://files.test/d/track", "key")
            .unwrap()
    }
}
