//! HTTP server lifecycle: bind, accept loop, shutdown.

use crate::router::{self, AppState};
use filehub_core::Storage;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Window for in-flight requests to finish after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// A running server instance bound to a concrete address.
pub struct Server {
    /// The actual bound address (useful with port 0).
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Server {
    /// Bind and start serving in a background task.
    pub async fn start<S: Storage + Clone>(
        state: Arc<AppState<S>>,
        addr: SocketAddr,
    ) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;

        info!(addr = %actual_addr, "starting server");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_handle = tokio::spawn(run_server(listener, state, shutdown_rx));

        Ok(Self {
            addr: actual_addr,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Base URL of this instance.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting, drain in-flight connections, then return.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!("server stopped");
    }

    fn stop_sync(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

/// Accept loop. Every connection is watched by the graceful-shutdown handle,
/// so draining waits for active requests while idle keep-alive connections
/// are told to close immediately.
async fn run_server<S: Storage + Clone>(
    listener: TcpListener,
    state: Arc<AppState<S>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();
                        let service = service_fn(move |req: Request<Incoming>| {
                            let state = state.clone();
                            async move {
                                let resp = router::handle(state, req).await;
                                Ok::<_, Infallible>(resp)
                            }
                        });

                        let builder = auto::Builder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, service);
                        let conn = graceful.watch(conn.into_owned());
                        tokio::spawn(async move {
                            if let Err(e) = conn.await {
                                warn!(peer = %peer_addr, error = %e, "HTTP connection error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                }
            }
            _ = &mut shutdown_rx => {
                info!("received shutdown signal");
                break;
            }
        }
    }

    drop(listener);
    tokio::select! {
        () = graceful.shutdown() => {
            debug!("all connections drained");
        }
        () = tokio::time::sleep(SHUTDOWN_GRACE) => {
            warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "grace period elapsed, dropping open connections"
            );
        }
    }
}
