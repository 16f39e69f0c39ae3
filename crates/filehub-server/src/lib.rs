//! HTTP surface for the filehub file store.
//!
//! Routing, handlers and lifecycle live here; all storage and editor-session
//! logic comes from `filehub-core`. The binary entry point is `main.rs`; the
//! library exists so integration tests can stand up a real server on an
//! ephemeral port.

pub mod config;
pub mod editor_page;
pub mod handlers;
pub mod metrics;
pub mod router;
pub mod server;

pub use config::Config;
pub use router::AppState;
pub use server::Server;
