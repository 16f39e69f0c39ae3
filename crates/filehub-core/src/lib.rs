//! Core building blocks for the filehub file server.
//!
//! This crate holds everything that is independent of the HTTP surface:
//!
//! - [`paths`]: confinement of untrusted relative paths to the storage root
//! - [`store`]: crash-safe byte storage (temp file + atomic rename)
//! - [`archive`]: zip listing with legacy-encoding name recovery
//! - [`storage`]: the capability trait handlers are written against
//! - [`editor`]: signed, stateless editor-session tokens
//! - [`track`]: reconciliation of the editor's save-back callback
//!
//! The server crate maps the typed errors defined here onto HTTP status
//! codes; nothing in this crate depends on hyper or any HTTP types.

pub mod archive;
pub mod editor;
pub mod paths;
pub mod storage;
pub mod store;
pub mod track;

pub use archive::{ArchiveEntry, ArchiveError};
pub use editor::{EditorError, EditorSession, SessionDescriptor};
pub use paths::{PathError, PathResolver};
pub use storage::{FsStorage, Storage};
pub use store::{FsStore, StoreError};
pub use track::{SaveOutcome, TrackError, TrackErrorKind, TrackNotification, TrackReconciler};
