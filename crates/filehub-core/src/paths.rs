//! Resolution of untrusted client-supplied paths into the storage root.
//!
//! The resolver is purely lexical: it normalizes the input without touching
//! the filesystem, joins it onto the storage root, and re-checks the result
//! against the root. Symlink games inside the storage tree are therefore not
//! detected here; the store performs its own containment check before every
//! write.

use relative_path::{Component, RelativePath};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error returned for paths that cannot be confined to the storage root.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path: {0}")]
    Invalid(String),
}

/// Maps client-relative paths to absolute paths under a fixed storage root.
///
/// The root is fixed at construction and never changes. `resolve` is pure and
/// idempotent: the same input always yields the same output.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for an absolute storage root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root all resolved paths live under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a client-relative path to an absolute path inside the root.
    ///
    /// Contract: the input must already be percent-decoded. Decoding happens
    /// exactly once, at the HTTP boundary; decoding again here would change
    /// traversal semantics (`%2e%2e` arriving literally must stay literal).
    ///
    /// `.` and `..` segments and repeated separators are collapsed lexically.
    /// Inputs that normalize to empty, or that would climb above the root,
    /// fail with [`PathError::Invalid`].
    pub fn resolve(&self, rel: &str) -> Result<PathBuf, PathError> {
        let normalized = RelativePath::new(rel.trim_start_matches('/')).normalize();

        if normalized.as_str().is_empty() {
            return Err(PathError::Invalid("path is empty".to_owned()));
        }
        // normalize() keeps leading `..` components; any left over means the
        // input escapes the root.
        if matches!(normalized.components().next(), Some(Component::ParentDir)) {
            return Err(PathError::Invalid(rel.to_owned()));
        }

        let abs = normalized.to_logical_path(&self.root);

        // Defense in depth: the join above is lexical, so this holds by
        // construction, but a regression here would be a traversal hole.
        if !abs.starts_with(&self.root) {
            return Err(PathError::Invalid(rel.to_owned()));
        }

        Ok(abs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::new("/safe/storage")
    }

    #[test]
    fn resolves_normal_file() {
        let got = resolver().resolve("folder/file.txt").unwrap();
        assert_eq!(got, Path::new("/safe/storage/folder/file.txt"));
    }

    #[test]
    fn resolves_nested_path() {
        let got = resolver().resolve("a/b/c/d.txt").unwrap();
        assert_eq!(got, Path::new("/safe/storage/a/b/c/d.txt"));
    }

    #[test]
    fn leading_slash_is_stripped() {
        let got = resolver().resolve("/docs/report.pdf").unwrap();
        assert_eq!(got, Path::new("/safe/storage/docs/report.pdf"));
    }

    #[test]
    fn collapses_repeated_separators_and_dots() {
        let got = resolver().resolve("//docs//./file.txt").unwrap();
        assert_eq!(got, Path::new("/safe/storage/docs/file.txt"));
    }

    #[test]
    fn interior_parent_segments_collapse_in_place() {
        let got = resolver().resolve("a/../secret").unwrap();
        assert_eq!(got, Path::new("/safe/storage/secret"));
    }

    #[test]
    fn rejects_empty_path() {
        assert!(resolver().resolve("").is_err());
        assert!(resolver().resolve("/").is_err());
        assert!(resolver().resolve("a/..").is_err());
    }

    #[test]
    fn rejects_traversal_above_root() {
        assert!(resolver().resolve("../etc/passwd").is_err());
        assert!(resolver().resolve("/../../../etc/passwd").is_err());
        assert!(resolver().resolve("a/../../secret").is_err());
    }

    #[test]
    fn percent_sequences_stay_literal() {
        // The resolver must not decode; "%2F" is just three odd characters
        // in a filename by the time it gets here.
        let got = resolver().resolve("..%2F..%2Fsecret").unwrap();
        assert_eq!(got, Path::new("/safe/storage/..%2F..%2Fsecret"));
    }

    #[test]
    fn resolve_is_idempotent() {
        let r = resolver();
        assert_eq!(r.resolve("a/b.txt").unwrap(), r.resolve("a/b.txt").unwrap());
    }
}
