//! Content-addressed artifact cache.
//!
//! A fingerprint — the SHA-256 digest of the exact bytes of the merged
//! document — maps to `<root>/<key>.pdf` on durable storage. Presence of the
//! file is the only tracked state: no TTL, no size bound, no metadata.
//! Operational housekeeping (eviction, size caps) is deliberately out of
//! scope.
//!
//! ## Concurrency
//!
//! There is no cross-request coordination. Two conversions sharing a
//! fingerprint may both miss and both render; the second [`ArtifactCache::store`]
//! atomically replaces the first with byte-identical content. Wasteful but
//! safe: rendering is content-deterministic, and every write lands via a
//! rename, so a reader never observes a partial artifact.

use crate::error::PlatenError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// File extension for cached artifacts.
pub const ARTIFACT_EXT: &str = "pdf";

/// Compute the cache key for a merged document.
///
/// Identical bytes always yield identical keys; any difference yields a
/// different key with overwhelming probability.
pub fn fingerprint(document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    hex::encode(hasher.finalize())
}

/// Durable fingerprint-to-artifact store backed by a single directory.
#[derive(Debug)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Open (and create if needed) the cache directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PlatenError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| PlatenError::CacheIo {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self { root })
    }

    /// The cache directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical location of the artifact for `key`: `<root>/<key>.pdf`.
    ///
    /// Deterministic, so external callers (download handlers, reverse
    /// proxies) can construct it without consulting the cache again.
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{ARTIFACT_EXT}"))
    }

    /// Return the artifact path if it exists on disk.
    ///
    /// A pure existence check; the file is never opened.
    pub async fn lookup(&self, key: &str) -> Option<PathBuf> {
        let path = self.artifact_path(key);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            _ => None,
        }
    }

    /// Persist the bytes at `source` under `key`, returning the canonical
    /// artifact path.
    ///
    /// * `source` already canonical → no-op (rendering was directed straight
    ///   into cache storage, a second copy would be redundant).
    /// * `source` inside the cache root → a same-filesystem rename, atomic.
    /// * anywhere else → staged copy next to the destination, then renamed.
    ///
    /// Overwriting an existing artifact is safe: identical fingerprints imply
    /// byte-identical content.
    pub async fn store(&self, key: &str, source: &Path) -> Result<PathBuf, PlatenError> {
        let dest = self.artifact_path(key);
        if source == dest {
            return Ok(dest);
        }

        if source.parent() == dest.parent() {
            tokio::fs::rename(source, &dest)
                .await
                .map_err(|e| PlatenError::CacheIo {
                    path: dest.clone(),
                    source: e,
                })?;
            return Ok(dest);
        }

        let staged = tempfile::NamedTempFile::new_in(&self.root)
            .map_err(|e| PlatenError::CacheIo {
                path: self.root.clone(),
                source: e,
            })?
            .into_temp_path();
        tokio::fs::copy(source, &staged)
            .await
            .map_err(|e| PlatenError::CacheIo {
                path: source.to_path_buf(),
                source: e,
            })?;
        staged.persist(&dest).map_err(|e| PlatenError::CacheIo {
            path: dest.clone(),
            source: e.error,
        })?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("<html><body>hi</body></html>");
        let b = fingerprint("<html><body>hi</body></html>");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_changes_with_one_character() {
        let a = fingerprint("<html><body>hi</body></html>");
        let b = fingerprint("<html><body>hI</body></html>");
        assert_ne!(a, b);
    }

    #[test]
    fn artifact_path_is_key_dot_pdf_under_root() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path()).unwrap();
        let path = cache.artifact_path("deadbeef");
        assert_eq!(path, dir.path().join("deadbeef.pdf"));
    }

    #[tokio::test]
    async fn lookup_misses_then_hits() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path()).unwrap();
        assert!(cache.lookup("deadbeef").await.is_none());

        std::fs::write(cache.artifact_path("deadbeef"), b"%PDF-").unwrap();
        assert_eq!(
            cache.lookup("deadbeef").await,
            Some(cache.artifact_path("deadbeef"))
        );
    }

    #[tokio::test]
    async fn store_is_a_noop_for_the_canonical_path() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path()).unwrap();
        let canonical = cache.artifact_path("k");
        std::fs::write(&canonical, b"%PDF-").unwrap();

        let stored = cache.store("k", &canonical).await.unwrap();
        assert_eq!(stored, canonical);
        assert_eq!(std::fs::read(&canonical).unwrap(), b"%PDF-");
    }

    #[tokio::test]
    async fn store_renames_a_scratch_file_inside_the_root() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path()).unwrap();
        let scratch = dir.path().join("scratch.tmp");
        std::fs::write(&scratch, b"%PDF-scratch").unwrap();

        let stored = cache.store("k", &scratch).await.unwrap();
        assert_eq!(stored, cache.artifact_path("k"));
        assert!(!scratch.exists(), "scratch must be renamed away");
        assert_eq!(std::fs::read(&stored).unwrap(), b"%PDF-scratch");
    }

    #[tokio::test]
    async fn store_copies_a_foreign_source_atomically() {
        let cache_dir = TempDir::new().unwrap();
        let other_dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(cache_dir.path()).unwrap();
        let foreign = other_dir.path().join("render.pdf");
        std::fs::write(&foreign, b"%PDF-foreign").unwrap();

        let stored = cache.store("k", &foreign).await.unwrap();
        assert_eq!(std::fs::read(&stored).unwrap(), b"%PDF-foreign");
        assert!(foreign.exists(), "foreign source is copied, not moved");
    }

    #[tokio::test]
    async fn store_overwrites_with_identical_content() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path()).unwrap();
        for _ in 0..2 {
            let scratch = dir.path().join("s.tmp");
            std::fs::write(&scratch, b"%PDF-same").unwrap();
            cache.store("k", &scratch).await.unwrap();
        }
        assert_eq!(
            std::fs::read(cache.artifact_path("k")).unwrap(),
            b"%PDF-same"
        );
    }
}
