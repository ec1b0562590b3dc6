//! The conversion orchestrator: normalize → fingerprint → cache → render.
//!
//! One [`Converter`] owns the pool and the cache for the whole process —
//! constructed once at startup, injected wherever conversions are served,
//! shut down once at termination. No ambient globals.
//!
//! ## Failure isolation
//!
//! A render failure surrenders the lease through [`RendererPool::close`]
//! (the session is destroyed and replaced, never reused) and leaves no cache
//! entry for the fingerprint, so a later identical request re-renders on a
//! fresh session. A persistence failure after a successful render releases
//! the lease normally — the renderer is healthy, only the disk write failed.

use crate::cache::{fingerprint, ArtifactCache, ARTIFACT_EXT};
use crate::config::ConverterConfig;
use crate::error::PlatenError;
use crate::pipeline::render::{ChromeBackend, RenderBackend};
use crate::pipeline::{input, input::InputFile, merge};
use crate::pool::RendererPool;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result descriptor for one conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    /// `true` when the artifact was served from the cache without touching
    /// the pool.
    pub cached: bool,
    /// Content fingerprint of the merged document; the cache key.
    pub key: String,
    /// Canonical artifact location: `<cache-root>/<key>.pdf`.
    pub artifact_path: PathBuf,
    /// Wall-clock time for this request.
    pub elapsed_ms: u64,
}

impl Conversion {
    /// Download URL for the artifact when the cache root is served at `base`.
    pub fn artifact_url(&self, base: &str) -> String {
        format!("{}/{}.{ARTIFACT_EXT}", base.trim_end_matches('/'), self.key)
    }
}

/// Owns the renderer pool and artifact cache; drives conversions.
pub struct Converter {
    pool: RendererPool,
    cache: ArtifactCache,
    load_timeout: Duration,
}

impl Converter {
    /// Build the converter: launch (or accept) the render backend, open the
    /// cache directory, and size the pool.
    ///
    /// Call [`Converter::init`] before serving to pre-warm the pool, and
    /// [`Converter::shutdown`] exactly once at process termination — wire
    /// both to the host's lifecycle so renderer subprocesses never leak.
    pub async fn new(config: ConverterConfig) -> Result<Self, PlatenError> {
        let backend: Arc<dyn RenderBackend> = match config.backend.clone() {
            Some(backend) => backend,
            None => Arc::new(ChromeBackend::launch(&config).await?),
        };
        let cache = ArtifactCache::new(&config.cache_dir)?;
        let pool = RendererPool::new(backend, &config);
        Ok(Self {
            pool,
            cache,
            load_timeout: Duration::from_secs(config.load_timeout_secs),
        })
    }

    /// Pre-warm the pool. Failures are logged and non-fatal.
    pub async fn init(&self) {
        self.pool.init().await;
    }

    /// Tear down every renderer resource.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    pub fn pool(&self) -> &RendererPool {
        &self.pool
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Convert an uploaded file set into a PDF artifact.
    ///
    /// Cleanup of the ephemeral upload files is the caller's job, after the
    /// result has been delivered (see
    /// [`crate::pipeline::input::cleanup_uploads`]).
    pub async fn convert(&self, files: &[InputFile]) -> Result<Conversion, PlatenError> {
        let start = Instant::now();

        let (markup, styles) = input::read_and_partition(files).await?;
        let document = merge::merge_document(&markup, &styles)?;
        let key = fingerprint(&document);

        if let Some(artifact_path) = self.cache.lookup(&key).await {
            debug!("cache hit for {key}");
            return Ok(Conversion {
                cached: true,
                key,
                artifact_path,
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        let lease = self.pool.acquire().await?;
        let pdf = match lease.session().render(&document, self.load_timeout).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("render failed for {key}: {err}; destroying lease {}", lease.slot());
                self.pool.close(lease).await;
                return Err(err);
            }
        };

        // The render succeeded, so the lease goes back regardless of whether
        // the disk write below cooperates.
        let stored = self.persist(&key, &pdf).await;
        self.pool.release(lease).await;
        let artifact_path = stored?;

        info!(
            "rendered {key} ({} bytes) in {}ms",
            pdf.len(),
            start.elapsed().as_millis()
        );
        Ok(Conversion {
            cached: false,
            key,
            artifact_path,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Write the PDF bytes to a scratch file inside the cache root, then let
    /// the cache rename it into place — the artifact is never observable
    /// half-written, and no second copy of the bytes is made.
    async fn persist(&self, key: &str, pdf: &[u8]) -> Result<PathBuf, PlatenError> {
        let mut scratch =
            tempfile::NamedTempFile::new_in(self.cache.root()).map_err(|e| PlatenError::CacheIo {
                path: self.cache.root().to_path_buf(),
                source: e,
            })?;
        scratch.write_all(pdf).map_err(|e| PlatenError::CacheIo {
            path: scratch.path().to_path_buf(),
            source: e,
        })?;

        let scratch = scratch.into_temp_path();
        let dest = self.cache.store(key, &scratch).await?;
        // The rename already moved the file; keep() just stops the temp
        // guard from unlinking the vacated path.
        let _ = scratch.keep();
        Ok(dest)
    }
}
