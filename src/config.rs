//! Configuration for the conversion core.
//!
//! Every knob lives in one [`ConverterConfig`] built through its builder, so
//! a config can be shared, logged, and diffed between deployments. The
//! defaults suit a mid-sized conversion service: a pool of 20 renderers,
//! 3 of them pre-warmed, and a 5-second content-load budget per render.

use crate::error::PlatenError;
use crate::pipeline::render::RenderBackend;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a [`crate::convert::Converter`].
///
/// Built via [`ConverterConfig::builder()`] or [`ConverterConfig::default()`].
///
/// # Example
/// ```rust
/// use platen::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .pool_capacity(8)
///     .warm_start(2)
///     .cache_dir("artifacts")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConverterConfig {
    /// Maximum number of concurrently live renderer sessions. Default: 20.
    ///
    /// This is the hard parallelism ceiling for rendering: requests beyond it
    /// suspend on acquire until a lease frees. Each session is a browser tab,
    /// so the practical limit is memory, not CPU.
    pub pool_capacity: usize,

    /// Sessions created eagerly by `init()` to cut first-request latency.
    /// Default: 3. Clamped to `pool_capacity` at build time.
    pub warm_start: usize,

    /// Content-load budget per render, in seconds. Default: 5.
    ///
    /// Structural parse completion is accepted as "loaded" — with scripts
    /// disabled and images/fonts/media aborted, waiting longer buys nothing.
    pub load_timeout_secs: u64,

    /// Bound on how long an acquire may wait for a free lease, in seconds.
    /// Default: 30.
    ///
    /// Without a bound, a single hung renderer could park callers forever;
    /// the timeout converts that stall into a typed
    /// [`PlatenError::PoolStalled`].
    pub acquire_timeout_secs: u64,

    /// Directory holding cached artifacts, keyed by content fingerprint.
    /// Default: `pdf-cache`. Created on startup if absent.
    pub cache_dir: PathBuf,

    /// Explicit Chrome/Chromium binary path. If `None`, the browser is
    /// auto-discovered on `PATH` and in the usual install locations.
    pub browser_path: Option<PathBuf>,

    /// Pre-constructed render backend. Takes precedence over launching a
    /// browser; used by tests and by embedders with custom renderers.
    pub backend: Option<Arc<dyn RenderBackend>>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 20,
            warm_start: 3,
            load_timeout_secs: 5,
            acquire_timeout_secs: 30,
            cache_dir: PathBuf::from("pdf-cache"),
            browser_path: None,
            backend: None,
        }
    }
}

impl fmt::Debug for ConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterConfig")
            .field("pool_capacity", &self.pool_capacity)
            .field("warm_start", &self.warm_start)
            .field("load_timeout_secs", &self.load_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("cache_dir", &self.cache_dir)
            .field("browser_path", &self.browser_path)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn RenderBackend>"))
            .finish()
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn pool_capacity(mut self, n: usize) -> Self {
        self.config.pool_capacity = n.max(1);
        self
    }

    pub fn warm_start(mut self, n: usize) -> Self {
        self.config.warm_start = n;
        self
    }

    pub fn load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.load_timeout_secs = secs.max(1);
        self
    }

    pub fn acquire_timeout_secs(mut self, secs: u64) -> Self {
        self.config.acquire_timeout_secs = secs.max(1);
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn browser_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_path = Some(path.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn RenderBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ConverterConfig, PlatenError> {
        if self.config.pool_capacity == 0 {
            return Err(PlatenError::InvalidConfig(
                "pool capacity must be ≥ 1".into(),
            ));
        }
        // Warming more sessions than the pool can hold is a config mistake,
        // not an error worth failing startup over.
        self.config.warm_start = self.config.warm_start.min(self.config.pool_capacity);
        Ok(self.config)
    }
}
