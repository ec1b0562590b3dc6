//! Error types for the platen library.
//!
//! Two classes of failure exist and only one of them is visible here:
//!
//! * **Propagated** — the conversion cannot produce an artifact (unusable
//!   input, renderer crash, cache I/O failure). These surface as
//!   `Err(PlatenError)` from [`crate::convert::Converter::convert`].
//!
//! * **Recovered** — pool-health faults (a session that fails its blank-page
//!   reset, a replacement that fails to spawn). The pool heals itself by
//!   destroying and replacing the session under the same lease slot; the
//!   caller never sees these, they are only logged.
//!
//! There is no automatic retry beyond the pool's self-heal: a render that
//! fails is reported once, with the lease destroyed so the next request gets
//! a fresh renderer.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the platen library.
#[derive(Debug, Error)]
pub enum PlatenError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Neither markup nor stylesheet content remained after classification.
    #[error("no usable content: every submitted file was empty after trimming whitespace")]
    EmptyInput,

    /// An uploaded file could not be read from disk.
    #[error("failed to read input file '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Renderer errors ───────────────────────────────────────────────────
    /// The headless browser process could not be started.
    #[error("failed to launch the headless browser: {detail}\nSet --browser-path if Chrome/Chromium is installed in a non-standard location.")]
    BrowserLaunch { detail: String },

    /// A new renderer session could not be created for a lease.
    #[error("failed to spawn a renderer session: {detail}")]
    SessionSpawn { detail: String },

    /// No lease became available within the acquire timeout.
    #[error("no renderer lease became available within {waited_secs}s\nThe pool may be saturated or a renderer may be hung; raise the capacity or the acquire timeout.")]
    PoolStalled { waited_secs: u64 },

    /// The pool was shut down while the request was in flight.
    #[error("the renderer pool has been shut down")]
    PoolClosed,

    /// Navigation error, content-load timeout, or renderer crash.
    ///
    /// The lease used for this render is destroyed and replaced; it is never
    /// returned to the idle stack.
    #[error("rendering failed: {detail}")]
    RenderFailed { detail: String },

    // ── Cache errors ──────────────────────────────────────────────────────
    /// Artifact persistence failed.
    ///
    /// Artifacts are staged and renamed into place, so a failure here never
    /// leaves a partially-written file visible under its final key.
    #[error("cache I/O error at '{path}': {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}
