//! # platen
//!
//! Render HTML and CSS documents to PDF through a pooled headless-browser
//! backend, with a content-addressed cache so byte-identical submissions are
//! never rendered twice.
//!
//! ## Why this crate?
//!
//! Spinning up a browser per request is the naive design and it falls over
//! immediately: a headless Chrome costs hundreds of milliseconds and tens of
//! megabytes to start. platen instead keeps a bounded pool of pre-configured
//! renderer sessions (scripts disabled, images/fonts/media aborted — a
//! deliberate latency/fidelity tradeoff for print output), heals sessions
//! that go bad, and addresses finished artifacts by the SHA-256 of their
//! merged source so repeat submissions are a file-existence check.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file set
//!  │
//!  ├─ 1. Input   read + classify markup vs stylesheet by extension
//!  ├─ 2. Merge   one self-contained document (head-inline / wrapper)
//!  ├─ 3. Key     SHA-256 fingerprint of the merged bytes
//!  ├─ 4. Cache   hit → return the existing artifact path
//!  ├─ 5. Render  miss → lease a pooled browser tab, print to PDF
//!  └─ 6. Store   stage + atomic rename under <cache>/<key>.pdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use platen::{Converter, ConverterConfig, InputFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConverterConfig::builder()
//!         .pool_capacity(8)
//!         .cache_dir("pdf-cache")
//!         .build()?;
//!
//!     let converter = Converter::new(config).await?;
//!     converter.init().await; // pre-warm the pool
//!
//!     let files = [
//!         InputFile::from_path("report.html"),
//!         InputFile::from_path("theme.css"),
//!     ];
//!     let result = converter.convert(&files).await?;
//!     println!("{} (cached: {})", result.artifact_path.display(), result.cached);
//!
//!     converter.shutdown().await; // wire this to process termination
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `platen` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! platen = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod pool;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{fingerprint, ArtifactCache};
pub use config::{ConverterConfig, ConverterConfigBuilder};
pub use convert::{Conversion, Converter};
pub use error::PlatenError;
pub use pipeline::input::{cleanup_uploads, InputFile};
pub use pipeline::merge::merge_document;
pub use pipeline::render::{ChromeBackend, RenderBackend, RenderSession};
pub use pool::{Lease, PoolStats, RendererPool};
