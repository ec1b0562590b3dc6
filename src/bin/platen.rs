//! CLI binary for platen.
//!
//! A thin shim over the library crate: maps flags to [`ConverterConfig`],
//! converts one file set, and prints the artifact path (or JSON). Shows the
//! intended lifecycle wiring — `init` before the first conversion, `shutdown`
//! exactly once on the way out, including on Ctrl-C, so no browser
//! subprocess outlives the tool.

use anyhow::{Context, Result};
use clap::Parser;
use platen::{Converter, ConverterConfig, InputFile};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a page with its stylesheet
  platen report.html theme.css

  # Stylesheet-only preview
  platen theme.css

  # JSON result descriptor, custom cache location
  platen --json --cache-dir /var/cache/platen report.html

  # Print the download URL for a cache directory served over HTTP
  platen --base-url http://localhost:3000/pdf-cache report.html

FILE CLASSIFICATION:
  *.css            stylesheet (inlined into the document head)
  everything else  markup, concatenated in argument order

The artifact lands at <cache-dir>/<sha256-of-merged-document>.pdf; repeat
conversions of byte-identical input are served from the cache without
touching a renderer.
"#;

/// Render HTML and CSS files to a cached PDF artifact.
#[derive(Parser, Debug)]
#[command(
    name = "platen",
    version,
    about = "Render HTML and CSS files to a cached PDF artifact",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files; `.css` files are treated as stylesheets.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Directory holding cached artifacts.
    #[arg(long, env = "PLATEN_CACHE_DIR", default_value = "pdf-cache")]
    cache_dir: PathBuf,

    /// Maximum concurrently live renderer sessions.
    #[arg(long, env = "PLATEN_CAPACITY", default_value_t = 20)]
    capacity: usize,

    /// Sessions pre-created before the first conversion.
    #[arg(long, env = "PLATEN_WARM_START", default_value_t = 1)]
    warm_start: usize,

    /// Content-load budget per render, in seconds.
    #[arg(long, env = "PLATEN_LOAD_TIMEOUT", default_value_t = 5)]
    load_timeout: u64,

    /// Bound on waiting for a free renderer lease, in seconds.
    #[arg(long, env = "PLATEN_ACQUIRE_TIMEOUT", default_value_t = 30)]
    acquire_timeout: u64,

    /// Explicit Chrome/Chromium binary path.
    #[arg(long, env = "PLATEN_BROWSER_PATH")]
    browser_path: Option<PathBuf>,

    /// Print the result descriptor as JSON instead of a path.
    #[arg(long, env = "PLATEN_JSON")]
    json: bool,

    /// Also print the artifact's download URL under this base.
    #[arg(long, env = "PLATEN_BASE_URL")]
    base_url: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PLATEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PLATEN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut builder = ConverterConfig::builder()
        .pool_capacity(cli.capacity)
        .warm_start(cli.warm_start)
        .load_timeout_secs(cli.load_timeout)
        .acquire_timeout_secs(cli.acquire_timeout)
        .cache_dir(&cli.cache_dir);
    if let Some(path) = &cli.browser_path {
        builder = builder.browser_path(path);
    }
    let config = builder.build().context("invalid configuration")?;

    let converter = Converter::new(config)
        .await
        .context("could not start the renderer backend")?;
    converter.init().await;

    let files: Vec<InputFile> = cli.files.iter().map(InputFile::from_path).collect();

    // Shutdown must run exactly once on every exit path, Ctrl-C included —
    // a leaked headless browser survives the CLI otherwise.
    let outcome = tokio::select! {
        result = converter.convert(&files) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    converter.shutdown().await;

    let Some(result) = outcome else {
        eprintln!("interrupted");
        std::process::exit(130);
    };
    let conversion = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&conversion)?);
    } else {
        if !cli.quiet {
            eprintln!(
                "{} in {}ms",
                if conversion.cached { "cache hit" } else { "rendered" },
                conversion.elapsed_ms
            );
        }
        println!("{}", conversion.artifact_path.display());
        if let Some(base) = &cli.base_url {
            println!("{}", conversion.artifact_url(base));
        }
    }

    Ok(())
}
