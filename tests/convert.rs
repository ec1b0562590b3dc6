//! Integration tests for the conversion orchestrator.
//!
//! A mock render backend stands in for the headless browser, so the suite
//! runs anywhere — no Chrome required. The mock records spawn/close/live
//! counters and the last document it rendered, which is enough to pin down
//! every orchestration property: caching, capacity, self-healing, and
//! failure isolation.

use async_trait::async_trait;
use platen::{
    fingerprint, merge_document, Conversion, Converter, ConverterConfig, InputFile, PlatenError,
    RenderBackend, RenderSession,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Mock backend ─────────────────────────────────────────────────────────

#[derive(Default)]
struct MockState {
    live: AtomicUsize,
    peak: AtomicUsize,
    spawned: AtomicUsize,
    closed: AtomicUsize,
    renders: AtomicUsize,
    fail_reset: AtomicBool,
    /// Documents containing this marker fail to render.
    poison_marker: Mutex<Option<String>>,
    last_document: Mutex<Option<String>>,
}

struct MockBackend {
    state: Arc<MockState>,
    render_delay: Duration,
}

impl MockBackend {
    fn new(state: Arc<MockState>) -> Self {
        Self {
            state,
            render_delay: Duration::ZERO,
        }
    }
}

struct MockSession {
    state: Arc<MockState>,
    render_delay: Duration,
}

#[async_trait]
impl RenderBackend for MockBackend {
    async fn spawn_session(&self) -> Result<Box<dyn RenderSession>, PlatenError> {
        let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(live, Ordering::SeqCst);
        self.state.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            render_delay: self.render_delay,
        }))
    }

    async fn shutdown(&self) {}
}

#[async_trait]
impl RenderSession for MockSession {
    async fn render(&self, document: &str, _timeout: Duration) -> Result<Vec<u8>, PlatenError> {
        if self.render_delay > Duration::ZERO {
            tokio::time::sleep(self.render_delay).await;
        }
        let poisoned = self
            .state
            .poison_marker
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|marker| document.contains(marker));
        if poisoned {
            return Err(PlatenError::RenderFailed {
                detail: "simulated renderer crash".into(),
            });
        }
        self.state.renders.fetch_add(1, Ordering::SeqCst);
        *self.state.last_document.lock().unwrap() = Some(document.to_owned());
        Ok(format!("%PDF-1.7 mock ({} source bytes)", document.len()).into_bytes())
    }

    async fn reset(&self) -> Result<(), PlatenError> {
        if self.state.fail_reset.load(Ordering::SeqCst) {
            Err(PlatenError::RenderFailed {
                detail: "simulated reset failure".into(),
            })
        } else {
            Ok(())
        }
    }

    async fn close(&self) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    converter: Converter,
    state: Arc<MockState>,
    uploads: TempDir,
    _cache: TempDir,
}

async fn harness(capacity: usize) -> Harness {
    harness_with_delay(capacity, Duration::ZERO).await
}

async fn harness_with_delay(capacity: usize, render_delay: Duration) -> Harness {
    let state = Arc::new(MockState::default());
    let cache = TempDir::new().unwrap();
    let mut backend = MockBackend::new(Arc::clone(&state));
    backend.render_delay = render_delay;

    let config = ConverterConfig::builder()
        .pool_capacity(capacity)
        .warm_start(0)
        .acquire_timeout_secs(5)
        .cache_dir(cache.path())
        .backend(Arc::new(backend))
        .build()
        .unwrap();

    Harness {
        converter: Converter::new(config).await.unwrap(),
        state,
        uploads: TempDir::new().unwrap(),
        _cache: cache,
    }
}

impl Harness {
    fn file(&self, name: &str, content: &str) -> InputFile {
        let path = self.uploads.path().join(name);
        std::fs::write(&path, content).unwrap();
        InputFile::new(name, path)
    }
}

// ── Caching & fingerprinting ─────────────────────────────────────────────

#[tokio::test]
async fn second_identical_conversion_is_a_cache_hit() {
    let h = harness(2).await;
    let files = [
        h.file("page.html", "<html><body><p>hi</p></body></html>"),
        h.file("theme.css", "p{color:teal}"),
    ];

    let first = h.converter.convert(&files).await.unwrap();
    assert!(!first.cached);
    assert!(first.artifact_path.exists());
    let bytes = std::fs::read(&first.artifact_path).unwrap();

    let second = h.converter.convert(&files).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.key, first.key);
    assert_eq!(second.artifact_path, first.artifact_path);
    assert_eq!(std::fs::read(&second.artifact_path).unwrap(), bytes);

    // The hit never touched a renderer.
    assert_eq!(h.state.renders.load(Ordering::SeqCst), 1);
    assert_eq!(h.state.spawned.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_changed_character_changes_the_key() {
    let h = harness(2).await;
    let a = h.converter.convert(&[h.file("a.html", "<p>hello</p>")]).await.unwrap();
    let b = h.converter.convert(&[h.file("b.html", "<p>hellp</p>")]).await.unwrap();
    assert_ne!(a.key, b.key);
    assert_ne!(a.artifact_path, b.artifact_path);
}

#[tokio::test]
async fn key_is_the_fingerprint_of_the_merged_document() {
    let h = harness(1).await;
    let files = [
        h.file("page.html", "<html><head></head><body>x</body></html>"),
        h.file("s.css", "body{margin:0}"),
    ];
    let result = h.converter.convert(&files).await.unwrap();

    let merged = merge_document(
        "<html><head></head><body>x</body></html>",
        "body{margin:0}",
    )
    .unwrap();
    assert_eq!(result.key, fingerprint(&merged));
    assert_eq!(
        result.artifact_path,
        h.converter.cache().artifact_path(&result.key)
    );
}

// ── Normalization ────────────────────────────────────────────────────────

#[tokio::test]
async fn stylesheet_only_input_still_yields_an_artifact() {
    let h = harness(1).await;
    let result = h
        .converter
        .convert(&[h.file("only.css", "h1{font-size:42px}")])
        .await
        .unwrap();

    assert!(!result.cached);
    assert!(std::fs::metadata(&result.artifact_path).unwrap().len() > 0);

    let document = h.state.last_document.lock().unwrap().clone().unwrap();
    assert!(document.contains("<style>h1{font-size:42px}</style>"));
    assert!(document.contains("<body>"));
}

#[tokio::test]
async fn stylesheet_is_inlined_before_the_head_close() {
    let h = harness(1).await;
    let files = [
        h.file("page.html", "<html><head><title>t</title></head><body>b</body></html>"),
        h.file("s.css", "b{font-weight:bold}"),
    ];
    h.converter.convert(&files).await.unwrap();

    let document = h.state.last_document.lock().unwrap().clone().unwrap();
    assert!(document.contains("<style>b{font-weight:bold}</style></head>"));
}

#[tokio::test]
async fn stylesheet_is_prepended_when_markup_has_no_head() {
    let h = harness(1).await;
    let files = [
        h.file("frag.html", "<p>fragment</p>"),
        h.file("s.css", "p{margin:0}"),
    ];
    h.converter.convert(&files).await.unwrap();

    let document = h.state.last_document.lock().unwrap().clone().unwrap();
    assert!(document.starts_with("<style>p{margin:0}</style><p>fragment</p>"));
}

#[tokio::test]
async fn whitespace_only_input_is_rejected_without_consuming_a_lease() {
    let h = harness(2).await;
    let files = [h.file("blank.html", "   \n"), h.file("blank.css", "\t")];

    let err = h.converter.convert(&files).await.unwrap_err();
    assert!(matches!(err, PlatenError::EmptyInput));
    assert_eq!(h.state.spawned.load(Ordering::SeqCst), 0);
}

// ── Concurrency ──────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_load_never_exceeds_pool_capacity() {
    let h = Arc::new(harness_with_delay(4, Duration::from_millis(10)).await);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let h = Arc::clone(&h);
        let file = h.file(&format!("doc{i}.html"), &format!("<p>document {i}</p>"));
        tasks.push(tokio::spawn(async move { h.converter.convert(&[file]).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let peak = h.state.peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak live sessions {peak} exceeded capacity 4");
    assert_eq!(h.state.renders.load(Ordering::SeqCst), 16);
}

// ── Self-healing & failure isolation ─────────────────────────────────────

#[tokio::test]
async fn reset_failure_is_invisible_and_heals_the_pool() {
    let h = harness(2).await;
    h.state.fail_reset.store(true, Ordering::SeqCst);

    // The conversion itself succeeds; the sick session is replaced behind
    // the scenes.
    let result = h.converter.convert(&[h.file("a.html", "<p>a</p>")]).await.unwrap();
    assert!(!result.cached);
    assert_eq!(h.state.closed.load(Ordering::SeqCst), 1);
    assert_eq!(h.state.spawned.load(Ordering::SeqCst), 2, "exactly one replacement");
    assert_eq!(h.converter.pool().stats().live, 1, "no net capacity change");

    h.state.fail_reset.store(false, Ordering::SeqCst);
    let again = h.converter.convert(&[h.file("b.html", "<p>b</p>")]).await.unwrap();
    assert!(!again.cached);
}

#[tokio::test]
async fn render_failure_leaves_no_cache_entry_and_destroys_the_lease() {
    let h = harness(2).await;
    *h.state.poison_marker.lock().unwrap() = Some("EXPLODE".into());

    let markup = "<p>EXPLODE</p>";
    let err = h
        .converter
        .convert(&[h.file("bad.html", markup)])
        .await
        .unwrap_err();
    assert!(matches!(err, PlatenError::RenderFailed { .. }));

    // No artifact for that fingerprint.
    let key = fingerprint(&merge_document(markup, "").unwrap());
    assert!(h.converter.cache().lookup(&key).await.is_none());

    // The lease was destroyed and replaced, never parked dirty.
    assert_eq!(h.state.closed.load(Ordering::SeqCst), 1);
    assert_eq!(h.state.spawned.load(Ordering::SeqCst), 2);

    // Later requests are unaffected — including the same fingerprint once
    // the renderer behaves again.
    *h.state.poison_marker.lock().unwrap() = None;
    let ok = h.converter.convert(&[h.file("bad2.html", markup)]).await.unwrap();
    assert!(!ok.cached);
    assert!(h.converter.cache().lookup(&key).await.is_some());
}

// ── Lifecycle ────────────────────────────────────────────────────────────

#[tokio::test]
async fn convert_after_shutdown_fails_with_pool_closed() {
    let h = harness(1).await;
    h.converter.shutdown().await;

    let err = h
        .converter
        .convert(&[h.file("late.html", "<p>late</p>")])
        .await
        .unwrap_err();
    assert!(matches!(err, PlatenError::PoolClosed));
}

#[tokio::test]
async fn shutdown_closes_idle_sessions() {
    let h = harness(3).await;
    h.converter.init().await; // warm_start is 0, no-op but exercised
    h.converter.convert(&[h.file("a.html", "<p>a</p>")]).await.unwrap();
    assert_eq!(h.state.live.load(Ordering::SeqCst), 1);

    h.converter.shutdown().await;
    assert_eq!(h.state.live.load(Ordering::SeqCst), 0);
}

// ── Result descriptor ────────────────────────────────────────────────────

#[tokio::test]
async fn conversion_descriptor_serializes_for_the_response_layer() {
    let h = harness(1).await;
    let result = h.converter.convert(&[h.file("a.html", "<p>a</p>")]).await.unwrap();

    let json = serde_json::to_string(&result).unwrap();
    let back: Conversion = serde_json::from_str(&json).unwrap();
    assert_eq!(back.key, result.key);
    assert_eq!(
        back.artifact_url("http://localhost/pdf-cache"),
        format!("http://localhost/pdf-cache/{}.pdf", result.key)
    );
}
