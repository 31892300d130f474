// tests/pipeline_e2e.rs
//
// Dedupe + annotate into a JSON checkpoint, then resume from that checkpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use signal_enricher::annotate::FixedAnnotator;
use signal_enricher::config::EnrichmentConfig;
use signal_enricher::record::{Record, STATUS_KEY};
use signal_enricher::sink::JsonFileSink;
use signal_enricher::{
    enrich, run_annotation, AnnotationError, Annotator, CancelSignal, PipelineError,
};

/// Delegates to [`FixedAnnotator`] and counts calls.
#[derive(Default)]
struct CountingAnnotator {
    inner: FixedAnnotator,
    calls: AtomicUsize,
}

#[async_trait]
impl Annotator for CountingAnnotator {
    async fn annotate(
        &self,
        system_prompt: &str,
        user_text: &str,
        credential: &str,
    ) -> Result<String, AnnotationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.annotate(system_prompt, user_text, credential).await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

fn config() -> EnrichmentConfig {
    let mut cfg = EnrichmentConfig::default();
    cfg.annotation.credentials = vec!["local".to_string()];
    cfg.annotation.min_text_length = 40;
    cfg.annotation.base_backoff_secs = 0.0;
    cfg
}

fn raw_results() -> Vec<Record> {
    let acme = "Acme Corp closed a five million dollar seed round led by Northwind Ventures.";
    vec![
        Record::new("Acme raises $5M seed round", acme).with_attr("link", "https://a.example/1"),
        Record::new("Acme raises $5M seed round", acme).with_attr("link", "https://a.example/1"),
        Record::new(
            "Beta opens Berlin office",
            "Beta Logistics is opening a new engineering office in Berlin next quarter.",
        ),
        Record::new("Gamma update", "short text"),
    ]
}

#[tokio::test]
async fn enrich_writes_checkpoint_and_resume_skips_done_rows() {
    let dir = tempfile::tempdir().unwrap();
    let sink = JsonFileSink::new(dir.path().join("search_results_analysed.json"));
    let cfg = config();

    let first = Arc::new(CountingAnnotator::default());
    let (stats, run) = enrich(
        raw_results(),
        &cfg,
        "You qualify sales signals.",
        first.clone(),
        &sink,
        CancelSignal::never(),
    )
    .await
    .unwrap();

    assert_eq!(stats.input, 4);
    assert_eq!(stats.exact_removed, 1);
    assert_eq!(stats.kept, 3);
    assert_eq!(run.report.succeeded, 2);
    assert_eq!(run.report.too_short, 1);
    assert_eq!(first.calls.load(Ordering::SeqCst), 2);

    let on_disk = sink.load_existing().await.unwrap().expect("checkpoint written");
    assert_eq!(on_disk, run.records);
    let acme = on_disk
        .iter()
        .find(|r| r.title.starts_with("Acme"))
        .unwrap();
    assert!(acme.has_analysis());
    assert_eq!(acme.attrs["signal_fit"], serde_json::json!(false));
    assert_eq!(acme.attr_str("link"), Some("https://a.example/1"));

    let second = Arc::new(CountingAnnotator::default());
    let resumed = run_annotation(
        on_disk,
        &cfg.annotation,
        "You qualify sales signals.",
        second.clone(),
        &sink,
        CancelSignal::never(),
    )
    .await
    .unwrap();

    assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    assert_eq!(resumed.report.already_annotated, 2);
    assert_eq!(resumed.report.too_short, 1);
    let gamma = resumed
        .records
        .iter()
        .find(|r| r.title == "Gamma update")
        .unwrap();
    assert_eq!(gamma.attr_str(STATUS_KEY), Some("too_short"));
}

#[tokio::test]
async fn run_without_credentials_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let sink = JsonFileSink::new(dir.path().join("out.json"));
    let mut cfg = config();
    cfg.annotation.credentials.clear();

    let err = enrich(
        raw_results(),
        &cfg,
        "prompt",
        Arc::new(FixedAnnotator::default()),
        &sink,
        CancelSignal::never(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::Config(_)), "{err}");
    assert!(sink.load_existing().await.unwrap().is_none());
}
