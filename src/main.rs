//! Signal enricher binary entrypoint.
//! Loads raw search results, dedupes them, and annotates the survivors with the
//! configured language model, checkpointing to the output file after every record.
//!
//! Environment:
//!   ENRICH_INPUT   JSON array of records (default `results/search_results.json`)
//!   ENRICH_OUTPUT  checkpoint/output file (default `<input stem>_analysed.json`);
//!                  when it already exists the run resumes from it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use signal_enricher::annotate::build_annotator;
use signal_enricher::config::{load_system_prompt, EnrichmentConfig};
use signal_enricher::record::records_from_json;
use signal_enricher::sink::JsonFileSink;
use signal_enricher::telemetry::init_tracing;
use signal_enricher::{cancel_pair, dedupe_with_stats, run_annotation};

const DEFAULT_INPUT: &str = "results/search_results.json";

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("results");
    input.with_file_name(format!("{stem}_analysed.json"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = EnrichmentConfig::load_default()?;

    let input = std::env::var("ENRICH_INPUT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_INPUT));
    let output = std::env::var("ENRICH_OUTPUT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_output(&input));
    let sink = JsonFileSink::new(&output);

    let records = match sink.load_existing().await? {
        Some(existing) => {
            info!(path = %output.display(), rows = existing.len(), "resuming from checkpoint");
            existing
        }
        None => {
            let raw = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("reading {}", input.display()))?;
            let raw = records_from_json(&raw)
                .with_context(|| format!("parsing {}", input.display()))?;
            let (deduped, _stats) = dedupe_with_stats(
                raw,
                cfg.dedup.title_threshold,
                cfg.dedup.description_threshold,
            );
            deduped
        }
    };

    let system_prompt = load_system_prompt(&cfg.annotation.system_prompt_path)?;
    let annotator = build_annotator(&cfg.provider, cfg.annotation.request_timeout())?;

    let mut annotation = cfg.annotation.clone();
    if annotation.credentials.is_empty() && annotator.name() == "mock" {
        annotation.credentials.push("mock".to_string());
    }

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, finishing in-flight records");
            handle.cancel();
        }
    });

    let run = run_annotation(records, &annotation, &system_prompt, annotator, &sink, signal).await?;
    info!(
        path = %output.display(),
        succeeded = run.report.succeeded,
        too_short = run.report.too_short,
        already_annotated = run.report.already_annotated,
        failed = run.report.failed,
        cancelled = run.report.cancelled,
        "enrichment finished"
    );
    Ok(())
}
