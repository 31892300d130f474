// src/telemetry.rs
//! Tracing subscriber setup and metric descriptions.

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log targets used across the crate, at info; everything else at warn.
pub const DEFAULT_LOG_FILTER: &str =
    "signal_enricher=info,dedup=info,scheduler=info,keys=info,annotate=info,config=info,warn";

/// One-time metrics registration (so series carry help text once a recorder is installed).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "dedup_exact_removed_total",
            "Records dropped as verbatim (title, description) duplicates."
        );
        describe_counter!(
            "dedup_fuzzy_removed_total",
            "Records dropped as near duplicates."
        );
        describe_counter!(
            "annotation_outcomes_total",
            "Annotation task outcomes by label."
        );
        describe_counter!(
            "annotation_retries_total",
            "Retries after retryable annotation failures."
        );
        describe_counter!(
            "annotation_credentials_retired_total",
            "Credentials removed from the rotation pool."
        );
        describe_histogram!(
            "ratelimit_wait_ms",
            "Time spent waiting for a rate-limit token, in milliseconds."
        );
    });
}

/// Install the global subscriber.
///
/// Filter comes from `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`].
/// `ENRICH_LOG_JSON=1` switches to JSON lines. Calling twice is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var("ENRICH_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
