// src/pipeline.rs
//! Top-level entry points: dedupe, then annotate under one run's limiter and key pool.

use std::sync::Arc;

use tracing::info;

use crate::annotate::DynAnnotator;
use crate::cancel::CancelSignal;
use crate::config::{AnnotationConfig, EnrichmentConfig};
use crate::dedup::{dedupe_with_stats, DedupStats};
use crate::error::PipelineError;
use crate::keys::KeyPool;
use crate::ratelimit::TokenBucket;
use crate::record::Record;
use crate::scheduler::{AnnotationScheduler, RunReport, SchedulerSettings, TaskId, TaskOutcome};
use crate::sink::RecordSink;

#[derive(Debug)]
pub struct AnnotationRun {
    pub records: Vec<Record>,
    pub outcomes: Vec<(TaskId, TaskOutcome)>,
    pub report: RunReport,
}

impl From<&AnnotationConfig> for SchedulerSettings {
    fn from(c: &AnnotationConfig) -> Self {
        Self {
            max_concurrency: c.max_concurrency,
            min_text_length: c.min_text_length,
            max_text_length: c.max_text_length,
            user_template: c.user_template.clone(),
            call_timeout: c.request_timeout(),
            grace_period: c.grace_period(),
        }
    }
}

/// Annotate `records` (possibly partially annotated already). The token bucket and the
/// key pool are created here and live exactly as long as this run.
pub async fn run_annotation(
    mut records: Vec<Record>,
    config: &AnnotationConfig,
    system_prompt: &str,
    annotator: DynAnnotator,
    sink: &dyn RecordSink,
    cancel: CancelSignal,
) -> Result<AnnotationRun, PipelineError> {
    let pool = KeyPool::new(config.credentials.iter().cloned())
        .map_err(|_| PipelineError::Config("no credentials configured".to_string()))?;
    let limiter = TokenBucket::per_period(config.rate_limit, config.period());
    info!(
        target: "scheduler",
        credentials = pool.len(),
        rate_limit = config.rate_limit,
        period_secs = config.period_secs,
        "limiter and key pool ready"
    );

    let scheduler = AnnotationScheduler::new(
        annotator,
        Arc::new(limiter),
        Arc::new(pool),
        config.retry_policy(),
        system_prompt,
        SchedulerSettings::from(config),
    );
    let outcomes = scheduler.run(&mut records, sink, cancel).await?;
    let report = RunReport::from_outcomes(&outcomes);
    Ok(AnnotationRun {
        records,
        outcomes,
        report,
    })
}

/// Full enrichment: dedupe raw search results, then annotate the survivors.
pub async fn enrich(
    raw: Vec<Record>,
    config: &EnrichmentConfig,
    system_prompt: &str,
    annotator: DynAnnotator,
    sink: &dyn RecordSink,
    cancel: CancelSignal,
) -> Result<(DedupStats, AnnotationRun), PipelineError> {
    let (records, stats) = dedupe_with_stats(
        raw,
        config.dedup.title_threshold,
        config.dedup.description_threshold,
    );
    let run = run_annotation(records, &config.annotation, system_prompt, annotator, sink, cancel)
        .await?;
    Ok((stats, run))
}
