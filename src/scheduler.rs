// src/scheduler.rs
//! Concurrent, rate-limited annotation of records.
//!
//! Two orthogonal controls bound a run:
//! - a semaphore caps how many tasks are in flight (parallelism),
//! - the shared [`TokenBucket`] caps how many calls start per second (throughput).
//!
//! Per task the order is fixed: validate -> acquire token -> call -> write back -> persist.
//! Tasks complete in any order. After every completion the whole record set is handed to
//! the sink, so a crash loses at most the tasks that were still in flight.
//!
//! Failures stay local to their task and become outcomes. Only an exhausted credential
//! pool or a failing sink aborts the run.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::annotate::{parse_verdict, DynAnnotator};
use crate::cancel::CancelSignal;
use crate::error::{AnnotationError, PipelineError, PoolExhausted, RetryKind};
use crate::keys::KeyPool;
use crate::ratelimit::TokenBucket;
use crate::record::{anon_hash, clean_text, truncate_chars, Record, ANALYSIS_KEY, STATUS_KEY};
use crate::retry::RetryPolicy;
use crate::sink::RecordSink;
use crate::telemetry::ensure_metrics_described;

/// Position of the record in the run's input.
pub type TaskId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded { analysis: String, attempts: u32 },
    /// Text below the minimum length; the annotator was not called.
    TooShort { length: usize },
    /// The record already carried a non-empty analysis.
    AlreadyAnnotated,
    Failed { reason: String, attempts: u32 },
    /// Not started (or abandoned) because the run was cancelled.
    Cancelled,
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::TooShort { .. } => "too_short",
            Self::AlreadyAnnotated => "already_annotated",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
            _ => 0,
        }
    }
}

/// One record plus the text that will be sent for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationTask {
    pub id: TaskId,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_concurrency: usize,
    pub min_text_length: usize,
    pub max_text_length: usize,
    pub user_template: String,
    pub call_timeout: Duration,
    pub grace_period: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            min_text_length: 100,
            max_text_length: 2000,
            user_template: "{description}".to_string(),
            call_timeout: Duration::from_secs(120),
            grace_period: Duration::from_secs(30),
        }
    }
}

/// Tally of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: usize,
    pub too_short: usize,
    pub already_annotated: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub retries: u32,
}

impl RunReport {
    pub fn from_outcomes(outcomes: &[(TaskId, TaskOutcome)]) -> Self {
        let mut r = Self::default();
        for (_, o) in outcomes {
            match o {
                TaskOutcome::Succeeded { .. } => r.succeeded += 1,
                TaskOutcome::TooShort { .. } => r.too_short += 1,
                TaskOutcome::AlreadyAnnotated => r.already_annotated += 1,
                TaskOutcome::Failed { .. } => r.failed += 1,
                TaskOutcome::Cancelled => r.cancelled += 1,
            }
            r.retries += o.attempts().saturating_sub(1);
        }
        r
    }
}

/// Everything a spawned task needs; cheap to clone.
#[derive(Clone)]
struct Worker {
    annotator: DynAnnotator,
    limiter: Arc<TokenBucket>,
    pool: Arc<KeyPool>,
    policy: RetryPolicy,
    system_prompt: Arc<str>,
    call_timeout: Duration,
}

pub struct AnnotationScheduler {
    worker: Worker,
    settings: SchedulerSettings,
}

impl AnnotationScheduler {
    /// The limiter and pool are shared handles that live for the duration of the run.
    pub fn new(
        annotator: DynAnnotator,
        limiter: Arc<TokenBucket>,
        pool: Arc<KeyPool>,
        policy: RetryPolicy,
        system_prompt: impl Into<Arc<str>>,
        settings: SchedulerSettings,
    ) -> Self {
        let settings = SchedulerSettings {
            max_concurrency: settings.max_concurrency.max(1),
            ..settings
        };
        Self {
            worker: Worker {
                annotator,
                limiter,
                pool,
                policy,
                system_prompt: system_prompt.into(),
                call_timeout: settings.call_timeout,
            },
            settings,
        }
    }

    /// Decide whether `record` needs a call, and build its prompt text if so.
    pub fn prepare(&self, id: TaskId, record: &Record) -> Result<AnnotationTask, TaskOutcome> {
        if record.has_analysis() {
            return Err(TaskOutcome::AlreadyAnnotated);
        }
        let description = clean_text(&record.description);
        let length = description.chars().count();
        if length < self.settings.min_text_length {
            return Err(TaskOutcome::TooShort { length });
        }
        let description = truncate_chars(&description, self.settings.max_text_length);
        let text = render_template(
            &self.settings.user_template,
            &clean_text(&record.title),
            &description,
        );
        Ok(AnnotationTask { id, text })
    }

    /// Annotate `records` in place, checkpointing to `sink` after every completed task.
    ///
    /// Returns one outcome per record, ordered by position.
    pub async fn run(
        &self,
        records: &mut [Record],
        sink: &dyn RecordSink,
        cancel: CancelSignal,
    ) -> Result<Vec<(TaskId, TaskOutcome)>, PipelineError> {
        ensure_metrics_described();

        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; records.len()];
        let mut tasks = Vec::new();
        for (id, record) in records.iter().enumerate() {
            match self.prepare(id, record) {
                Ok(task) => tasks.push(task),
                Err(outcome) => outcomes[id] = Some(outcome),
            }
        }
        let skipped = records.len() - tasks.len();
        for (id, outcome) in outcomes.iter().enumerate() {
            if let Some(o) = outcome {
                write_back(&mut records[id], o);
                counter!("annotation_outcomes_total", "outcome" => o.label()).increment(1);
            }
        }
        if skipped > 0 {
            persist(sink, records).await?;
        }

        info!(
            target: "scheduler",
            total = records.len(),
            queued = tasks.len(),
            skipped,
            max_concurrency = self.settings.max_concurrency,
            annotator = self.worker.annotator.name(),
            "annotation run started"
        );

        let gate = Arc::new(Semaphore::new(self.settings.max_concurrency));
        let mut set = JoinSet::new();
        for task in tasks {
            let worker = self.worker.clone();
            let gate = Arc::clone(&gate);
            let cancel = cancel.clone();
            set.spawn(async move {
                let id = task.id;
                let Ok(_permit) = gate.acquire_owned().await else {
                    return (id, Ok(TaskOutcome::Cancelled));
                };
                if cancel.is_cancelled() {
                    return (id, Ok(TaskOutcome::Cancelled));
                }
                (id, worker.execute(task, &cancel).await)
            });
        }

        let mut cancel_watch = cancel.clone();
        let mut drain_deadline: Option<Instant> = None;
        loop {
            let next = match drain_deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(target: "scheduler", in_flight = set.len(), "grace period elapsed, abandoning in-flight tasks");
                        set.abort_all();
                        while set.join_next().await.is_some() {}
                        break;
                    }
                },
                None => tokio::select! {
                    next = set.join_next() => next,
                    _ = cancel_watch.cancelled() => {
                        info!(target: "scheduler", grace_ms = self.settings.grace_period.as_millis() as u64, "cancellation requested");
                        gate.close();
                        drain_deadline = Some(Instant::now() + self.settings.grace_period);
                        continue;
                    }
                },
            };

            let Some(joined) = next else { break };
            let (id, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    if !e.is_cancelled() {
                        warn!(target: "scheduler", error = %e, "annotation task panicked");
                    }
                    continue;
                }
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(PoolExhausted) => {
                    warn!(target: "scheduler", "credential pool exhausted, aborting run");
                    set.abort_all();
                    // keep what finished so far
                    persist(sink, records).await?;
                    return Err(PipelineError::PoolExhausted(PoolExhausted));
                }
            };

            log_outcome(id, &records[id], &outcome);
            counter!("annotation_outcomes_total", "outcome" => outcome.label()).increment(1);
            write_back(&mut records[id], &outcome);
            let checkpoint = !matches!(outcome, TaskOutcome::Cancelled);
            outcomes[id] = Some(outcome);
            if checkpoint {
                if let Err(e) = persist(sink, records).await {
                    set.abort_all();
                    return Err(e);
                }
            }
        }

        // Anything without an outcome was aborted or panicked.
        let cancelled = cancel.is_cancelled();
        let mut out = Vec::with_capacity(outcomes.len());
        for (id, slot) in outcomes.into_iter().enumerate() {
            let outcome = slot.unwrap_or_else(|| {
                let o = if cancelled {
                    TaskOutcome::Cancelled
                } else {
                    TaskOutcome::Failed {
                        reason: "task aborted".to_string(),
                        attempts: 0,
                    }
                };
                write_back(&mut records[id], &o);
                o
            });
            out.push((id, outcome));
        }
        persist(sink, records).await?;

        let report = RunReport::from_outcomes(&out);
        info!(
            target: "scheduler",
            succeeded = report.succeeded,
            too_short = report.too_short,
            already_annotated = report.already_annotated,
            failed = report.failed,
            cancelled = report.cancelled,
            retries = report.retries,
            "annotation run finished"
        );
        Ok(out)
    }
}

impl Worker {
    /// Call the annotator with retries. Only pool exhaustion escapes as an error.
    async fn execute(
        &self,
        task: AnnotationTask,
        cancel: &CancelSignal,
    ) -> Result<TaskOutcome, PoolExhausted> {
        let mut credential = self.pool.current()?;
        let mut attempts: u32 = 0;

        loop {
            self.limiter.acquire().await;

            let call = self
                .annotator
                .annotate(&self.system_prompt, &task.text, &credential);
            let result = match tokio::time::timeout(self.call_timeout, call).await {
                Ok(r) => r,
                Err(_) => Err(AnnotationError::transient("call timed out")),
            };

            match result {
                Ok(analysis) => {
                    attempts += 1;
                    return Ok(TaskOutcome::Succeeded { analysis, attempts });
                }
                Err(AnnotationError::KeyRejected(reason)) => {
                    // Does not consume an attempt; the pool shrinks every time.
                    warn!(target: "scheduler", task = task.id, %reason, "credential rejected, retiring");
                    self.pool.retire(&credential)?;
                    credential = self.pool.current()?;
                }
                Err(AnnotationError::Terminal(reason)) => {
                    attempts += 1;
                    return Ok(TaskOutcome::Failed { reason, attempts });
                }
                Err(AnnotationError::Retryable { kind, reason }) => {
                    attempts += 1;
                    if !self.policy.allows_retry_after(attempts) {
                        return Ok(TaskOutcome::Failed {
                            reason: format!("retries exhausted: {reason}"),
                            attempts,
                        });
                    }
                    counter!("annotation_retries_total").increment(1);
                    if kind == RetryKind::Quota {
                        credential = self.pool.rotate_from(&credential)?;
                    }
                    if cancel.is_cancelled() {
                        return Ok(TaskOutcome::Cancelled);
                    }
                    let delay = self.policy.backoff(attempts);
                    debug!(target: "scheduler", task = task.id, attempts, ?kind, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Substitute `{title}` and `{description}`.
pub fn render_template(template: &str, title: &str, description: &str) -> String {
    template
        .replace("{title}", title)
        .replace("{description}", description)
}

/// Record the outcome on the row itself so the sink (and a later resume) sees it.
fn write_back(record: &mut Record, outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::AlreadyAnnotated => return,
        TaskOutcome::Succeeded { analysis, .. } => {
            record.set_attr(ANALYSIS_KEY, analysis.as_str());
            record.set_attr("analysed_at", chrono::Utc::now().to_rfc3339());
            record.attrs.remove("analysis_error");
            match parse_verdict(analysis) {
                Ok(v) => {
                    record.set_attr("signal_fit", v.fit);
                    record.set_attr("signal_strength", v.strength.as_str());
                    record.set_attr("signal_note", v.note);
                }
                Err(e) => record.set_attr("analysis_error", format!("unparsed reply: {e}")),
            }
        }
        TaskOutcome::Failed { reason, .. } => {
            record.set_attr("analysis_error", reason.as_str());
        }
        TaskOutcome::TooShort { .. } | TaskOutcome::Cancelled => {}
    }
    record.set_attr(STATUS_KEY, outcome.label());
}

fn log_outcome(id: TaskId, record: &Record, outcome: &TaskOutcome) {
    let rec = anon_hash(&record.title);
    match outcome {
        TaskOutcome::Failed { reason, attempts } => {
            warn!(target: "scheduler", task = id, %rec, attempts, %reason, "annotation failed")
        }
        other => {
            info!(target: "scheduler", task = id, %rec, outcome = other.label(), attempts = other.attempts(), "annotation done")
        }
    }
}

async fn persist(sink: &dyn RecordSink, records: &[Record]) -> Result<(), PipelineError> {
    sink.persist(records)
        .await
        .map_err(|e| PipelineError::SinkWrite(format!("{e:#}")))
}
