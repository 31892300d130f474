// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod annotate;
pub mod cancel;
pub mod config;
pub mod dedup;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod ratelimit;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod similarity;
pub mod sink;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::annotate::{Annotator, DynAnnotator};
pub use crate::cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use crate::dedup::{dedupe, dedupe_with_stats, DedupStats};
pub use crate::error::{AnnotationError, PipelineError, PoolExhausted, RetryKind};
pub use crate::keys::KeyPool;
pub use crate::pipeline::{enrich, run_annotation, AnnotationRun};
pub use crate::ratelimit::TokenBucket;
pub use crate::record::Record;
pub use crate::scheduler::{AnnotationScheduler, RunReport, TaskOutcome};
pub use crate::similarity::score;
