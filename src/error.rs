// src/error.rs
//! Error taxonomy for the enrichment pipeline.
//!
//! Per-task failures (`AnnotationError`) are caught at the task boundary and turned
//! into outcome records. Only `PipelineError` aborts a whole run.

use thiserror::Error;

/// Why a retryable call failed. Quota failures additionally rotate the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    /// Rate-limit / quota signal from the provider (e.g. HTTP 429).
    Quota,
    /// Network hiccup, timeout, 5xx.
    Transient,
}

/// Failure reported by an annotation capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("retryable ({kind:?}): {reason}")]
    Retryable { kind: RetryKind, reason: String },

    /// Per-task fatal: malformed input, rejected request.
    #[error("terminal: {0}")]
    Terminal(String),

    /// The credential used for the call is permanently unusable and must be retired.
    #[error("credential rejected: {0}")]
    KeyRejected(String),
}

impl AnnotationError {
    pub fn quota(reason: impl Into<String>) -> Self {
        Self::Retryable {
            kind: RetryKind::Quota,
            reason: reason.into(),
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Retryable {
            kind: RetryKind::Transient,
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// Every credential in the pool has been retired.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("credential pool exhausted")]
pub struct PoolExhausted;

/// Errors that halt a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    PoolExhausted(#[from] PoolExhausted),

    #[error("sink write failed: {0}")]
    SinkWrite(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Reply from the model did not have the expected `[fit, strength, note]` shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty reply")]
    Empty,

    #[error("expected 3 fields, found {found}")]
    MissingFields { found: usize },

    #[error("unknown signal strength: {0}")]
    UnknownStrength(String),
}
