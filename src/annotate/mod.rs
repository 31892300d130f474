// src/annotate/mod.rs
//! Annotation capability: provider abstraction + factory + mock provider.
//!
//! The scheduler only sees [`Annotator`]: "annotate this text with this system prompt
//! using this credential". Retry, backoff, rate limiting and key rotation live in the
//! scheduler so every provider gets the same policy.

pub mod openai;
pub mod parse;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::ProviderConfig;
use crate::error::AnnotationError;

pub use openai::OpenAiAnnotator;
pub use parse::{parse_verdict, SignalStrength, Verdict};

/// External text-annotation capability.
#[async_trait]
pub trait Annotator: Send + Sync {
    async fn annotate(
        &self,
        system_prompt: &str,
        user_text: &str,
        credential: &str,
    ) -> Result<String, AnnotationError>;

    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynAnnotator = Arc<dyn Annotator>;

/// Deterministic provider for local runs and tests. Never touches the network.
#[derive(Debug, Clone)]
pub struct FixedAnnotator {
    pub reply: String,
}

impl Default for FixedAnnotator {
    fn default() -> Self {
        Self {
            reply: r#"["No", "None", "mock annotation"]"#.to_string(),
        }
    }
}

#[async_trait]
impl Annotator for FixedAnnotator {
    async fn annotate(
        &self,
        _system_prompt: &str,
        _user_text: &str,
        _credential: &str,
    ) -> Result<String, AnnotationError> {
        Ok(self.reply.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Factory: build an annotator according to config and environment.
///
/// * `AI_TEST_MODE=mock` always yields [`FixedAnnotator`].
/// * `kind = "openai"` builds the OpenAI-compatible HTTP provider.
/// * `kind = "mock"` yields [`FixedAnnotator`].
pub fn build_annotator(cfg: &ProviderConfig, timeout: Duration) -> anyhow::Result<DynAnnotator> {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        info!(target: "annotate", "AI_TEST_MODE=mock, using fixed annotator");
        return Ok(Arc::new(FixedAnnotator::default()));
    }

    match cfg.kind.to_ascii_lowercase().as_str() {
        "openai" => {
            let provider = OpenAiAnnotator::new(&cfg.endpoint, &cfg.model, timeout)?;
            Ok(Arc::new(provider))
        }
        "mock" => Ok(Arc::new(FixedAnnotator::default())),
        other => anyhow::bail!("unsupported annotation provider: {other}"),
    }
}

/// Trim the reply and strip a surrounding markdown code fence, if any.
pub fn sanitize_reply(reply: &str) -> String {
    reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```python")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_annotator_ignores_inputs() {
        let a = FixedAnnotator {
            reply: "ok".into(),
        };
        assert_eq!(a.annotate("sys", "text", "key").await.unwrap(), "ok");
        assert_eq!(a.name(), "mock");
    }

    #[test]
    fn sanitize_strips_fences() {
        assert_eq!(sanitize_reply("```json\n[\"Yes\"]\n```"), "[\"Yes\"]");
        assert_eq!(sanitize_reply("  plain  "), "plain");
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let cfg = ProviderConfig {
            kind: "carrier-pigeon".into(),
            ..ProviderConfig::default()
        };
        if std::env::var("AI_TEST_MODE").as_deref() != Ok("mock") {
            assert!(build_annotator(&cfg, Duration::from_secs(5)).is_err());
        }
    }
}
