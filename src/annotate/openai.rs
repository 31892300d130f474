// src/annotate/openai.rs
//! OpenAI-compatible chat-completions provider (OpenAI, OpenRouter, Groq, ... share the
//! same request shape). HTTP failures are classified into retryable / terminal /
//! credential-rejected so the scheduler can react uniformly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{sanitize_reply, Annotator};
use crate::error::AnnotationError;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiAnnotator {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OpenAiAnnotator {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("signal-enricher/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        let endpoint = if endpoint.trim().is_empty() {
            DEFAULT_ENDPOINT
        } else {
            endpoint.trim()
        };
        let model = if model.trim().is_empty() {
            DEFAULT_MODEL
        } else {
            model.trim()
        };
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Annotator for OpenAiAnnotator {
    async fn annotate(
        &self,
        system_prompt: &str,
        user_text: &str,
        credential: &str,
    ) -> Result<String, AnnotationError> {
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system_prompt,
                },
                Msg {
                    role: "user",
                    content: user_text,
                },
            ],
            temperature: 0.2,
            max_tokens: 1000,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(credential)
            .json(&req)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!(target: "annotate", %status, "provider returned error status");
            return Err(classify_status(status, &body));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| AnnotationError::transient(format!("unreadable response: {e}")))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let cleaned = sanitize_reply(&content);
        if cleaned.is_empty() {
            return Err(AnnotationError::transient("empty completion"));
        }
        Ok(cleaned)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

fn classify_transport(e: reqwest::Error) -> AnnotationError {
    if e.is_builder() {
        return AnnotationError::Terminal(format!("request build failed: {e}"));
    }
    // timeouts, connect errors, broken bodies
    AnnotationError::transient(format!("transport: {e}"))
}

/// Map a non-success HTTP status (and body) to the error taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> AnnotationError {
    let snippet: String = body.chars().take(200).collect();
    match status.as_u16() {
        429 if body.contains("insufficient_quota") => {
            AnnotationError::KeyRejected(format!("quota exhausted: {snippet}"))
        }
        429 => AnnotationError::quota(format!("rate limited: {snippet}")),
        401 | 402 | 403 => AnnotationError::KeyRejected(format!("HTTP {status}: {snippet}")),
        408 | 409 => AnnotationError::transient(format!("HTTP {status}")),
        s if s >= 500 => AnnotationError::transient(format!("HTTP {status}")),
        _ => AnnotationError::Terminal(format!("HTTP {status}: {snippet}")),
    }
}
