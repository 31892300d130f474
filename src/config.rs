// src/config.rs
//! Enrichment configuration: `config/enrichment.toml` + env overrides.
//!
//! Resolution order for the file:
//! 1) `$ENRICHMENT_CONFIG_PATH` (must exist)
//! 2) `config/enrichment.toml`
//! 3) built-in defaults
//!
//! `credentials = ["ENV"]` reads the comma separated `ANNOTATOR_API_KEYS` variable.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::dedup::{DEFAULT_DESCRIPTION_THRESHOLD, DEFAULT_TITLE_THRESHOLD};
use crate::retry::RetryPolicy;

pub const DEFAULT_ENRICHMENT_CONFIG_PATH: &str = "config/enrichment.toml";
pub const ENV_ENRICHMENT_CONFIG_PATH: &str = "ENRICHMENT_CONFIG_PATH";
pub const ENV_API_KEYS: &str = "ANNOTATOR_API_KEYS";

pub const ENV_MAX_CONCURRENCY: &str = "ENRICH_MAX_CONCURRENCY";
pub const ENV_RATE_LIMIT: &str = "ENRICH_RATE_LIMIT";
pub const ENV_TITLE_THRESHOLD: &str = "ENRICH_TITLE_THRESHOLD";
pub const ENV_DESCRIPTION_THRESHOLD: &str = "ENRICH_DESCRIPTION_THRESHOLD";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub dedup: DedupConfig,
    pub annotation: AnnotationConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub title_threshold: u8,
    pub description_threshold: u8,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_threshold: DEFAULT_TITLE_THRESHOLD,
            description_threshold: DEFAULT_DESCRIPTION_THRESHOLD,
        }
    }
}

/// Knobs of one annotation run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Parallel in-flight tasks.
    pub max_concurrency: usize,
    /// Requests admitted per `period_secs` (also the burst size).
    pub rate_limit: u32,
    pub period_secs: f64,
    /// Total calls per task, first call included.
    pub max_retries: u32,
    pub base_backoff_secs: f64,
    /// Texts shorter than this (in chars) are not sent.
    pub min_text_length: usize,
    /// Texts are truncated to this many chars before sending.
    pub max_text_length: usize,
    /// Upper bound for a single external call.
    pub request_timeout_secs: f64,
    /// After cancellation, how long in-flight tasks may run before being abandoned.
    pub grace_period_secs: f64,
    pub credentials: Vec<String>,
    pub system_prompt_path: PathBuf,
    /// `{title}` and `{description}` are substituted.
    pub user_template: String,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            rate_limit: 20,
            period_secs: 60.0,
            max_retries: 3,
            base_backoff_secs: 5.0,
            min_text_length: 100,
            max_text_length: 2000,
            request_timeout_secs: 120.0,
            grace_period_secs: 30.0,
            credentials: Vec::new(),
            system_prompt_path: PathBuf::from("config/prompt.txt"),
            user_template: "{description}".to_string(),
        }
    }
}

impl AnnotationConfig {
    pub fn period(&self) -> Duration {
        secs(self.period_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        secs(self.grace_period_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, secs(self.base_backoff_secs))
    }

    /// Replace out-of-range values with defaults instead of failing.
    pub fn sanitize(&mut self) {
        let d = Self::default();
        if self.max_concurrency == 0 {
            self.max_concurrency = d.max_concurrency;
        }
        if self.rate_limit == 0 {
            self.rate_limit = d.rate_limit;
        }
        if !(self.period_secs > 0.0) {
            self.period_secs = d.period_secs;
        }
        if self.max_retries == 0 {
            self.max_retries = 1;
        }
        if !(self.base_backoff_secs >= 0.0) {
            self.base_backoff_secs = d.base_backoff_secs;
        }
        if !(self.request_timeout_secs > 0.0) {
            self.request_timeout_secs = d.request_timeout_secs;
        }
        if !(self.grace_period_secs >= 0.0) {
            self.grace_period_secs = d.grace_period_secs;
        }
        if self.max_text_length < self.min_text_length {
            self.max_text_length = self.min_text_length;
        }
        if self.user_template.trim().is_empty() {
            self.user_template = d.user_template;
        }
    }

    /// Expand the `"ENV"` marker into keys from `ANNOTATOR_API_KEYS`.
    pub fn resolve_credentials(&mut self) -> Result<()> {
        let wants_env = self
            .credentials
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case("env"));
        if !wants_env {
            return Ok(());
        }
        let raw = std::env::var(ENV_API_KEYS)
            .map_err(|_| anyhow!("Missing {ENV_API_KEYS} env var"))?;
        let mut resolved: Vec<String> = self
            .credentials
            .iter()
            .filter(|c| !c.trim().eq_ignore_ascii_case("env"))
            .cloned()
            .collect();
        resolved.extend(
            raw.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from),
        );
        self.credentials = resolved;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// "openai" | "mock" (case-insensitive)
    pub kind: String,
    pub endpoint: String,
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: "openai".to_string(),
            endpoint: crate::annotate::openai::DEFAULT_ENDPOINT.to_string(),
            model: crate::annotate::openai::DEFAULT_MODEL.to_string(),
        }
    }
}

/// Negative and NaN become zero; values too large for a `Duration` saturate.
fn secs(v: f64) -> Duration {
    match Duration::try_from_secs_f64(v) {
        Ok(d) => d,
        Err(_) if v > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl EnrichmentConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: EnrichmentConfig = toml::from_str(s).context("parsing enrichment config")?;
        cfg.finish()?;
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading enrichment config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// Load using env var + fallbacks (see module docs).
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_ENRICHMENT_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_ENRICHMENT_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let default = PathBuf::from(DEFAULT_ENRICHMENT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from_file(&default);
        }
        info!(target: "config", "no enrichment config file, using defaults");
        let mut cfg = Self::default();
        cfg.finish()?;
        Ok(cfg)
    }

    fn finish(&mut self) -> Result<()> {
        self.apply_env_overrides();
        self.dedup.title_threshold = self.dedup.title_threshold.min(100);
        self.dedup.description_threshold = self.dedup.description_threshold.min(100);
        self.provider.kind = self.provider.kind.trim().to_lowercase();
        self.annotation.sanitize();
        self.annotation.resolve_credentials()
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<usize>(ENV_MAX_CONCURRENCY) {
            self.annotation.max_concurrency = v;
        }
        if let Some(v) = env_parse::<u32>(ENV_RATE_LIMIT) {
            self.annotation.rate_limit = v;
        }
        if let Some(v) = env_parse::<u8>(ENV_TITLE_THRESHOLD) {
            self.dedup.title_threshold = v;
        }
        if let Some(v) = env_parse::<u8>(ENV_DESCRIPTION_THRESHOLD) {
            self.dedup.description_threshold = v;
        }
    }
}

/// Read the role description used as the system prompt.
pub fn load_system_prompt(path: &Path) -> Result<String> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading system prompt from {}", path.display()))?;
    let s = s.trim().to_string();
    if s.is_empty() {
        return Err(anyhow!("system prompt {} is empty", path.display()));
    }
    Ok(s)
}
