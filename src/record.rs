// src/record.rs
//! Record model shared by the deduplicator and the annotation scheduler.
//!
//! `title` and `description` are coerced leniently: any non-string value (null, number,
//! nested object) becomes empty text so one bad row never aborts a batch. All other
//! attributes pass through untouched.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Attribute holding the raw model reply for a successfully annotated record.
pub const ANALYSIS_KEY: &str = "analysis";
/// Attribute holding the outcome label of the last annotation attempt.
pub const STATUS_KEY: &str = "analysis_status";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    /// Passthrough columns (link, date, company, previous analysis, ...).
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(coerce_text(&v))
}

/// Non-string values become empty text.
pub fn coerce_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

impl Record {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            attrs: Map::new(),
        }
    }

    /// Build a record from an arbitrary JSON value. Never fails: a non-object value
    /// yields an empty record, malformed text fields yield empty text.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            debug!(target: "record", "non-object record coerced to empty");
            return Self::default();
        };
        let mut take = |key: &str| match map.remove(key) {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => {
                debug!(target: "record", field = key, kind = %value_kind(&other), "non-text field coerced to empty");
                String::new()
            }
        };
        let title = take("title");
        let description = take("description");
        Self {
            title,
            description,
            attrs: map,
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Non-empty prior annotation, if any.
    pub fn analysis(&self) -> Option<&str> {
        self.attrs
            .get(ANALYSIS_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn has_analysis(&self) -> bool {
        self.analysis().is_some()
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<Value>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a JSON array of records. Individual malformed entries are coerced, only a
/// malformed document fails.
pub fn records_from_json(s: &str) -> serde_json::Result<Vec<Record>> {
    let values: Vec<Value> = serde_json::from_str(s)?;
    Ok(values.into_iter().map(Record::from_value).collect())
}

/// Decode HTML entities and strip ASCII/C1 control characters (keeps `\t`, `\n`, `\r`).
pub fn clean_text(s: &str) -> String {
    static RE_CTRL: OnceCell<Regex> = OnceCell::new();
    let re = RE_CTRL.get_or_init(|| {
        Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x{7F}-\x{9F}]").expect("control-char regex")
    });
    let decoded = html_escape::decode_html_entities(s);
    re.replace_all(&decoded, "").trim().to_string()
}

/// Keep at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Short anonymized id for logs; raw record text is never logged.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_fields_coerce_to_empty() {
        let r = Record::from_value(json!({
            "title": 42,
            "description": null,
            "link": "https://example.com"
        }));
        assert_eq!(r.title, "");
        assert_eq!(r.description, "");
        assert_eq!(r.attr_str("link"), Some("https://example.com"));
    }

    #[test]
    fn non_object_becomes_empty_record() {
        assert_eq!(Record::from_value(json!([1, 2])), Record::default());
    }

    #[test]
    fn serde_roundtrip_keeps_passthrough_columns() {
        let raw = r#"{"title":"Acme","description":{"nested":true},"company":"Acme Inc"}"#;
        let r: Record = serde_json::from_str(raw).unwrap();
        assert_eq!(r.description, "");
        let back = serde_json::to_value(&r).unwrap();
        assert_eq!(back["company"], "Acme Inc");
        assert_eq!(back["title"], "Acme");
    }

    #[test]
    fn blank_analysis_counts_as_missing() {
        let r = Record::new("t", "d").with_attr(ANALYSIS_KEY, "   ");
        assert!(!r.has_analysis());
        let r = r.with_attr(ANALYSIS_KEY, "Yes");
        assert_eq!(r.analysis(), Some("Yes"));
    }

    #[test]
    fn clean_text_strips_controls_and_entities() {
        assert_eq!(clean_text("  Acme&amp;Co\u{0007} raises\u{0085} "), "Acme&Co raises");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("Acme raises $5M");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("Acme raises $5M"));
    }
}
