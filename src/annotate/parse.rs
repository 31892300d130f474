// src/annotate/parse.rs
//! Parse model replies of the shape `[fit, strength, note]`.
//!
//! Replies are loosely formatted: the list may be wrapped in prose, fields may or may
//! not be quoted, notes may contain commas inside quotes. Parsing never panics; a reply
//! that does not fit yields a [`ParseError`] and the caller keeps the raw text.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalStrength {
    None,
    Weak,
    Moderate,
    Strong,
}

impl SignalStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Weak => "Weak",
            Self::Moderate => "Moderate",
            Self::Strong => "Strong",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "no" | "" => Some(Self::None),
            "weak" | "low" => Some(Self::Weak),
            "moderate" | "medium" => Some(Self::Moderate),
            "strong" | "high" => Some(Self::Strong),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// `Some(true)` for "Yes", `Some(false)` for "No", `None` when the model hedged.
    pub fit: Option<bool>,
    pub strength: SignalStrength,
    pub note: String,
}

pub fn parse_verdict(reply: &str) -> Result<Verdict, ParseError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(ParseError::Empty);
    }

    static RE_LIST: OnceCell<Regex> = OnceCell::new();
    let re = RE_LIST.get_or_init(|| Regex::new(r"(?s)\[(.*?)\]").expect("list regex"));
    let content = re
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply);

    let fields = split_fields(content);
    if fields.len() < 3 {
        return Err(ParseError::MissingFields {
            found: fields.len(),
        });
    }

    let fit = parse_fit(&fields[0]);
    let strength = SignalStrength::parse(&fields[1])
        .ok_or_else(|| ParseError::UnknownStrength(fields[1].clone()))?;
    // A note split on unquoted commas is glued back together.
    let note = fields[2..].join(", ");

    Ok(Verdict {
        fit,
        strength,
        note,
    })
}

fn parse_fit(s: &str) -> Option<bool> {
    let lower = s.trim().to_ascii_lowercase();
    if lower.starts_with("yes") {
        Some(true)
    } else if lower.starts_with("no") {
        Some(false)
    } else {
        None
    }
}

/// Split on commas outside double/single quotes, then strip quotes and whitespace.
fn split_fields(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;

    for ch in content.chars() {
        match (quote, ch) {
            (None, '"') | (None, '\'') if cur.trim().is_empty() => {
                quote = Some(ch);
                cur.push(ch);
            }
            (Some(q), c) if c == q => {
                quote = None;
                cur.push(c);
            }
            (None, ',') => {
                out.push(clean_field(&cur));
                cur.clear();
            }
            _ => cur.push(ch),
        }
    }
    if !cur.trim().is_empty() || !out.is_empty() {
        out.push(clean_field(&cur));
    }
    out
}

fn clean_field(s: &str) -> String {
    s.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}
