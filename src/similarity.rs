// src/similarity.rs
//! Token-order-insensitive similarity between two texts, as an integer 0..=100.
//!
//! Both inputs are normalized (lowercased, every non-alphanumeric character treated as
//! whitespace), split into tokens, sorted and re-joined; the sorted forms are then
//! compared with the indel ratio `2 * lcs / (len_a + len_b)`, rounded half to even.
//! Dedup thresholds are tuned against this token-sort ratio, so a text that is a
//! shortened form of another scores noticeably higher than under a Levenshtein ratio.

use rapidfuzz::fuzz;

/// Lowercase, drop punctuation, sort tokens. `"Acme raises $5M"` -> `"5m acme raises"`.
pub fn token_sort_key(s: &str) -> String {
    let lowered: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    let mut tokens: Vec<&str> = lowered.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Similarity of two texts, symmetric and deterministic.
///
/// Texts that normalize to nothing (empty, punctuation only) score 0 against anything
/// except a byte-identical non-blank text, which scores 100.
pub fn score(a: &str, b: &str) -> u8 {
    score_keys(a, b, &token_sort_key(a), &token_sort_key(b))
}

/// Same as [`score`] with pre-computed sort keys; used by the O(n²) dedup pass.
pub(crate) fn score_keys(a: &str, b: &str, key_a: &str, key_b: &str) -> u8 {
    if key_a.is_empty() || key_b.is_empty() {
        return if a == b && !a.trim().is_empty() { 100 } else { 0 };
    }
    if key_a == key_b {
        return 100;
    }
    let sim = fuzz::ratio(key_a.chars(), key_b.chars());
    (sim * 100.0).round_ties_even().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_scores_100() {
        assert_eq!(score("Acme raises $5M", "Acme raises $5M"), 100);
        assert_eq!(score("!!!", "!!!"), 100);
    }

    #[test]
    fn token_order_is_ignored() {
        assert_eq!(score("Acme raises $5M", "$5M raises ACME"), 100);
    }

    #[test]
    fn symmetric() {
        let pairs = [
            ("Acme raises $5M seed", "Acme closes $5M seed round"),
            ("Beta hires CFO", "Gamma opens office in Berlin"),
            ("", "anything"),
        ];
        for (a, b) in pairs {
            assert_eq!(score(a, b), score(b, a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn empty_scores_zero() {
        assert_eq!(score("", ""), 0);
        assert_eq!(score("...", "..."), 100);
        assert_eq!(score("...", "acme"), 0);
    }

    #[test]
    fn more_shared_tokens_score_higher() {
        let base = "acme raises five million in seed funding";
        let close = score(base, "acme raises five million in series funding");
        let far = score(base, "beta opens new warehouse in ohio");
        assert!(close > far, "close={close} far={far}");
        assert!(close > 80);
    }

    #[test]
    fn shortened_text_matches_token_sort_ratio() {
        // "5m acme raises" is a prefix of "5m acme raises round seed": 2 * 14 / 39
        assert_eq!(score("Acme raises $5M", "Acme raises $5M seed round"), 72);
        // 2 * 2 / 6 and 2 * 1 / 4
        assert_eq!(score("abc", "abd"), 67);
        assert_eq!(score("ab", "ac"), 50);
        assert_eq!(score("abc", "xyz"), 0);
    }

    #[test]
    fn sort_key_normalizes() {
        assert_eq!(token_sort_key("  Acme, raises $5M!  "), "5m acme raises");
    }
}
