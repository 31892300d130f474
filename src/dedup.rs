// src/dedup.rs
//! Duplicate elimination over search results.
//!
//! 1. Exact pass: keep the first record per verbatim `(title, description)` pair.
//! 2. Stable sort of the survivors by title. Output order is title order, not input order.
//! 3. Fuzzy pass: every unordered pair `(i, j)`, `i < j` in sorted order, is compared on
//!    title and on description. If either score exceeds its threshold, `j` is dropped.
//!
//! The comparison is strict (`score > threshold`). At 100 the fuzzy pass drops nothing.
//! At 0 it drops every later record that shares anything with an earlier one, but a pair
//! scoring exactly 0 (disjoint characters, or empty text on both sides) is kept.
//!
//! The fuzzy pass is O(n²) comparisons. Runs are bounded to hundreds of records, and the
//! pairwise decisions are intentionally non-transitive: a record already marked for
//! removal still acts as the left side of later comparisons, so A~B and B~C removes
//! both B and C even when A and C are dissimilar. Any blocking/indexing shortcut would
//! change which record of a near-duplicate chain survives.

use std::collections::HashSet;

use metrics::counter;
use tracing::{debug, info};

use crate::record::{anon_hash, Record};
use crate::similarity::{score_keys, token_sort_key};
use crate::telemetry::ensure_metrics_described;

/// Defaults used by the scripts this pipeline replaces.
pub const DEFAULT_TITLE_THRESHOLD: u8 = 70;
pub const DEFAULT_DESCRIPTION_THRESHOLD: u8 = 70;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub input: usize,
    pub exact_removed: usize,
    pub fuzzy_removed: usize,
    pub kept: usize,
}

/// Remove exact and near duplicates. Thresholds are 0..=100; a pair is a near duplicate
/// when a score is strictly greater than its threshold.
pub fn dedupe(records: Vec<Record>, title_threshold: u8, description_threshold: u8) -> Vec<Record> {
    dedupe_with_stats(records, title_threshold, description_threshold).0
}

pub fn dedupe_with_stats(
    records: Vec<Record>,
    title_threshold: u8,
    description_threshold: u8,
) -> (Vec<Record>, DedupStats) {
    ensure_metrics_described();

    let input = records.len();
    let mut survivors = exact_pass(records);
    let exact_removed = input - survivors.len();

    survivors.sort_by(|a, b| a.title.cmp(&b.title));

    let removed = fuzzy_marks(&survivors, title_threshold, description_threshold);
    let fuzzy_removed = removed.iter().filter(|&&m| m).count();

    let kept: Vec<Record> = survivors
        .into_iter()
        .zip(removed)
        .filter_map(|(r, drop)| (!drop).then_some(r))
        .collect();

    let stats = DedupStats {
        input,
        exact_removed,
        fuzzy_removed,
        kept: kept.len(),
    };

    counter!("dedup_exact_removed_total").increment(exact_removed as u64);
    counter!("dedup_fuzzy_removed_total").increment(fuzzy_removed as u64);
    info!(
        target: "dedup",
        input,
        exact_removed,
        fuzzy_removed,
        kept = stats.kept,
        title_threshold,
        description_threshold,
        "dedup finished"
    );

    (kept, stats)
}

fn exact_pass(records: Vec<Record>) -> Vec<Record> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|r| seen.insert((r.title.clone(), r.description.clone())))
        .collect()
}

/// Marks, per position in `sorted`, whether the record is a near duplicate of an earlier one.
fn fuzzy_marks(sorted: &[Record], title_threshold: u8, description_threshold: u8) -> Vec<bool> {
    let keys: Vec<(String, String)> = sorted
        .iter()
        .map(|r| (token_sort_key(&r.title), token_sort_key(&r.description)))
        .collect();

    let mut removed = vec![false; sorted.len()];
    for i in 0..sorted.len() {
        for j in (i + 1)..sorted.len() {
            if removed[j] {
                continue;
            }
            let title_score = score_keys(&sorted[i].title, &sorted[j].title, &keys[i].0, &keys[j].0);
            let desc_score = score_keys(
                &sorted[i].description,
                &sorted[j].description,
                &keys[i].1,
                &keys[j].1,
            );
            if title_score > title_threshold || desc_score > description_threshold {
                removed[j] = true;
                debug!(
                    target: "dedup",
                    kept = %anon_hash(&sorted[i].title),
                    dropped = %anon_hash(&sorted[j].title),
                    title_score,
                    desc_score,
                    "near duplicate"
                );
            }
        }
    }
    removed
}
