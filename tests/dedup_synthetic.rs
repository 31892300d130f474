// tests/dedup_synthetic.rs
//
// Seeded synthetic batches: idempotence, subset-of-input and title ordering.

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use signal_enricher::record::Record;
use signal_enricher::{dedupe, score};

const COMPANIES: &[&str] = &["Acme", "Beta", "Gamma", "Delta", "Orbit", "Nimbus"];
const EVENTS: &[&str] = &[
    "raises seed round",
    "raises Series A",
    "opens office in Berlin",
    "hires new CFO",
    "launches mobile app",
    "acquires competitor",
];
const OUTLETS: &[&str] = &["TechWire", "Daily Ledger", "Startup Post"];

fn synth_batch(rng: &mut StdRng, n: usize) -> Vec<Record> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let company = COMPANIES[rng.random_range(0..COMPANIES.len())];
        let event = EVENTS[rng.random_range(0..EVENTS.len())];
        let outlet = OUTLETS[rng.random_range(0..OUTLETS.len())];
        let title = if rng.random_bool(0.3) {
            format!("{event} - {company}")
        } else {
            format!("{company} {event}")
        };
        let description = format!("{outlet} reports that {company} {event} this week");
        out.push(Record::new(title, description).with_attr("row", i as u64));
    }
    // sprinkle verbatim duplicates
    let dups: Vec<Record> = out.iter().take(n / 5).cloned().collect();
    out.extend(dups);
    out.shuffle(rng);
    out
}

#[test]
fn dedupe_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let n = rng.random_range(0..40);
        let batch = synth_batch(&mut rng, n);
        for (t, d) in [(70u8, 70u8), (85, 90), (95, 95), (100, 100)] {
            let once = dedupe(batch.clone(), t, d);
            let twice = dedupe(once.clone(), t, d);
            assert_eq!(once, twice, "thresholds ({t}, {d})");
        }
    }
}

#[test]
fn output_is_title_sorted_subset_of_input() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        let n = rng.random_range(1..40);
        let batch = synth_batch(&mut rng, n);
        let out = dedupe(batch.clone(), 80, 80);

        assert!(out.windows(2).all(|w| w[0].title <= w[1].title));
        for r in &out {
            assert!(batch.contains(r), "output record not in input");
        }
        assert!(out.len() <= batch.len());
    }
}

#[test]
fn survivors_are_pairwise_below_thresholds() {
    let mut rng = StdRng::seed_from_u64(1234);
    let batch = synth_batch(&mut rng, 60);
    let (t, d) = (75u8, 75u8);
    let out = dedupe(batch, t, d);
    for (i, a) in out.iter().enumerate() {
        for b in &out[i + 1..] {
            assert!(score(&a.title, &b.title) <= t);
            assert!(score(&a.description, &b.description) <= d);
        }
    }
}
