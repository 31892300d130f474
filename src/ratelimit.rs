// src/ratelimit.rs
//! # Token bucket
//! Continuous-refill admission control shared by all annotation tasks of a run.
//!
//! Every `acquire` refills `elapsed * refill_per_sec` tokens (capped at `capacity`),
//! then either debits one token or sleeps exactly `(1 - tokens) / refill_per_sec`
//! before trying again. Callers race; there is no queue.

use std::sync::Mutex;
use std::time::Duration;

use metrics::histogram;
use tokio::time::Instant;
use tracing::trace;

/// Absorbs float drift so a bucket refilled to 0.999999... still admits.
const EPSILON: f64 = 1e-9;

#[derive(Debug)]
pub struct TokenBucket {
    budget: Mutex<Budget>,
    capacity: f64,
    refill_per_sec: f64,
}

#[derive(Debug)]
struct Budget {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Bucket starting full. `capacity` and `refill_per_sec` must be positive.
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        let capacity = if capacity > 0.0 { capacity } else { 1.0 };
        let refill_per_sec = if refill_per_sec > 0.0 {
            refill_per_sec
        } else {
            1.0
        };
        Self {
            budget: Mutex::new(Budget {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec,
        }
    }

    /// `max_requests` per `period`, e.g. 20 per 60s. Burst capacity equals `max_requests`.
    pub fn per_period(max_requests: u32, period: Duration) -> Self {
        let cap = f64::from(max_requests.max(1));
        let secs = period.as_secs_f64();
        let secs = if secs > 0.0 { secs } else { 1.0 };
        Self::new(cap, cap / secs)
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_sec(&self) -> f64 {
        self.refill_per_sec
    }

    /// Wait until one token is available and debit it.
    pub async fn acquire(&self) {
        let started = Instant::now();
        loop {
            let wait = match self.try_acquire_at(Instant::now()) {
                Ok(()) => break,
                Err(wait) => wait,
            };
            trace!(target: "ratelimit", wait_ms = wait.as_millis() as u64, "bucket empty");
            tokio::time::sleep(wait).await;
        }
        histogram!("ratelimit_wait_ms").record(started.elapsed().as_secs_f64() * 1000.0);
    }

    /// Non-blocking attempt. On failure returns how long until a full token accrues.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut b = self.budget.lock().expect("rate budget mutex poisoned");
        self.refill(&mut b, now);
        if b.tokens + EPSILON >= 1.0 {
            b.tokens = (b.tokens - 1.0).max(0.0);
            return Ok(());
        }
        let secs = (1.0 - b.tokens) / self.refill_per_sec;
        // a vanishing refill rate saturates instead of overflowing
        Err(Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX))
    }

    fn refill(&self, b: &mut Budget, now: Instant) {
        let elapsed = now.saturating_duration_since(b.last_refill).as_secs_f64();
        b.tokens = (b.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        b.last_refill = now;
    }

    /// Tokens currently available (after refill). Never exceeds `capacity`.
    pub fn available(&self) -> f64 {
        let mut b = self.budget.lock().expect("rate budget mutex poisoned");
        self.refill(&mut b, Instant::now());
        b.tokens
    }
}
