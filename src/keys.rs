// src/keys.rs
//! Credential rotation pool.
//!
//! Keys are handed out in insertion order and wrap around. A retired key is never
//! handed out again; calls already in flight with it are left alone. The pool only
//! shrinks, and retiring the last key is fatal for the run.

use std::sync::Mutex;

use metrics::counter;
use tracing::{info, warn};

use crate::error::PoolExhausted;

#[derive(Debug)]
pub struct KeyPool {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    keys: Vec<String>,
    cursor: usize,
}

impl KeyPool {
    /// Blank entries are ignored. An empty pool is rejected up front.
    pub fn new<I, S>(keys: I) -> Result<Self, PoolExhausted>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys
            .into_iter()
            .map(Into::into)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(PoolExhausted);
        }
        Ok(Self {
            inner: Mutex::new(Inner { keys, cursor: 0 }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("key pool mutex poisoned")
    }

    pub fn current(&self) -> Result<String, PoolExhausted> {
        let g = self.lock();
        g.keys.get(g.cursor).cloned().ok_or(PoolExhausted)
    }

    /// Move to the next key (cyclic) and return it.
    pub fn advance(&self) -> Result<String, PoolExhausted> {
        let mut g = self.lock();
        if g.keys.is_empty() {
            return Err(PoolExhausted);
        }
        g.cursor = (g.cursor + 1) % g.keys.len();
        Ok(g.keys[g.cursor].clone())
    }

    /// Advance only if `stale` is still the current key; otherwise another caller has
    /// already rotated and the current key is returned as is.
    pub fn rotate_from(&self, stale: &str) -> Result<String, PoolExhausted> {
        let mut g = self.lock();
        if g.keys.is_empty() {
            return Err(PoolExhausted);
        }
        if g.keys[g.cursor] == stale {
            g.cursor = (g.cursor + 1) % g.keys.len();
        }
        Ok(g.keys[g.cursor].clone())
    }

    /// Remove `key` permanently. Retiring an unknown (already retired) key is a no-op.
    /// Fails once no key is left.
    pub fn retire(&self, key: &str) -> Result<(), PoolExhausted> {
        let mut g = self.lock();
        let Some(idx) = g.keys.iter().position(|k| k == key) else {
            return if g.keys.is_empty() {
                Err(PoolExhausted)
            } else {
                Ok(())
            };
        };
        g.keys.remove(idx);
        counter!("annotation_credentials_retired_total").increment(1);

        if g.keys.is_empty() {
            g.cursor = 0;
            warn!(target: "keys", "last credential retired");
            return Err(PoolExhausted);
        }
        if idx < g.cursor {
            g.cursor -= 1;
        } else if idx == g.cursor {
            // The successor shifted into `idx`.
            g.cursor %= g.keys.len();
        }
        info!(target: "keys", remaining = g.keys.len(), "credential retired");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_in_insertion_order_and_wraps() {
        let pool = KeyPool::new(["a", "b", "c"]).unwrap();
        assert_eq!(pool.current().unwrap(), "a");
        assert_eq!(pool.advance().unwrap(), "b");
        assert_eq!(pool.advance().unwrap(), "c");
        assert_eq!(pool.advance().unwrap(), "a");
    }

    #[test]
    fn retiring_current_moves_to_successor() {
        let pool = KeyPool::new(["a", "b", "c"]).unwrap();
        pool.advance().unwrap(); // b
        pool.retire("b").unwrap();
        assert_eq!(pool.current().unwrap(), "c");
        pool.retire("c").unwrap();
        assert_eq!(pool.current().unwrap(), "a");
    }

    #[test]
    fn retiring_earlier_key_keeps_current() {
        let pool = KeyPool::new(["a", "b", "c"]).unwrap();
        pool.advance().unwrap();
        pool.advance().unwrap(); // c
        pool.retire("a").unwrap();
        assert_eq!(pool.current().unwrap(), "c");
        assert_eq!(pool.advance().unwrap(), "b");
    }

    #[test]
    fn rotate_from_stale_key_does_not_double_advance() {
        let pool = KeyPool::new(["a", "b", "c"]).unwrap();
        assert_eq!(pool.rotate_from("a").unwrap(), "b");
        // a second caller that also saw "a" does not skip "b"
        assert_eq!(pool.rotate_from("a").unwrap(), "b");
    }

    #[test]
    fn blank_keys_are_dropped_and_empty_pool_rejected() {
        assert!(KeyPool::new(["", "  "]).is_err());
        let pool = KeyPool::new([" k1 ", ""]).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.current().unwrap(), "k1");
    }

    #[test]
    fn retire_unknown_is_noop() {
        let pool = KeyPool::new(["a"]).unwrap();
        assert!(pool.retire("zzz").is_ok());
        assert_eq!(pool.len(), 1);
    }
}
