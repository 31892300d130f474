// tests/key_rotation.rs
use std::sync::Arc;
use std::thread;

use signal_enricher::{KeyPool, PoolExhausted};

#[test]
fn retiring_all_but_one_leaves_the_survivor_current() {
    let pool = KeyPool::new(["k1", "k2", "k3", "k4"]).unwrap();
    pool.advance().unwrap();
    for k in ["k1", "k2", "k4"] {
        pool.retire(k).unwrap();
    }
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.current().unwrap(), "k3");
    assert_eq!(pool.advance().unwrap(), "k3");
}

#[test]
fn retiring_the_last_key_is_fatal() {
    let pool = KeyPool::new(["only"]).unwrap();
    assert_eq!(pool.retire("only"), Err(PoolExhausted));
    assert!(pool.is_empty());
    assert_eq!(pool.current(), Err(PoolExhausted));
    assert_eq!(pool.advance(), Err(PoolExhausted));
    assert_eq!(pool.rotate_from("only"), Err(PoolExhausted));
}

#[test]
fn retired_keys_are_never_handed_out_again() {
    let pool = KeyPool::new(["a", "b", "c"]).unwrap();
    pool.retire("b").unwrap();
    for _ in 0..10 {
        assert_ne!(pool.advance().unwrap(), "b");
    }
}

#[test]
fn concurrent_retire_and_rotate_stay_consistent() {
    let keys: Vec<String> = (0..16).map(|i| format!("key-{i}")).collect();
    let pool = Arc::new(KeyPool::new(keys.clone()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let pool = Arc::clone(&pool);
            let victim = keys[t * 2].clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let k = pool.current().unwrap();
                    pool.rotate_from(&k).unwrap();
                }
                pool.retire(&victim).unwrap();
                // a second retire of the same key is a no-op
                pool.retire(&victim).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(pool.len(), 8);
    for _ in 0..16 {
        let k = pool.advance().unwrap();
        let n: usize = k.trim_start_matches("key-").parse().unwrap();
        assert_eq!(n % 2, 1, "retired key {k} came back");
    }
}
