//! Stress integration tests
//!
//! Many listeners with random delays and failures feeding one bundle

use crate::integration::RandomListener;
use listener_bundle::Bundle;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const OTHERS: usize = 50;
const MAX_DELAY: Duration = Duration::from_millis(5);
const FAIL_CHANCE: f64 = 0.1;

#[derive(Debug, Default)]
struct Tally {
    calls: usize,
    conns: usize,
    temporary: usize,
    stopped: usize,
}

async fn drain(bundled: &Bundle<u32>) -> Tally {
    let mut tally = Tally::default();

    loop {
        tally.calls += 1;
        match bundled.accept().await {
            Ok(_) => tally.conns += 1,
            Err(e) => {
                if e.stopped() {
                    tally.stopped += 1;
                }
                if e.temporary() {
                    tally.temporary += 1;
                    continue;
                }
                assert!(e.listener().is_some(), "Exhaustion must name the last listener");
                return tally;
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_outcome_reaches_the_caller() {
    let total_accepts = Arc::new(AtomicUsize::new(0));

    let main = RandomListener::new(0, 0x5eed, total_accepts.clone(), MAX_DELAY, FAIL_CHANCE);
    let others = (1..=OTHERS)
        .map(|id| {
            RandomListener::new(
                id,
                0x5eed + id as u64 * 7919,
                total_accepts.clone(),
                MAX_DELAY,
                FAIL_CHANCE,
            )
        })
        .collect();
    let bundled = Bundle::new(main, others);

    let tally = tokio::time::timeout(Duration::from_secs(60), drain(&bundled))
        .await
        .expect("bundle should run out of listeners");

    // One outcome per listener accept call, none lost or duplicated
    assert_eq!(tally.calls, total_accepts.load(Ordering::SeqCst));
    assert_eq!(tally.stopped, OTHERS + 1);
    assert_eq!(tally.calls, tally.conns + tally.temporary + 1);
    assert_eq!(bundled.active(), 0);

    // Exhausted: listeners are no longer asked
    let err = bundled.accept().await.unwrap_err();
    assert!(!err.temporary());
    assert!(err.stopped());
    assert!(err.listener().is_none());
    assert_eq!(tally.calls, total_accepts.load(Ordering::SeqCst));
}
