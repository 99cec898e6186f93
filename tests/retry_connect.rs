// tests/retry_connect.rs

mod common;
use crate::common::{TestResult, init_tracing, unused_local_addr, with_timeout};

use std::time::{Duration, Instant};

use devloop::connect::{ConnectError, RetryPolicy, connect_with_retry};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn quick(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        initial_delay: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn succeeds_immediately_when_listening() -> TestResult {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();

    with_timeout(connect_with_retry(&addr, &quick(1), &CancellationToken::new())).await?;
    Ok(())
}

#[tokio::test]
async fn exhausts_budget_against_closed_port() -> TestResult {
    init_tracing();

    let addr = unused_local_addr().to_string();
    let policy = RetryPolicy {
        attempts: 4,
        initial_delay: Duration::from_millis(20),
    };

    let started = Instant::now();
    let err = with_timeout(connect_with_retry(&addr, &policy, &CancellationToken::new()))
        .await
        .expect_err("nothing listens there");
    let elapsed = started.elapsed();

    match err {
        ConnectError::Exhausted { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected exhaustion, got {other:?}"),
    }

    // Three waits between four dials: 20 + 40 + 80 ms before jitter.
    assert!(
        elapsed >= Duration::from_millis(140),
        "gave up after {elapsed:?}, before all attempts were made"
    );
    // No wait after the last dial.
    assert!(
        elapsed <= policy.max_total_delay() + Duration::from_millis(150),
        "took {elapsed:?}, budget was {:?}",
        policy.max_total_delay()
    );
    Ok(())
}

#[tokio::test]
async fn single_attempt_does_not_wait() -> TestResult {
    let addr = unused_local_addr().to_string();
    let policy = RetryPolicy {
        attempts: 1,
        initial_delay: Duration::from_secs(30),
    };

    let started = Instant::now();
    let err = with_timeout(connect_with_retry(&addr, &policy, &CancellationToken::new()))
        .await
        .expect_err("nothing listens there");

    assert!(matches!(err, ConnectError::Exhausted { attempts: 1, .. }));
    assert!(started.elapsed() < Duration::from_secs(1));
    Ok(())
}

#[tokio::test]
async fn succeeds_on_the_attempt_after_the_listener_appears() -> TestResult {
    init_tracing();

    // Dials happen at ~0 ms, ~100-110 ms and ~300-330 ms. The port opens at
    // 200 ms, so the first two fail and the third, last one must connect.
    let addr = unused_local_addr();
    let binder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let listener = TcpListener::bind(addr).await.expect("rebind reserved port");
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(listener);
    });

    let policy = RetryPolicy {
        attempts: 3,
        initial_delay: Duration::from_millis(100),
    };
    let started = Instant::now();
    with_timeout(connect_with_retry(
        &addr.to_string(),
        &policy,
        &CancellationToken::new(),
    ))
    .await?;
    let elapsed = started.elapsed();

    assert!(
        elapsed >= Duration::from_millis(300),
        "connected after {elapsed:?}, before the listener existed"
    );
    assert!(elapsed <= policy.max_total_delay() + Duration::from_millis(200));

    binder.abort();
    Ok(())
}

#[tokio::test]
async fn cancellation_interrupts_the_wait() -> TestResult {
    init_tracing();

    let addr = unused_local_addr().to_string();
    let policy = RetryPolicy {
        attempts: 5,
        initial_delay: Duration::from_secs(30),
    };
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = with_timeout(connect_with_retry(&addr, &policy, &cancel))
        .await
        .expect_err("cancelled before any success");

    assert!(matches!(err, ConnectError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[test]
fn backoff_doubles_with_bounded_jitter() {
    let policy = RetryPolicy {
        attempts: 4,
        initial_delay: Duration::from_millis(100),
    };

    assert_eq!(policy.base_delay(0), Duration::from_millis(100));
    assert_eq!(policy.base_delay(1), Duration::from_millis(200));
    assert_eq!(policy.base_delay(3), Duration::from_millis(800));

    for attempt in 0..4 {
        let base = policy.base_delay(attempt);
        let jittered = policy.jittered_delay(attempt);
        assert!(jittered >= base);
        assert!(jittered <= base + base / 10 + Duration::from_micros(1));
    }

    // Sleeps happen between attempts only: 100 + 200 + 400, plus jitter.
    let max = policy.max_total_delay();
    assert!(max >= Duration::from_millis(700));
    assert!(max <= Duration::from_millis(771));
}

#[test]
fn huge_attempt_numbers_saturate() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.base_delay(u32::MAX), Duration::MAX);
}
