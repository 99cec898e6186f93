// tests/trigger.rs

mod common;
use crate::common::{TestResult, init_tracing, with_timeout};

use devloop::trigger::forward_lines;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn one_trigger_per_line_then_close() -> TestResult {
    init_tracing();

    let (tx, mut rx) = mpsc::channel(8);
    let input: &[u8] = b"\nagain\n\n";

    with_timeout(forward_lines(input, tx, CancellationToken::new())).await;

    let mut count = 0;
    while let Some(()) = rx.recv().await {
        count += 1;
    }
    assert_eq!(count, 3);
    Ok(())
}

#[tokio::test]
async fn unterminated_last_line_still_counts() -> TestResult {
    let (tx, mut rx) = mpsc::channel(8);
    let input: &[u8] = b"go";

    with_timeout(forward_lines(input, tx, CancellationToken::new())).await;

    assert_eq!(rx.recv().await, Some(()));
    assert_eq!(rx.recv().await, None);
    Ok(())
}

#[tokio::test]
async fn stops_on_shutdown() -> TestResult {
    init_tracing();

    let (tx, mut rx) = mpsc::channel(8);
    // A reader that never produces a line.
    let (_writer, reader) = tokio::io::duplex(64);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    with_timeout(forward_lines(tokio::io::BufReader::new(reader), tx, shutdown)).await;
    assert_eq!(rx.recv().await, None);
    Ok(())
}

#[tokio::test]
async fn stops_when_supervisor_is_gone() -> TestResult {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let input: &[u8] = b"\n\n\n";
    with_timeout(forward_lines(input, tx, CancellationToken::new())).await;
    Ok(())
}
