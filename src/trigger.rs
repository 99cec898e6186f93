// src/trigger.rs

//! Operator restart trigger: every line read from stdin asks for one
//! rebuild and restart.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Read lines from `input` until EOF or shutdown, sending one trigger per
/// line. Dropping `tx` on return tells the supervisor no more triggers
/// will come.
pub async fn forward_lines<R>(input: R, tx: mpsc::Sender<()>, shutdown: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.cancelled() => break,
        };

        match line {
            Ok(Some(_)) => {
                if tx.send(()).await.is_err() {
                    debug!("supervisor gone; stopping restart trigger");
                    break;
                }
            }
            Ok(None) => {
                debug!("restart trigger input closed");
                break;
            }
            Err(err) => {
                warn!(error = %err, "reading restart trigger input");
                break;
            }
        }
    }
}

/// Spawn [`forward_lines`] over the process's stdin.
pub fn spawn_stdin_trigger(
    tx: mpsc::Sender<()>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        forward_lines(BufReader::new(tokio::io::stdin()), tx, shutdown).await;
    })
}
