// src/signals.rs

//! Ctrl-C / SIGTERM handling.
//!
//! The first signal starts a graceful shutdown. A further signal while
//! shutting down (for example during the server's stop grace period)
//! exits immediately.

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit status after a forced exit, as for a process killed by SIGINT.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Complete when the process is asked to terminate.
///
/// Unix: SIGINT, SIGTERM or SIGQUIT. Elsewhere: Ctrl-C only.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => info!(signal = "SIGINT", "shutdown requested"),
        _ = sigterm.recv() => info!(signal = "SIGTERM", "shutdown requested"),
        _ = sigquit.recv() => info!(signal = "SIGQUIT", "shutdown requested"),
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "ctrl-c", "shutdown requested");
    Ok(())
}

/// Every termination signal the process receives, one item each. Ends if
/// the handlers cannot be installed.
pub fn os_signals() -> impl Stream<Item = ()> + Send {
    futures::stream::unfold((), |()| async {
        match wait_for_shutdown_signal().await {
            Ok(()) => Some(((), ())),
            Err(err) => {
                warn!(error = %err, "failed to listen for shutdown signals");
                None
            }
        }
    })
}

/// How [`handle_signals`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal source ended; nothing more to do.
    Ended,
    /// A signal arrived while already shutting down.
    Forced,
}

/// Cancel `shutdown` on the first signal, then wait for another one.
///
/// If `shutdown` is cancelled by someone else first, the next signal
/// already counts as the second one.
pub async fn handle_signals<S>(signals: S, shutdown: CancellationToken) -> SignalOutcome
where
    S: Stream<Item = ()>,
{
    tokio::pin!(signals);

    tokio::select! {
        signal = signals.next() => match signal {
            Some(()) => shutdown.cancel(),
            None => return SignalOutcome::Ended,
        },
        _ = shutdown.cancelled() => {}
    }

    match signals.next().await {
        Some(()) => {
            warn!("shutdown signal received while shutting down; exiting now");
            SignalOutcome::Forced
        }
        None => SignalOutcome::Ended,
    }
}

/// Run [`handle_signals`] over the process's signals, exiting the process
/// with [`FORCED_EXIT_CODE`] on a second signal.
pub fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if handle_signals(os_signals(), shutdown).await == SignalOutcome::Forced {
            std::process::exit(FORCED_EXIT_CODE);
        }
    });
}
