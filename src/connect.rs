// src/connect.rs

//! Bounded, cancellable TCP reachability probe.
//!
//! Used by the supervisor to wait until a freshly started server accepts
//! connections. Each attempt is a bare connect/close; no bytes are exchanged.
//!
//! The delay after failed attempt `n` (0-indexed) is
//! `initial_delay * 2^n` plus a uniform jitter of up to 10% of that value.

use std::io;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Upper bound of the jitter, as a fraction of the base delay.
const JITTER_FRACTION: f64 = 0.1;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("operation failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

/// Attempt budget and backoff base for [`connect_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Base delay (without jitter) after failed attempt `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if secs.is_finite() {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        }
    }

    /// Base delay plus a random jitter in `[0, 10%]` of it.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = rand::rng().random::<f64>() * JITTER_FRACTION;
        let extra = Duration::try_from_secs_f64(base.as_secs_f64() * jitter).unwrap_or_default();
        base.saturating_add(extra)
    }

    /// Longest total time [`connect_with_retry`] can spend sleeping.
    pub fn max_total_delay(&self) -> Duration {
        (0..self.attempts.saturating_sub(1))
            .map(|a| {
                let secs = self.base_delay(a).as_secs_f64() * (1.0 + JITTER_FRACTION);
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            })
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}

/// Dial `addr` until it accepts a connection, the budget is exhausted, or
/// `cancel` fires.
///
/// Cancellation only interrupts a pending wait; a dial already in flight
/// runs to completion first.
pub async fn connect_with_retry(
    addr: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(), ConnectError> {
    let mut last_err = io::Error::new(io::ErrorKind::NotConnected, "no connection attempt made");

    for attempt in 0..policy.attempts {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                drop(stream);
                debug!(%addr, attempt, "upstream accepted connection");
                return Ok(());
            }
            Err(err) => {
                trace!(%addr, attempt, error = %err, "connect attempt failed");
                last_err = err;
            }
        }

        // No point sleeping once the budget is spent.
        if attempt + 1 == policy.attempts {
            break;
        }

        let delay = policy.jittered_delay(attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                debug!(%addr, attempt, "connect retry cancelled");
                return Err(ConnectError::Cancelled);
            }
        }
    }

    Err(ConnectError::Exhausted {
        attempts: policy.attempts,
        source: last_err,
    })
}
