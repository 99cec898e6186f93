//! Scripted [`SupervisorBackend`] for supervisor tests.
//!
//! Builds return pre-programmed outcomes. "Servers" are tasks that bind a
//! real TCP listener on the address passed as their first argument, so the
//! supervisor's readiness probe sees them come and go like real processes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use devloop::errors::{DevloopError, Result};
use devloop::supervisor::{BoxFuture, BuildOutcome, ManagedProcess, StopOutcome, SupervisorBackend};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

/// Something the supervisor asked the backend to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Build,
    Launch(Vec<String>),
    /// Graceful stop requested for the fake process with this pid.
    Stop(u32),
}

/// Shared, ordered record of backend calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<BackendCall>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: BackendCall) {
        self.0.lock().unwrap().push(call);
    }

    pub fn snapshot(&self) -> Vec<BackendCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn builds(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Build))
    }

    pub fn launches(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Launch(_)))
    }

    pub fn stops(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Stop(_)))
    }

    fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

pub struct FakeBackend {
    builds: VecDeque<BuildOutcome>,
    calls: CallLog,
    bind_delay: Duration,
    ignore_stop: bool,
    next_pid: u32,
}

impl FakeBackend {
    /// Every build succeeds and servers bind immediately.
    pub fn new(calls: CallLog) -> Self {
        Self {
            builds: VecDeque::new(),
            calls,
            bind_delay: Duration::ZERO,
            ignore_stop: false,
            next_pid: 1000,
        }
    }

    /// Outcomes for the next builds, in order; later builds succeed.
    pub fn with_builds(mut self, outcomes: impl IntoIterator<Item = BuildOutcome>) -> Self {
        self.builds.extend(outcomes);
        self
    }

    /// Servers start listening only after `delay`.
    pub fn with_bind_delay(mut self, delay: Duration) -> Self {
        self.bind_delay = delay;
        self
    }

    /// Servers ignore graceful stop requests.
    pub fn ignoring_stop(mut self) -> Self {
        self.ignore_stop = true;
        self
    }
}

impl SupervisorBackend for FakeBackend {
    type Process = FakeProcess;

    fn build(&mut self) -> BoxFuture<'_, BuildOutcome> {
        self.calls.push(BackendCall::Build);
        let outcome = self.builds.pop_front().unwrap_or(BuildOutcome::Success);
        Box::pin(async move { outcome })
    }

    fn launch(&mut self, argv: &[String]) -> Result<FakeProcess> {
        self.calls.push(BackendCall::Launch(argv.to_vec()));
        let addr = argv.get(1).cloned().ok_or_else(|| {
            DevloopError::Config("fake server needs an address argument".to_string())
        })?;

        self.next_pid += 1;
        Ok(FakeProcess::spawn(
            self.next_pid,
            addr,
            self.bind_delay,
            self.ignore_stop,
            self.calls.clone(),
        ))
    }
}

/// A fake server: a task holding a TCP listener until told to stop.
pub struct FakeProcess {
    pid: u32,
    ignore_stop: bool,
    calls: CallLog,
    stop_tx: Option<oneshot::Sender<()>>,
    done: watch::Receiver<bool>,
}

impl FakeProcess {
    fn spawn(pid: u32, addr: String, delay: Duration, ignore_stop: bool, calls: CallLog) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(async move {
            let serve = async {
                tokio::time::sleep(delay).await;
                match TcpListener::bind(&addr).await {
                    Ok(listener) => {
                        debug!(pid, %addr, "fake server listening");
                        let _held = listener;
                        std::future::pending::<()>().await;
                    }
                    Err(err) => warn!(pid, %addr, error = %err, "fake server could not bind"),
                }
            };

            tokio::select! {
                _ = serve => {}
                // Fires on an explicit stop and when the handle is dropped.
                _ = stop_rx => {}
            }
            debug!(pid, "fake server exited");
            let _ = done_tx.send(true);
        });

        Self {
            pid,
            ignore_stop,
            calls,
            stop_tx: Some(stop_tx),
            done: done_rx,
        }
    }

    pub fn has_exited(&self) -> bool {
        *self.done.borrow()
    }
}

impl ManagedProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn request_stop(&mut self) -> Result<()> {
        self.calls.push(BackendCall::Stop(self.pid));
        if !self.ignore_stop {
            if let Some(tx) = self.stop_tx.take() {
                let _ = tx.send(());
            }
        }
        Ok(())
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> BoxFuture<'_, StopOutcome> {
        let mut done = self.done.clone();
        Box::pin(async move {
            let exited = async move {
                while !*done.borrow_and_update() {
                    if done.changed().await.is_err() {
                        break;
                    }
                }
            };
            match tokio::time::timeout(timeout, exited).await {
                Ok(()) => StopOutcome::Exited,
                Err(_) => StopOutcome::TimedOut,
            }
        })
    }
}
