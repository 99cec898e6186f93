// src/supervisor/runtime.rs

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcast::Broadcaster;
use crate::connect::{ConnectError, connect_with_retry};
use crate::errors::{DevloopError, Result};
use crate::types::UpstreamAddr;
use crate::watch::FsEventBatch;

use super::core::{ExitReason, SupervisorCommand, SupervisorCore, SupervisorEvent};
use super::{
    CommandTemplate, ManagedProcess, Readiness, StartOutcome, StopOutcome, SupervisorBackend,
    SupervisorOptions,
};

/// Async shell around [`SupervisorCore`].
///
/// Owns the running server handle exclusively. Restart triggers are read
/// from `triggers` one at a time; anything arriving while a cycle runs waits
/// in the channel until the cycle is over. Closing the trigger channel only
/// disables restarts; shutdown comes from the cancellation token.
pub struct Supervisor<B: SupervisorBackend> {
    core: SupervisorCore,
    backend: B,
    server_cmd: CommandTemplate,
    upstream: UpstreamAddr,
    options: SupervisorOptions,
    reload: Broadcaster<FsEventBatch>,
    triggers: mpsc::Receiver<()>,
    shutdown: CancellationToken,
    current: Option<B::Process>,
}

impl<B: SupervisorBackend> fmt::Debug for Supervisor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("core", &self.core)
            .field("server_cmd", &self.server_cmd.raw())
            .field("upstream", &self.upstream.to_string())
            .finish_non_exhaustive()
    }
}

impl<B: SupervisorBackend> Supervisor<B> {
    pub fn new(
        backend: B,
        server_cmd: CommandTemplate,
        upstream: UpstreamAddr,
        options: SupervisorOptions,
        reload: Broadcaster<FsEventBatch>,
        triggers: mpsc::Receiver<()>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            core: SupervisorCore::new(),
            backend,
            server_cmd,
            upstream,
            options,
            reload,
            triggers,
            shutdown,
            current: None,
        }
    }

    /// Build and start the server, then serve restart triggers until
    /// shutdown.
    ///
    /// Returns [`DevloopError::InitialBuildFailed`] if the very first build
    /// fails. On shutdown the running server is stopped before returning.
    pub async fn run(mut self) -> Result<()> {
        info!(cmd = %self.server_cmd, upstream = %self.upstream, "supervisor started");

        if !self.drive(SupervisorEvent::Launch).await? {
            return Ok(());
        }

        let mut triggers_open = true;
        loop {
            let event = tokio::select! {
                trigger = self.triggers.recv(), if triggers_open => match trigger {
                    Some(()) => SupervisorEvent::RestartRequested,
                    None => {
                        debug!("restart trigger channel closed; restarts disabled");
                        triggers_open = false;
                        continue;
                    }
                },
                _ = self.shutdown.cancelled() => SupervisorEvent::ShutdownRequested,
            };

            if !self.drive(event).await? {
                break;
            }
        }

        info!("supervisor exiting");
        Ok(())
    }

    /// Feed `event` into the core and execute commands until the cycle
    /// settles. Returns `false` once the core asks to stop.
    async fn drive(&mut self, event: SupervisorEvent) -> Result<bool> {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let step = self.core.step(event);

            for command in step.commands {
                if let Some(next) = self.execute(command).await? {
                    pending.push_back(next);
                }
            }

            if !step.keep_running {
                return Ok(false);
            }
        }

        Ok(true)
    }

    async fn execute(&mut self, command: SupervisorCommand) -> Result<Option<SupervisorEvent>> {
        debug!(?command, "executing supervisor command");

        let event = match command {
            SupervisorCommand::RunBuild => self.build().await,
            SupervisorCommand::StopServer => SupervisorEvent::Stopped(self.stop().await),
            SupervisorCommand::StartServer => SupervisorEvent::Started(self.start()),
            SupervisorCommand::ConfirmReady => {
                SupervisorEvent::ReadinessChecked(self.confirm_ready().await)
            }
            SupervisorCommand::NotifyReload => {
                info!(listeners = self.reload.len(), "server ready; notifying browsers");
                self.reload.broadcast(FsEventBatch::default());
                return Ok(None);
            }
            SupervisorCommand::Exit(ExitReason::InitialBuildFailed) => {
                error!("build failed");
                return Err(DevloopError::InitialBuildFailed);
            }
            SupervisorCommand::Exit(ExitReason::Shutdown) => return Ok(None),
        };

        Ok(Some(event))
    }

    async fn build(&mut self) -> SupervisorEvent {
        let started = Instant::now();
        info!(attempt = self.core.build_attempts(), "building");

        tokio::select! {
            outcome = self.backend.build() => {
                info!(elapsed = ?started.elapsed(), ?outcome, "build done");
                SupervisorEvent::BuildFinished(outcome)
            }
            _ = self.shutdown.cancelled() => {
                info!("shutdown requested during build; abandoning build");
                SupervisorEvent::ShutdownRequested
            }
        }
    }

    /// Request a graceful stop and wait up to the grace period.
    async fn stop(&mut self) -> StopOutcome {
        let Some(mut process) = self.current.take() else {
            return StopOutcome::Exited;
        };

        let pid = process.id();
        info!(?pid, "stopping server");

        if let Err(err) = process.request_stop() {
            warn!(?pid, error = %err, "failed to request server stop");
        }

        let outcome = process.wait_for_exit(self.options.stop_grace).await;
        match outcome {
            StopOutcome::Exited => info!(?pid, "stopped server"),
            StopOutcome::TimedOut => warn!(
                ?pid,
                grace = ?self.options.stop_grace,
                "server stop timeout; continuing without it"
            ),
        }

        // Dropping the handle kills whatever is left of the process.
        drop(process);
        outcome
    }

    fn start(&mut self) -> StartOutcome {
        let argv = self.server_cmd.render(&self.upstream);

        match self.backend.launch(&argv) {
            Ok(process) => {
                let pid = process.id();
                info!(?pid, ?argv, "started server");
                info!("hit Enter to rebuild and restart");
                self.current = Some(process);
                StartOutcome::Started { pid }
            }
            Err(err) => {
                error!(?argv, error = %err, "server error");
                StartOutcome::Failed(err.to_string())
            }
        }
    }

    async fn confirm_ready(&mut self) -> Readiness {
        let addr = self.upstream.to_string();
        let cancel = self.shutdown.child_token();

        match connect_with_retry(&addr, &self.options.retry, &cancel).await {
            Ok(()) => Readiness::Ready,
            Err(ConnectError::Cancelled) => Readiness::Cancelled,
            Err(err @ ConnectError::Exhausted { .. }) => {
                warn!(%addr, error = %err, "server did not come up; skipping reload");
                Readiness::Unreachable
            }
        }
    }
}
