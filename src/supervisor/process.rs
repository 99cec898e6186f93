// src/supervisor/process.rs

//! Production backend: real builds and server processes via
//! `tokio::process`.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::errors::Result;

use super::{
    BoxFuture, BuildOutcome, CommandTemplate, ManagedProcess, StopOutcome, SupervisorBackend,
};

/// Spawns the build command and the server as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessBackend {
    build_cmd: Option<CommandTemplate>,
}

impl ProcessBackend {
    /// `build_cmd = None` skips the build step entirely.
    pub fn new(build_cmd: Option<CommandTemplate>) -> Self {
        Self { build_cmd }
    }
}

impl SupervisorBackend for ProcessBackend {
    type Process = ServerProcess;

    fn build(&mut self) -> BoxFuture<'_, BuildOutcome> {
        let build_cmd = self.build_cmd.clone();
        Box::pin(async move {
            match build_cmd {
                Some(cmd) => run_build(&cmd).await,
                None => BuildOutcome::Success,
            }
        })
    }

    fn launch(&mut self, argv: &[String]) -> Result<ServerProcess> {
        ServerProcess::spawn(argv)
    }
}

/// Run the build command to completion, logging its output line by line.
async fn run_build(cmd: &CommandTemplate) -> BuildOutcome {
    let args = cmd.args();
    info!(cmd = %cmd, "running build command");

    let mut command = Command::new(&args[0]);
    command
        .args(&args[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(cmd = %cmd, error = %err, "build error: could not spawn build command");
            return BuildOutcome::Failed(None);
        }
    };

    let stdout = child.stdout.take().map(|s| forward_lines(s, "stdout"));
    let stderr = child.stderr.take().map(|s| forward_lines(s, "stderr"));

    let status = child.wait().await;

    // Drain whatever the build printed before reporting the result.
    for handle in [stdout, stderr].into_iter().flatten() {
        let _ = handle.await;
    }

    match status {
        Ok(status) if status.success() => BuildOutcome::Success,
        Ok(status) => {
            warn!(cmd = %cmd, exit_code = ?status.code(), "build error: command failed");
            BuildOutcome::Failed(status.code())
        }
        Err(err) => {
            error!(cmd = %cmd, error = %err, "build error: waiting for build command");
            BuildOutcome::Failed(None)
        }
    }
}

fn forward_lines<R>(reader: R, stream: &'static str) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "devloop::build", stream, "{line}");
        }
    })
}

/// A running server child process.
///
/// The child is owned by a background task that waits for it to exit and
/// flips the `done` signal. Dropping the handle kills the process if it is
/// still alive.
#[derive(Debug)]
pub struct ServerProcess {
    pid: Option<u32>,
    done: watch::Receiver<bool>,
    kill: Option<oneshot::Sender<()>>,
}

impl ServerProcess {
    /// Spawn `argv[0]` with the remaining arguments, inheriting stdio.
    pub fn spawn(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .context("server command is empty")?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawning server process {program:?}"))?;

        Ok(Self::watch(child))
    }

    fn watch(mut child: Child) -> Self {
        let pid = child.id();
        let (done_tx, done_rx) = watch::channel(false);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    debug!(?pid, "server handle released; killing process");
                    if let Err(err) = child.start_kill() {
                        debug!(?pid, error = %err, "kill failed; process probably gone");
                    }
                    child.wait().await
                }
            };
            report_exit(pid, status);
            let _ = done_tx.send(true);
        });

        Self {
            pid,
            done: done_rx,
            kill: Some(kill_tx),
        }
    }

    pub fn has_exited(&self) -> bool {
        *self.done.borrow()
    }
}

fn report_exit(pid: Option<u32>, status: std::io::Result<ExitStatus>) {
    match status {
        Ok(status) if status.success() => info!(?pid, "server exited"),
        Ok(status) => match status.code() {
            Some(code) => warn!(?pid, exit_code = code, "server error: exited with failure"),
            None => info!(?pid, "server terminated by signal"),
        },
        Err(err) => error!(?pid, error = %err, "server error: waiting for process"),
    }
}

impl ManagedProcess for ServerProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn request_stop(&mut self) -> Result<()> {
        if self.has_exited() {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };

        info!(pid, "sending SIGTERM");
        terminate(pid, &mut self.kill)
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

impl Drop for ServerProcess {
    fn drop(&mut self) {
        release_kill(&mut self.kill);
    }
}

/// Fire the kill switch, at most once. Later calls are no-ops.
fn release_kill(kill: &mut Option<oneshot::Sender<()>>) -> bool {
    match kill.take() {
        Some(tx) => tx.send(()).is_ok(),
        None => false,
    }
}

#[cfg(unix)]
fn terminate(pid: u32, _kill: &mut Option<oneshot::Sender<()>>) -> Result<()> {
    let pid = libc::pid_t::try_from(pid).context("pid out of range")?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: already gone.
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err.into());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate(_pid: u32, kill: &mut Option<oneshot::Sender<()>>) -> Result<()> {
    // No graceful signal available; fall back to killing the process.
    release_kill(kill);
    Ok(())
}
