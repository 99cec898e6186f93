// src/supervisor/mod.rs

//! Build / restart supervision of the upstream server.
//!
//! The supervisor sequences build → stop old → start new → confirm ready →
//! notify, one restart trigger at a time.
//!
//! - [`core`] is the pure state machine: events in, commands out, no IO.
//! - [`runtime`] is the async shell that executes those commands.
//! - [`process`] is the production backend (`tokio::process`, SIGTERM).
//! - [`command`] parses command templates and substitutes placeholders.
//!
//! The shell only talks to processes through [`SupervisorBackend`] and
//! [`ManagedProcess`], so tests can drive it without spawning anything.

pub mod command;
pub mod core;
pub mod process;
pub mod runtime;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::connect::RetryPolicy;
use crate::errors::Result;

pub use self::core::{
    ExitReason, Phase, SupervisorCommand, SupervisorCore, SupervisorEvent, SupervisorStep,
};
pub use command::{CommandTemplate, TemplateError};
pub use process::{ProcessBackend, ServerProcess};
pub use runtime::Supervisor;

/// Boxed future used at the backend seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of running the build command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    /// Exit code of the build, `None` if it could not be spawned or was
    /// killed by a signal.
    Failed(Option<i32>),
}

/// Result of waiting for a process to exit after a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Exited,
    TimedOut,
}

/// Result of trying to launch the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: Option<u32> },
    Failed(String),
}

/// Result of the post-restart readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Unreachable,
    Cancelled,
}

/// A running server instance.
pub trait ManagedProcess: Send {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Ask the process to terminate gracefully. Does not wait.
    fn request_stop(&mut self) -> Result<()>;

    /// Wait until the process has exited, giving up after `timeout`.
    fn wait_for_exit(&mut self, timeout: Duration) -> BoxFuture<'_, StopOutcome>;
}

/// How the supervisor builds and launches the server.
pub trait SupervisorBackend: Send {
    type Process: ManagedProcess;

    /// Run the (opaque) build step.
    fn build(&mut self) -> BoxFuture<'_, BuildOutcome>;

    /// Launch the server from an already rendered argv.
    fn launch(&mut self, argv: &[String]) -> Result<Self::Process>;
}

/// Tunables for the supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// How long a stopping server may take before we give up waiting.
    pub stop_grace: Duration,
    /// Readiness probe budget after a restart.
    pub retry: RetryPolicy,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}
