// src/supervisor/core.rs

//! Pure supervisor state machine.
//!
//! [`SupervisorCore`] consumes [`SupervisorEvent`]s and returns the
//! [`SupervisorCommand`]s the IO shell should execute next. It owns no
//! processes, channels or timers, so every transition can be unit tested.
//!
//! ```text
//! Idle ─Launch─► Building ─ok─► Starting ─ok─► Running
//!                   │  ▲                          │
//!                   │  └──────RestartRequested────┘
//!                   ├─ok (instance running)─► Stopping ─► Starting ─► Confirming ─► Running
//!                   └─failed─► Exited (first build) | back to Running/Idle (later builds)
//! ```

use tracing::{debug, info, warn};

use super::{BuildOutcome, Readiness, StartOutcome, StopOutcome};

/// Where the supervisor is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing running, waiting for the first launch or the next trigger.
    Idle,
    Building,
    Stopping,
    Starting,
    /// New instance started after a restart; probing before notifying.
    Confirming,
    Running,
    Exited,
}

/// Why the supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The first build failed; there was never a server to fall back to.
    InitialBuildFailed,
    Shutdown,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Program start: perform the first build.
    Launch,
    /// Operator asked for a rebuild and restart.
    RestartRequested,
    BuildFinished(BuildOutcome),
    Stopped(StopOutcome),
    Started(StartOutcome),
    ReadinessChecked(Readiness),
    ShutdownRequested,
}

/// Work the IO shell must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    RunBuild,
    StopServer,
    StartServer,
    ConfirmReady,
    NotifyReload,
    Exit(ExitReason),
}

/// Decision returned for a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStep {
    pub commands: Vec<SupervisorCommand>,
    pub keep_running: bool,
}

impl SupervisorStep {
    fn run(commands: Vec<SupervisorCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    fn idle() -> Self {
        Self::run(Vec::new())
    }

    fn exit(reason: ExitReason) -> Self {
        Self {
            commands: vec![SupervisorCommand::Exit(reason)],
            keep_running: false,
        }
    }
}

#[derive(Debug)]
pub struct SupervisorCore {
    phase: Phase,
    has_instance: bool,
    build_attempts: u32,
    ever_built: bool,
    /// Current cycle was started by a restart trigger.
    restarting: bool,
    shutting_down: bool,
}

impl Default for SupervisorCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorCore {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            has_instance: false,
            build_attempts: 0,
            ever_built: false,
            restarting: false,
            shutting_down: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn has_instance(&self) -> bool {
        self.has_instance
    }

    pub fn build_attempts(&self) -> u32 {
        self.build_attempts
    }

    pub fn ever_built(&self) -> bool {
        self.ever_built
    }

    /// Whether a new restart cycle may begin.
    pub fn is_settled(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Running)
    }

    pub fn step(&mut self, event: SupervisorEvent) -> SupervisorStep {
        debug!(phase = ?self.phase, ?event, "supervisor core step");

        match event {
            SupervisorEvent::Launch => self.on_launch(),
            SupervisorEvent::RestartRequested => self.on_restart(),
            SupervisorEvent::BuildFinished(outcome) => self.on_build_finished(outcome),
            SupervisorEvent::Stopped(outcome) => self.on_stopped(outcome),
            SupervisorEvent::Started(outcome) => self.on_started(outcome),
            SupervisorEvent::ReadinessChecked(readiness) => self.on_readiness(readiness),
            SupervisorEvent::ShutdownRequested => self.on_shutdown(),
        }
    }

    fn begin_build(&mut self, restarting: bool) -> SupervisorStep {
        self.build_attempts += 1;
        self.restarting = restarting;
        self.phase = Phase::Building;
        SupervisorStep::run(vec![SupervisorCommand::RunBuild])
    }

    fn on_launch(&mut self) -> SupervisorStep {
        if self.phase != Phase::Idle || self.build_attempts > 0 {
            warn!(phase = ?self.phase, "launch requested twice; ignoring");
            return SupervisorStep::idle();
        }
        self.begin_build(false)
    }

    fn on_restart(&mut self) -> SupervisorStep {
        if !self.is_settled() || self.shutting_down {
            debug!(phase = ?self.phase, "restart requested mid-cycle; ignoring");
            return SupervisorStep::idle();
        }
        info!("restarting");
        self.begin_build(true)
    }

    fn on_build_finished(&mut self, outcome: BuildOutcome) -> SupervisorStep {
        if self.phase != Phase::Building {
            warn!(phase = ?self.phase, ?outcome, "unexpected build result; ignoring");
            return SupervisorStep::idle();
        }

        match outcome {
            BuildOutcome::Failed(code) if !self.ever_built => {
                warn!(?code, "first build failed; nothing to fall back to");
                self.phase = Phase::Exited;
                SupervisorStep::exit(ExitReason::InitialBuildFailed)
            }
            BuildOutcome::Failed(code) => {
                // Connected browsers are deliberately not told about this.
                warn!(
                    ?code,
                    keep_running = self.has_instance,
                    "build failed; keeping previous server"
                );
                self.restarting = false;
                self.phase = self.settled_phase();
                SupervisorStep::idle()
            }
            BuildOutcome::Success => {
                self.ever_built = true;
                if self.has_instance {
                    self.phase = Phase::Stopping;
                    SupervisorStep::run(vec![SupervisorCommand::StopServer])
                } else {
                    self.phase = Phase::Starting;
                    SupervisorStep::run(vec![SupervisorCommand::StartServer])
                }
            }
        }
    }

    fn on_stopped(&mut self, outcome: StopOutcome) -> SupervisorStep {
        if self.phase != Phase::Stopping {
            warn!(phase = ?self.phase, ?outcome, "unexpected stop result; ignoring");
            return SupervisorStep::idle();
        }

        self.has_instance = false;

        if self.shutting_down {
            self.phase = Phase::Exited;
            return SupervisorStep::exit(ExitReason::Shutdown);
        }

        self.phase = Phase::Starting;
        SupervisorStep::run(vec![SupervisorCommand::StartServer])
    }

    fn on_started(&mut self, outcome: StartOutcome) -> SupervisorStep {
        if self.phase != Phase::Starting {
            warn!(phase = ?self.phase, ?outcome, "unexpected start result; ignoring");
            return SupervisorStep::idle();
        }

        match outcome {
            StartOutcome::Started { .. } => {
                self.has_instance = true;
                if self.restarting {
                    self.phase = Phase::Confirming;
                    SupervisorStep::run(vec![SupervisorCommand::ConfirmReady])
                } else {
                    self.phase = Phase::Running;
                    SupervisorStep::idle()
                }
            }
            StartOutcome::Failed(_) => {
                self.has_instance = false;
                self.restarting = false;
                self.phase = Phase::Idle;
                SupervisorStep::idle()
            }
        }
    }

    fn on_readiness(&mut self, readiness: Readiness) -> SupervisorStep {
        if self.phase != Phase::Confirming {
            warn!(phase = ?self.phase, ?readiness, "unexpected readiness result; ignoring");
            return SupervisorStep::idle();
        }

        self.restarting = false;
        self.phase = Phase::Running;

        match readiness {
            Readiness::Ready => SupervisorStep::run(vec![SupervisorCommand::NotifyReload]),
            Readiness::Unreachable | Readiness::Cancelled => SupervisorStep::idle(),
        }
    }

    fn on_shutdown(&mut self) -> SupervisorStep {
        self.shutting_down = true;

        if self.has_instance {
            self.phase = Phase::Stopping;
            SupervisorStep::run(vec![SupervisorCommand::StopServer])
        } else {
            self.phase = Phase::Exited;
            SupervisorStep::exit(ExitReason::Shutdown)
        }
    }

    fn settled_phase(&self) -> Phase {
        if self.has_instance {
            Phase::Running
        } else {
            Phase::Idle
        }
    }
}
