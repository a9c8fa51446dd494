//! The supervisor state machine.
//!
//! One task owns the status and the live process. Commands and internal
//! events share one queue and are handled one at a time in arrival order.
//! No handler awaits: every transition is complete before the next message
//! is looked at.

use std::sync::Arc;

use loralab_core::{
    CommandError, ErrorCategory, HealthReport, LaunchSpec, LogLine, ManagedProcess, ProcessExit,
    ResolutionError, ServiceConfig, ServiceState, ServiceStatus, SupervisorEvent,
    TerminationSignal,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::SupervisorComponents;
use super::tasks::{process_callback, schedule, spawn_probe_loop};
use crate::logs::LogRing;
use crate::signatures::FailureSignature;

pub(super) type Reply = oneshot::Sender<Result<ServiceStatus, CommandError>>;

/// Request from a [`ServiceSupervisor`](super::ServiceSupervisor) handle.
pub(super) enum Command {
    Start(Reply),
    Stop(Reply),
    Restart(Reply),
}

/// Everything the actor reacts to, in one queue.
pub(super) enum Message {
    Command(Command),
    Internal(Internal),
}

/// Event produced by the supervisor's own tasks and process callbacks.
#[derive(Debug)]
pub(super) enum Internal {
    Output { generation: u64, line: LogLine },
    Exited { generation: u64, exit: ProcessExit },
    Probe { generation: u64, report: HealthReport },
    StartupDeadline { generation: u64 },
    GraceExpired { generation: u64 },
    BackoffElapsed { generation: u64 },
}

/// Why the supervisor is terminating a process on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Doom {
    /// `stop()` or `restart()`: the exit ends in Stopped.
    Stop,
    /// Never became healthy: the exit is a crash.
    StartupTimeout,
    /// Could not bind: the exit triggers a relaunch on the next port.
    PortConflict,
}

struct LiveProcess {
    generation: u64,
    process: Box<dyn ManagedProcess>,
    port: u16,
    probes: CancellationToken,
    doomed: Option<Doom>,
    last_line: Option<String>,
    signature: Option<FailureSignature>,
}

pub(super) struct SupervisorActor {
    config: ServiceConfig,
    components: SupervisorComponents,
    status: ServiceStatus,
    status_tx: watch::Sender<ServiceStatus>,
    events_tx: broadcast::Sender<SupervisorEvent>,
    logs: Arc<LogRing>,
    internal_tx: mpsc::WeakUnboundedSender<Message>,
    live: Option<LiveProcess>,
    next_generation: u64,
    /// Generation of the pending backoff timer while Restarting.
    backoff: Option<u64>,
    /// Launch again once the current stop completes.
    start_after_stop: bool,
    /// The one port-conflict relaunch of the current start sequence is spent.
    port_retry_used: bool,
}

impl SupervisorActor {
    pub(super) fn new(
        config: ServiceConfig,
        components: SupervisorComponents,
        status_tx: watch::Sender<ServiceStatus>,
        events_tx: broadcast::Sender<SupervisorEvent>,
        logs: Arc<LogRing>,
        internal_tx: mpsc::WeakUnboundedSender<Message>,
    ) -> Self {
        Self {
            config,
            components,
            status: ServiceStatus::stopped(),
            status_tx,
            events_tx,
            logs,
            internal_tx,
            live: None,
            next_generation: 0,
            backoff: None,
            start_after_stop: false,
            port_retry_used: false,
        }
    }

    /// Handle messages until every handle is dropped.
    pub(super) async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Message>) {
        info!(mode = %self.config.mode, platform = %self.config.platform, "Service supervisor started");

        while let Some(message) = inbox.recv().await {
            match message {
                Message::Command(command) => self.handle_command(command),
                Message::Internal(event) => self.handle_internal(event),
            }
        }

        self.abandon();
    }

    // ----- commands -----

    fn handle_command(&mut self, command: Command) {
        let (reply, result) = match command {
            Command::Start(reply) => (reply, self.start()),
            Command::Stop(reply) => (reply, self.stop()),
            Command::Restart(reply) => (reply, self.restart()),
        };
        let _ = reply.send(result.map(|()| self.status.clone()));
    }

    fn start(&mut self) -> Result<(), CommandError> {
        if !self.status.state.can_start() {
            return Err(self.invalid("start"));
        }
        self.start_after_stop = false;
        self.begin_start_sequence();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CommandError> {
        match self.status.state {
            ServiceState::Stopped => Err(self.invalid("stop")),
            ServiceState::Stopping => {
                self.start_after_stop = false;
                Ok(())
            }
            _ => {
                self.begin_stop(false);
                Ok(())
            }
        }
    }

    fn restart(&mut self) -> Result<(), CommandError> {
        match self.status.state {
            ServiceState::Stopped | ServiceState::Failed => {
                self.begin_start_sequence();
            }
            ServiceState::Stopping => self.start_after_stop = true,
            _ => self.begin_stop(true),
        }
        Ok(())
    }

    const fn invalid(&self, command: &'static str) -> CommandError {
        CommandError::InvalidState {
            command,
            state: self.status.state,
        }
    }

    // ----- internal events -----

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Output { generation, line } => self.on_output(generation, line),
            Internal::Exited { generation, exit } => self.on_exit(generation, &exit),
            Internal::Probe { generation, report } => self.on_probe(generation, report),
            Internal::StartupDeadline { generation } => self.on_startup_deadline(generation),
            Internal::GraceExpired { generation } => self.on_grace_expired(generation),
            Internal::BackoffElapsed { generation } => self.on_backoff_elapsed(generation),
        }
    }

    fn on_output(&mut self, generation: u64, line: LogLine) {
        self.logs.push(line.clone());
        let _ = self.events_tx.send(SupervisorEvent::LogLine(line.clone()));

        let state = self.status.state;
        let retry_available = !self.port_retry_used;
        let Some(live) = self.live_mut(generation) else {
            return;
        };

        if !line.line.trim().is_empty() {
            live.last_line = Some(line.line.clone());
        }
        let Some(signature) = FailureSignature::classify(&line.line) else {
            return;
        };
        live.signature = Some(signature);

        let port_conflict = signature == FailureSignature::PortInUse
            && state == ServiceState::Starting
            && live.doomed.is_none()
            && retry_available;
        if port_conflict {
            warn!(port = %live.port, pid = %live.process.pid(), "Compute service port already in use, relaunching on the next port");
            self.port_retry_used = true;
            self.doom(Doom::PortConflict);
        }
    }

    fn on_exit(&mut self, generation: u64, exit: &ProcessExit) {
        let Some(live) = self.live.take_if(|live| live.generation == generation) else {
            debug!(generation = %generation, exit = %exit.describe(), "Ignoring exit of a stale process");
            return;
        };
        live.probes.cancel();
        self.status.clear_process();

        match live.doomed {
            Some(Doom::Stop) => self.finish_stop(),
            Some(Doom::PortConflict) => self.relaunch_after_port_conflict(live.port),
            Some(Doom::StartupTimeout) => self.crash(&live, exit, ErrorCategory::StartupTimeout),
            None => self.crash(&live, exit, ErrorCategory::UnexpectedExit),
        }
    }

    fn on_probe(&mut self, generation: u64, report: HealthReport) {
        let state = self.status.state;
        let accepting = matches!(
            state,
            ServiceState::Starting | ServiceState::Running | ServiceState::Unhealthy
        );
        let Some(live) = self.live_mut(generation) else {
            return;
        };
        if !accepting || live.doomed.is_some() {
            return;
        }

        match (state, report) {
            (ServiceState::Starting, HealthReport::Healthy) => {
                info!(port = %live.port, pid = %live.process.pid(), "Compute service is healthy");
                self.status.state = ServiceState::Running;
                self.status.restart_attempts = 0;
                self.status.clear_error();
                self.port_retry_used = false;
                self.publish();
            }
            (ServiceState::Unhealthy, HealthReport::Healthy) => {
                info!(port = %live.port, "Compute service recovered");
                self.status.state = ServiceState::Running;
                self.status.clear_error();
                self.publish();
            }
            (ServiceState::Running, HealthReport::Unhealthy { reason }) => {
                warn!(port = %live.port, reason = %reason, "Compute service became unhealthy");
                self.status.state = ServiceState::Unhealthy;
                self.status.error_category = None;
                self.status.last_error = Some(reason);
                self.publish();
            }
            _ => {}
        }
    }

    fn on_startup_deadline(&mut self, generation: u64) {
        let starting = self.status.state == ServiceState::Starting;
        let timeout_ms = self.config.startup_timeout_ms;
        let Some(live) = self.live_mut(generation) else {
            return;
        };
        if !starting || live.doomed.is_some() {
            return;
        }
        warn!(
            port = %live.port,
            timeout_ms = %timeout_ms,
            "Compute service did not become healthy in time"
        );
        self.doom(Doom::StartupTimeout);
    }

    fn on_grace_expired(&mut self, generation: u64) {
        let grace_ms = self.config.shutdown_grace_ms;
        let Some(live) = self.live_mut(generation) else {
            return;
        };
        if live.doomed.is_none() || live.process.exit().is_some() {
            return;
        }

        let pid = live.process.pid();
        let stopping = live.doomed == Some(Doom::Stop);
        warn!(pid = %pid, grace_ms = %grace_ms, "Compute service ignored graceful termination, killing");
        if let Err(e) = live.process.terminate(TerminationSignal::Forceful) {
            error!(pid = %pid, error = %e, "Failed to kill compute service");
        }

        if stopping {
            self.status.set_error(
                ErrorCategory::ShutdownTimeout,
                format!(
                    "{} within {grace_ms}ms and was killed",
                    ErrorCategory::ShutdownTimeout.summary()
                ),
            );
            self.publish();
        }
    }

    fn on_backoff_elapsed(&mut self, generation: u64) {
        if self.status.state != ServiceState::Restarting || self.backoff != Some(generation) {
            debug!(generation = %generation, "Ignoring stale restart timer");
            return;
        }
        self.backoff = None;
        info!(attempt = %self.status.restart_attempts, "Restarting compute service");
        self.port_retry_used = false;
        self.launch(self.config.preferred_port);
    }

    // ----- transitions -----

    fn begin_start_sequence(&mut self) {
        self.port_retry_used = false;
        self.backoff = None;
        self.status.clear_error();
        self.launch(self.config.preferred_port);
    }

    /// Resolve, allocate and spawn, entering Starting or Failed.
    fn launch(&mut self, first_port: u16) {
        if self.live.is_some() {
            error!("Refusing to launch a second compute service process");
            return;
        }

        let invocation = match self
            .components
            .resolver
            .resolve(self.config.mode, self.config.platform)
        {
            Ok(invocation) => invocation,
            Err(e) => return self.fail(ErrorCategory::Resolution, e.to_string()),
        };

        let last = self.config.last_port();
        if first_port > last {
            let exhausted = loralab_core::PortExhausted {
                first: self.config.preferred_port,
                last,
            };
            return self.fail(ErrorCategory::PortExhaustion, exhausted.to_string());
        }
        let port = match self
            .components
            .allocator
            .allocate(first_port, last - first_port + 1)
        {
            Ok(port) => port,
            Err(e) => {
                let exhausted = loralab_core::PortExhausted {
                    first: self.config.preferred_port,
                    last: e.last,
                };
                return self.fail(ErrorCategory::PortExhaustion, exhausted.to_string());
            }
        };

        let generation = self.bump_generation();
        let spec = LaunchSpec::for_port(invocation, port);
        let callback = process_callback(generation, self.internal_tx.clone());

        let process = match self.components.spawner.spawn(&spec, callback) {
            Ok(process) => process,
            Err(e) => {
                let err = ResolutionError::SpawnFailed {
                    path: spec.program.clone(),
                    reason: e.to_string(),
                };
                return self.fail(ErrorCategory::Resolution, err.to_string());
            }
        };

        let probes = CancellationToken::new();
        spawn_probe_loop(
            Arc::clone(&self.components.prober),
            port,
            self.config.health_check_interval(),
            self.config.health_check_timeout(),
            generation,
            probes.clone(),
            self.internal_tx.clone(),
        );
        schedule(
            self.config.startup_timeout(),
            Internal::StartupDeadline { generation },
            self.internal_tx.clone(),
        );

        self.status.state = ServiceState::Starting;
        self.status.port = Some(port);
        self.status.pid = Some(process.pid());
        self.status.started_at = Some(process.started_at());

        self.live = Some(LiveProcess {
            generation,
            process,
            port,
            probes,
            doomed: None,
            last_line: None,
            signature: None,
        });
        self.publish();
    }

    /// Enter Stopping and terminate the live process, if any.
    fn begin_stop(&mut self, start_after: bool) {
        self.start_after_stop = start_after;
        self.backoff = None;
        self.status.state = ServiceState::Stopping;
        self.status.port = None;

        if self.live.is_some() {
            self.publish();
            self.doom(Doom::Stop);
        } else {
            self.publish();
            self.finish_stop();
        }
    }

    /// The process is gone: report Stopped, then launch again if requested.
    fn finish_stop(&mut self) {
        self.status.state = ServiceState::Stopped;
        self.status.port = None;
        self.status.clear_process();
        self.publish();

        if std::mem::take(&mut self.start_after_stop) {
            self.begin_start_sequence();
        }
    }

    /// Cancel probing and start graceful termination of the live process.
    fn doom(&mut self, cause: Doom) {
        let grace = self.config.shutdown_grace();
        let Some(live) = self.live.as_mut() else {
            return;
        };
        live.probes.cancel();
        live.doomed = Some(cause);

        let pid = live.process.pid();
        debug!(pid = %pid, ?cause, "Terminating compute service");
        if let Err(e) = live.process.terminate(TerminationSignal::Graceful) {
            warn!(pid = %pid, error = %e, "Graceful termination failed");
        }
        schedule(
            grace,
            Internal::GraceExpired {
                generation: live.generation,
            },
            self.internal_tx.clone(),
        );
    }

    fn relaunch_after_port_conflict(&mut self, failed_port: u16) {
        match failed_port.checked_add(1) {
            Some(next) => self.launch(next),
            None => self.fail(
                ErrorCategory::PortExhaustion,
                loralab_core::PortExhausted {
                    first: self.config.preferred_port,
                    last: self.config.last_port(),
                }
                .to_string(),
            ),
        }
    }

    /// Apply the crash policy after an exit nobody asked for.
    fn crash(&mut self, live: &LiveProcess, exit: &ProcessExit, category: ErrorCategory) {
        self.status.restart_attempts = self.status.restart_attempts.saturating_add(1);
        let attempts = self.status.restart_attempts;
        let will_restart = attempts < self.config.max_restart_attempts;

        let message = failure_message(category, exit, live.signature, live.last_line.as_deref());
        warn!(
            port = %live.port,
            exit = %exit.describe(),
            attempts = %attempts,
            max_attempts = %self.config.max_restart_attempts,
            will_restart = %will_restart,
            "Compute service crashed"
        );

        let _ = self.events_tx.send(SupervisorEvent::Crashed {
            exit: exit.clone(),
            category,
            restart_attempts: attempts,
            will_restart,
            last_line: live.last_line.clone(),
        });

        self.status.set_error(category, message);
        if will_restart {
            let generation = self.bump_generation();
            self.backoff = Some(generation);
            self.status.state = ServiceState::Restarting;
            schedule(
                self.config.backoff_for(attempts),
                Internal::BackoffElapsed { generation },
                self.internal_tx.clone(),
            );
        } else {
            self.status.state = ServiceState::Failed;
            self.status.port = None;
        }
        self.publish();
    }

    /// Permanent failure: no process, no retry.
    fn fail(&mut self, category: ErrorCategory, message: String) {
        error!(category = ?category, error = %message, "Compute service failed");
        self.backoff = None;
        self.status.state = ServiceState::Failed;
        self.status.port = None;
        self.status.clear_process();
        self.status.set_error(category, message);
        self.publish();
    }

    fn publish(&self) {
        info!(
            state = %self.status.state,
            port = ?self.status.port,
            pid = ?self.status.pid,
            restart_attempts = %self.status.restart_attempts,
            "Service status changed"
        );
        self.status_tx.send_replace(self.status.clone());
        let _ = self
            .events_tx
            .send(SupervisorEvent::StatusChanged(self.status.clone()));
    }

    /// Every handle is gone: nobody can stop the process any more.
    fn abandon(&mut self) {
        if let Some(live) = self.live.take() {
            warn!(pid = %live.process.pid(), "Supervisor shutting down with a live process, killing it");
            live.probes.cancel();
            if let Err(e) = live.process.terminate(TerminationSignal::Forceful) {
                error!(pid = %live.process.pid(), error = %e, "Failed to kill compute service");
            }
        }
        info!("Service supervisor stopped");
    }

    fn live_mut(&mut self, generation: u64) -> Option<&mut LiveProcess> {
        self.live
            .as_mut()
            .filter(|live| live.generation == generation)
    }

    const fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

/// Failure text shown to the user: cause, detected signature, last output line.
fn failure_message(
    category: ErrorCategory,
    exit: &ProcessExit,
    signature: Option<FailureSignature>,
    last_line: Option<&str>,
) -> String {
    let mut message = format!("{} ({})", category.summary(), exit.describe());
    if let Some(signature) = signature {
        message.push_str(". ");
        message.push_str(signature.hint());
    }
    if let Some(line) = last_line {
        message.push_str("\nLast output: ");
        message.push_str(line);
    }
    message
}
