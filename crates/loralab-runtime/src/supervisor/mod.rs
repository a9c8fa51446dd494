//! Service supervisor for the compute service lifecycle.
//!
//! [`ServiceSupervisor`] is a cheap, cloneable handle to a single actor task
//! that owns the [`ServiceStatus`] and the live process. Adapters (the CLI,
//! a desktop shell) call methods on the handle and never hold process state
//! themselves.
//!
//! Key design decisions:
//! - **Serial transitions**: commands, output, exits, probes and timers all
//!   go through one queue, handled one at a time in arrival order
//! - **Generation tags**: timers and probes carry the generation of the
//!   process they were started for, so late arrivals are dropped
//! - **Exit-confirmed stop**: `Stopped` is reported only after the exit event
//! - **Ports passed at spawn**: resolver, allocator, spawner and prober are
//!   injected, so tests drive the state machine without real processes

mod actor;
mod tasks;

use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use loralab_core::{
    CommandError, ConfigError, ExecutableResolver, HealthProber, LogLine, PortAllocator,
    ProcessSpawner, ResolutionError, ServiceConfig, ServiceState, ServiceStatus,
    SupervisorEvent,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::health::HttpHealthProber;
use crate::logs::LogRing;
use crate::paths::PathResolver;
use crate::ports::TcpPortAllocator;
use crate::process::TokioProcessSpawner;

use self::actor::{Command, Message, SupervisorActor};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Extra time `shutdown()` waits beyond the configured grace period.
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(2);

/// Collaborators the supervisor talks to.
#[derive(Clone)]
pub struct SupervisorComponents {
    pub resolver: Arc<dyn ExecutableResolver>,
    pub allocator: Arc<dyn PortAllocator>,
    pub spawner: Arc<dyn ProcessSpawner>,
    pub prober: Arc<dyn HealthProber>,
}

impl SupervisorComponents {
    /// Filesystem resolver, TCP allocator, tokio processes and HTTP probes.
    pub fn runtime_defaults() -> Result<Self, SupervisorInitError> {
        Ok(Self {
            resolver: Arc::new(PathResolver::from_env()?),
            allocator: Arc::new(TcpPortAllocator),
            spawner: Arc::new(TokioProcessSpawner),
            prober: Arc::new(HttpHealthProber::new()?),
        })
    }
}

impl std::fmt::Debug for SupervisorComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorComponents").finish_non_exhaustive()
    }
}

/// Error building the default components.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorInitError {
    #[error("Invalid supervisor configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Layout(#[from] ResolutionError),

    #[error("Failed to build health check client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Handle to the supervisor actor.
///
/// Dropping the last clone ends the actor, which kills any process still
/// running. Call [`shutdown`](Self::shutdown) first for a graceful exit.
///
/// # Example
///
/// ```ignore
/// let supervisor = ServiceSupervisor::with_defaults(ServiceConfig::from_env()?)?;
/// supervisor.start().await?;
/// let running = supervisor
///     .wait_for_state(|s| s.is_running(), Duration::from_secs(90))
///     .await;
/// supervisor.shutdown().await?;
/// ```
#[derive(Clone)]
pub struct ServiceSupervisor {
    inbox: mpsc::UnboundedSender<Message>,
    status_rx: watch::Receiver<ServiceStatus>,
    events_tx: broadcast::Sender<SupervisorEvent>,
    logs: Arc<LogRing>,
    shutdown_wait: Duration,
}

impl ServiceSupervisor {
    /// Spawn the actor task. Must be called inside a tokio runtime.
    ///
    /// Rejects a configuration that fails [`ServiceConfig::validate`].
    pub fn spawn(
        config: ServiceConfig,
        components: SupervisorComponents,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ServiceStatus::stopped());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let logs = Arc::new(LogRing::default());
        let shutdown_wait = config.shutdown_grace() + SHUTDOWN_MARGIN;

        let actor = SupervisorActor::new(
            config,
            components,
            status_tx,
            events_tx.clone(),
            Arc::clone(&logs),
            inbox_tx.downgrade(),
        );
        tokio::spawn(actor.run(inbox_rx));

        Ok(Self {
            inbox: inbox_tx,
            status_rx,
            events_tx,
            logs,
            shutdown_wait,
        })
    }

    /// Supervisor wired to the real runtime components.
    pub fn with_defaults(config: ServiceConfig) -> Result<Self, SupervisorInitError> {
        config.validate()?;
        Ok(Self::spawn(config, SupervisorComponents::runtime_defaults()?)?)
    }

    /// Launch the service. Valid from Stopped and Failed.
    pub async fn start(&self) -> Result<ServiceStatus, CommandError> {
        self.request(Command::Start).await
    }

    /// Terminate the service. Valid from every state except Stopped.
    pub async fn stop(&self) -> Result<ServiceStatus, CommandError> {
        self.request(Command::Stop).await
    }

    /// Stop, then start again once the process has exited.
    pub async fn restart(&self) -> Result<ServiceStatus, CommandError> {
        self.request(Command::Restart).await
    }

    async fn request(
        &self,
        command: impl FnOnce(actor::Reply) -> Command,
    ) -> Result<ServiceStatus, CommandError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(Message::Command(command(reply_tx)))
            .map_err(|_| CommandError::Closed)?;
        reply_rx.await.map_err(|_| CommandError::Closed)?
    }

    /// Current status snapshot.
    pub fn status(&self) -> ServiceStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver always holding the latest status.
    ///
    /// Intermediate states can be skipped; use [`subscribe`](Self::subscribe)
    /// to see every transition.
    pub fn status_watch(&self) -> watch::Receiver<ServiceStatus> {
        self.status_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events_tx.subscribe()
    }

    /// Event stream from now on. Lagging consumers skip events.
    pub fn events(&self) -> impl Stream<Item = SupervisorEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped = %skipped, "Supervisor event consumer lagged");
                None
            }
        })
    }

    /// The `n` most recent output lines, oldest first.
    pub fn recent_log_lines(&self, n: usize) -> Vec<LogLine> {
        self.logs.recent(n)
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// Returns `None` on timeout or when the actor is gone.
    pub async fn wait_for_state<F>(&self, predicate: F, timeout: Duration) -> Option<ServiceStatus>
    where
        F: FnMut(&ServiceStatus) -> bool,
    {
        let mut rx = self.status_rx.clone();
        match tokio::time::timeout(timeout, rx.wait_for(predicate)).await {
            Ok(Ok(status)) => Some(status.clone()),
            _ => None,
        }
    }

    /// Stop the service and wait until it is Stopped.
    pub async fn shutdown(&self) -> Result<ServiceStatus, CommandError> {
        match self.stop().await {
            Ok(_) | Err(CommandError::InvalidState { .. }) => {}
            Err(e) => return Err(e),
        }

        self.wait_for_state(
            |status| status.state == ServiceState::Stopped,
            self.shutdown_wait,
        )
        .await
        .ok_or(CommandError::TimedOut {
            command: "stop",
            waited_ms: u64::try_from(self.shutdown_wait.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

impl std::fmt::Debug for ServiceSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSupervisor")
            .field("status", &*self.status_rx.borrow())
            .finish_non_exhaustive()
    }
}
