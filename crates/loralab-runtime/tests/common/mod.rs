//! Fakes for driving the supervisor without real processes or HTTP.
//!
//! Each integration test file compiles this module separately and uses a
//! different subset of it.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loralab_core::{
    ExecutableResolver, HealthProber, HealthReport, Invocation, LaunchSpec, LogLine,
    ManagedProcess, OutputStream, Platform, PortAllocator, PortExhausted, ProcessEvent,
    ProcessEventCallback, ProcessExit, ProcessSpawner, ResolutionError, RunMode, ServiceConfig,
    ServiceState, SupervisorEvent, TerminationSignal,
};
use loralab_runtime::{ServiceSupervisor, SupervisorComponents};
use tokio::sync::{Notify, broadcast};

// ── Configuration ──────────────────────────────────────────────────

/// Base port for fake allocations. Nothing binds it.
pub const TEST_BASE_PORT: u16 = 19_000;

/// Short timings so state machine tests finish quickly.
pub fn fast_config() -> ServiceConfig {
    ServiceConfig {
        mode: RunMode::Development,
        platform: Platform::current(),
        preferred_port: TEST_BASE_PORT,
        port_scan_range: 3,
        max_restart_attempts: 3,
        restart_backoff_ms: 20,
        health_check_interval_ms: 10,
        health_check_timeout_ms: 50,
        shutdown_grace_ms: 200,
        startup_timeout_ms: 5_000,
    }
}

/// Generous bound for anything that should happen "soon".
pub const WAIT: Duration = Duration::from_secs(5);

// ── Resolver ───────────────────────────────────────────────────────

/// Resolver that always returns the same invocation.
pub struct StaticResolver;

impl ExecutableResolver for StaticResolver {
    fn resolve(&self, _mode: RunMode, _platform: Platform) -> Result<Invocation, ResolutionError> {
        Ok(Invocation::new("/opt/loralab/backend/loralab-backend", "/opt/loralab/backend"))
    }
}

// ── Port allocator ─────────────────────────────────────────────────

/// Allocator that treats every port as free.
pub struct FirstPortAllocator;

impl PortAllocator for FirstPortAllocator {
    fn allocate(&self, preferred: u16, range: u16) -> Result<u16, PortExhausted> {
        if range == 0 {
            return Err(PortExhausted {
                first: preferred,
                last: preferred,
            });
        }
        Ok(preferred)
    }
}

// ── Processes ──────────────────────────────────────────────────────

/// What a fake process does once spawned.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Runs until terminated; honours SIGTERM.
    RunForever,
    /// Prints `lines`, then exits with `code` right away.
    Exit { lines: Vec<String>, code: i32 },
    /// Runs until killed; ignores SIGTERM.
    IgnoreTerm,
    /// Prints a bind failure, then exits with code 1.
    PortInUse,
    /// Prints `lines`, then runs until terminated.
    Print(Vec<String>),
}

impl Behavior {
    pub fn exit(code: i32) -> Self {
        Self::Exit {
            lines: Vec::new(),
            code,
        }
    }
}

#[derive(Default)]
struct SpawnerState {
    script: VecDeque<Behavior>,
    specs: Vec<LaunchSpec>,
    spawned_at: Vec<Instant>,
    processes: Vec<Arc<ProcessRecord>>,
}

/// Spawner handing out scripted fake processes.
///
/// Tracks how many processes are alive at once so tests can check the
/// single-instance invariant.
#[derive(Clone)]
pub struct FakeSpawner {
    state: Arc<Mutex<SpawnerState>>,
    fallback: Behavior,
    alive: Arc<AtomicUsize>,
    max_alive: Arc<AtomicUsize>,
    next_pid: Arc<AtomicU32>,
    fail_spawn: Arc<AtomicBool>,
}

impl FakeSpawner {
    pub fn new(fallback: Behavior) -> Self {
        Self {
            state: Arc::default(),
            fallback,
            alive: Arc::new(AtomicUsize::new(0)),
            max_alive: Arc::new(AtomicUsize::new(0)),
            next_pid: Arc::new(AtomicU32::new(1000)),
            fail_spawn: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Behaviours for the next spawns, in order, before the fallback applies.
    pub fn with_script(self, script: impl IntoIterator<Item = Behavior>) -> Self {
        self.state.lock().unwrap().script.extend(script);
        self
    }

    pub fn fail_spawns(&self) {
        self.fail_spawn.store(true, Ordering::SeqCst);
    }

    /// Kill every live process behind the supervisor's back.
    pub fn kill_all(&self) {
        let processes = self.state.lock().unwrap().processes.clone();
        for process in processes {
            process.finish(ProcessExit::signal("SIGKILL"));
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().specs.len()
    }

    pub fn specs(&self) -> Vec<LaunchSpec> {
        self.state.lock().unwrap().specs.clone()
    }

    pub fn spawn_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().spawned_at.clone()
    }

    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn max_alive(&self) -> usize {
        self.max_alive.load(Ordering::SeqCst)
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(
        &self,
        spec: &LaunchSpec,
        on_event: ProcessEventCallback,
    ) -> io::Result<Box<dyn ManagedProcess>> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
        }

        let now_alive = self.alive.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_alive.fetch_max(now_alive, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        let behavior = state
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let record = Arc::new(ProcessRecord {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            started_at: Utc::now(),
            exit: Mutex::new(None),
            ignores_term: matches!(behavior, Behavior::IgnoreTerm),
            on_event,
            alive: Arc::clone(&self.alive),
        });
        state.specs.push(spec.clone());
        state.spawned_at.push(Instant::now());
        state.processes.push(Arc::clone(&record));
        drop(state);

        match behavior {
            Behavior::RunForever | Behavior::IgnoreTerm => {}
            Behavior::Print(lines) => lines.iter().for_each(|l| record.emit(l)),
            Behavior::Exit { lines, code } => {
                lines.iter().for_each(|l| record.emit(l));
                record.finish(ProcessExit::code(code));
            }
            Behavior::PortInUse => {
                record.emit("ERROR:    [Errno 98] error while attempting to bind on address ('127.0.0.1', 19000): address already in use");
                record.finish(ProcessExit::code(1));
            }
        }

        Ok(Box::new(FakeProcess(record)))
    }
}

struct ProcessRecord {
    pid: u32,
    started_at: DateTime<Utc>,
    exit: Mutex<Option<ProcessExit>>,
    ignores_term: bool,
    on_event: ProcessEventCallback,
    alive: Arc<AtomicUsize>,
}

impl ProcessRecord {
    fn emit(&self, text: &str) {
        (self.on_event)(ProcessEvent::Output(LogLine::new(OutputStream::Stderr, text)));
    }

    /// Record the exit once and report it.
    fn finish(&self, exit: ProcessExit) {
        {
            let mut slot = self.exit.lock().unwrap();
            if slot.is_some() {
                return;
            }
            *slot = Some(exit.clone());
        }
        self.alive.fetch_sub(1, Ordering::SeqCst);
        (self.on_event)(ProcessEvent::Exited(exit));
    }
}

pub struct FakeProcess(Arc<ProcessRecord>);

impl ManagedProcess for FakeProcess {
    fn pid(&self) -> u32 {
        self.0.pid
    }

    fn started_at(&self) -> DateTime<Utc> {
        self.0.started_at
    }

    fn exit(&self) -> Option<ProcessExit> {
        self.0.exit.lock().unwrap().clone()
    }

    fn terminate(&self, signal: TerminationSignal) -> io::Result<()> {
        match signal {
            TerminationSignal::Graceful if self.0.ignores_term => {}
            TerminationSignal::Graceful => self.0.finish(ProcessExit::signal("SIGTERM")),
            TerminationSignal::Forceful => self.0.finish(ProcessExit::signal("SIGKILL")),
        }
        Ok(())
    }
}

// ── Health prober ──────────────────────────────────────────────────

/// Prober whose answer the test flips at will.
#[derive(Clone)]
pub struct SwitchProber {
    healthy: Arc<AtomicBool>,
    probes: Arc<AtomicUsize>,
}

impl SwitchProber {
    pub fn new(healthy: bool) -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(healthy)),
            probes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProber for SwitchProber {
    async fn probe(&self, _port: u16, _timeout: Duration) -> HealthReport {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            HealthReport::Healthy
        } else {
            HealthReport::unhealthy("Connection refused")
        }
    }
}

/// Healthy prober whose probes block until released one at a time.
#[derive(Clone, Default)]
pub struct GatedProber {
    entered: Arc<AtomicUsize>,
    gate: Arc<Notify>,
}

impl GatedProber {
    /// Wait until a probe is blocked on the gate.
    pub async fn wait_until_probing(&self) {
        let deadline = Instant::now() + WAIT;
        while self.entered.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "no probe was started");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Let one blocked probe report Healthy.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl HealthProber for GatedProber {
    async fn probe(&self, _port: u16, _timeout: Duration) -> HealthReport {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        HealthReport::Healthy
    }
}

// ── Harness ────────────────────────────────────────────────────────

pub fn components(
    resolver: impl ExecutableResolver + 'static,
    allocator: impl PortAllocator + 'static,
    spawner: &FakeSpawner,
    prober: &SwitchProber,
) -> SupervisorComponents {
    SupervisorComponents {
        resolver: Arc::new(resolver),
        allocator: Arc::new(allocator),
        spawner: Arc::new(spawner.clone()),
        prober: Arc::new(prober.clone()),
    }
}

/// Supervisor over the fakes with the static resolver and free ports.
pub fn fake_supervisor(
    config: ServiceConfig,
    spawner: &FakeSpawner,
    prober: &SwitchProber,
) -> ServiceSupervisor {
    ServiceSupervisor::spawn(
        config,
        components(StaticResolver, FirstPortAllocator, spawner, prober),
    )
    .unwrap()
}

pub async fn wait_for(supervisor: &ServiceSupervisor, state: ServiceState) -> loralab_core::ServiceStatus {
    supervisor
        .wait_for_state(|s| s.state == state, WAIT)
        .await
        .unwrap_or_else(|| panic!("never reached {state}, last status: {:?}", supervisor.status()))
}

/// Drain status changes until `state` shows up, returning every state seen.
pub async fn states_until(
    rx: &mut broadcast::Receiver<SupervisorEvent>,
    state: ServiceState,
) -> Vec<ServiceState> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .unwrap_or_else(|_| panic!("never saw {state}, saw {seen:?}"))
            .expect("event channel closed");
        if let SupervisorEvent::StatusChanged(status) = event {
            seen.push(status.state);
            if status.state == state {
                return seen;
            }
        }
    }
}
