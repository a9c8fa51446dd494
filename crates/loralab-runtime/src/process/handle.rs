//! Live compute service process.
//!
//! A background waiter task owns the tokio `Child`. The handle keeps only
//! the PID, the start time, the exit record and a channel used to ask the
//! waiter for a forceful kill. This keeps `terminate` synchronous and lets
//! the waiter report the exit exactly once, after the output readers have
//! drained. The exit record is filled as soon as the child is reaped, before
//! that drain.

use std::io;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use loralab_core::{
    LaunchSpec, ManagedProcess, OutputStream, ProcessEvent, ProcessEventCallback, ProcessExit,
    ProcessSpawner, TerminationSignal,
};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::signal::exit_from_status;
use super::stream::spawn_stream_reader;

/// How long the waiter lets the output readers drain after the process exited.
/// Grandchildren can keep the pipes open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Handle to one spawned compute service process.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    started_at: DateTime<Utc>,
    exit: Arc<OnceLock<ProcessExit>>,
    kill_tx: mpsc::UnboundedSender<()>,
}

impl ProcessHandle {
    /// Spawn the process described by `spec` and start watching it.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(spec: &LaunchSpec, on_event: ProcessEventCallback) -> io::Result<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_directory)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW: no console window flashing up behind the GUI
            cmd.creation_flags(0x0800_0000);
        }

        let mut child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("spawned process has no PID"))?;
        let started_at = Utc::now();

        info!(
            pid = %pid,
            port = %spec.port,
            program = %spec.program.display(),
            "Spawned compute service"
        );

        let readers = spawn_readers(&mut child, pid, &on_event);
        let exit = Arc::new(OnceLock::new());
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();

        tokio::spawn(wait_for_exit(
            child,
            pid,
            kill_rx,
            readers,
            exit.clone(),
            on_event,
        ));

        Ok(Self {
            pid,
            started_at,
            exit,
            kill_tx,
        })
    }

    fn request_kill(&self) -> io::Result<()> {
        self.kill_tx
            .send(())
            .map_err(|_| io::Error::other("process waiter is gone"))
    }
}

impl ManagedProcess for ProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn exit(&self) -> Option<ProcessExit> {
        self.exit.get().cloned()
    }

    fn terminate(&self, signal: TerminationSignal) -> io::Result<()> {
        if self.exit.get().is_some() {
            return Ok(());
        }

        match signal {
            #[cfg(unix)]
            TerminationSignal::Graceful => {
                debug!(pid = %self.pid, "Sending SIGTERM");
                super::signal::send_sigterm(self.pid).map(|_| ())
            }
            #[cfg(not(unix))]
            TerminationSignal::Graceful => {
                debug!(pid = %self.pid, "No graceful signal on this platform, killing");
                self.request_kill()
            }
            TerminationSignal::Forceful => {
                debug!(pid = %self.pid, "Killing process");
                self.request_kill()
            }
        }
    }
}

fn spawn_readers(
    child: &mut Child,
    pid: u32,
    on_event: &ProcessEventCallback,
) -> Vec<JoinHandle<()>> {
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_stream_reader(
            stdout,
            pid,
            OutputStream::Stdout,
            on_event.clone(),
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_stream_reader(
            stderr,
            pid,
            OutputStream::Stderr,
            on_event.clone(),
        ));
    }
    readers
}

async fn wait_for_exit(
    mut child: Child,
    pid: u32,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
    readers: Vec<JoinHandle<()>>,
    exit_slot: Arc<OnceLock<ProcessExit>>,
    on_event: ProcessEventCallback,
) {
    let mut handle_alive = true;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            request = kill_rx.recv(), if handle_alive => {
                if request.is_none() {
                    // Nobody can stop this process any more: don't leave an orphan.
                    warn!(pid = %pid, "Process handle dropped while process alive, killing");
                    handle_alive = false;
                }
                if let Err(e) = child.start_kill() {
                    debug!(pid = %pid, error = %e, "Kill request failed");
                }
            }
        }
    };

    let exit = match status {
        Ok(status) => exit_from_status(status),
        Err(e) => {
            warn!(pid = %pid, error = %e, "Failed to wait for process");
            ProcessExit::default()
        }
    };
    // The PID is free for reuse from here on: no more signals by PID.
    let _ = exit_slot.set(exit.clone());

    for mut reader in readers {
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader)
            .await
            .is_err()
        {
            debug!(pid = %pid, "Output reader still busy after exit, detaching");
            reader.abort();
        }
    }

    info!(pid = %pid, exit = %exit.describe(), "Compute service process exited");
    on_event(ProcessEvent::Exited(exit));
}

/// [`ProcessSpawner`] launching real OS processes through tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessSpawner;

impl ProcessSpawner for TokioProcessSpawner {
    fn spawn(
        &self,
        spec: &LaunchSpec,
        on_event: ProcessEventCallback,
    ) -> io::Result<Box<dyn ManagedProcess>> {
        Ok(Box::new(ProcessHandle::spawn(spec, on_event)?))
    }
}
