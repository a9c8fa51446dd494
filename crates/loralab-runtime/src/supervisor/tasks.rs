//! Background tasks posting generation-tagged events back to the actor.
//!
//! Nothing here decides anything: probes report, timers fire, and the actor
//! discards whatever arrives for a process or phase that is gone. Events go
//! into the same queue as handle commands, so they are handled in the order
//! they were posted. Producers hold a weak sender and never keep the actor
//! alive on their own.

use std::sync::Arc;
use std::time::Duration;

use loralab_core::{HealthProber, ProcessEvent, ProcessEventCallback};
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::actor::{Internal, Message};

/// Periodic health probing for one process.
///
/// The first probe fires immediately. A probe already in flight when `cancel`
/// fires still completes; the actor drops its result.
pub(super) fn spawn_probe_loop(
    prober: Arc<dyn HealthProber>,
    port: u16,
    every: Duration,
    timeout: Duration,
    generation: u64,
    cancel: CancellationToken,
    tx: WeakUnboundedSender<Message>,
) {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(port = %port, generation = %generation, "Starting health probes");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let report = prober.probe(port, timeout).await;
                    debug!(port = %port, generation = %generation, ?report, "Health probe");
                    if !post(&tx, Internal::Probe { generation, report }) {
                        break;
                    }
                }
            }
        }

        debug!(port = %port, generation = %generation, "Health probes cancelled");
    });
}

/// Deliver `event` after `after`.
pub(super) fn schedule(after: Duration, event: Internal, tx: WeakUnboundedSender<Message>) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        post(&tx, event);
    });
}

/// Process callback forwarding into the actor's internal queue.
pub(super) fn process_callback(
    generation: u64,
    tx: WeakUnboundedSender<Message>,
) -> ProcessEventCallback {
    Arc::new(move |event| {
        let internal = match event {
            ProcessEvent::Output(line) => Internal::Output { generation, line },
            ProcessEvent::Exited(exit) => Internal::Exited { generation, exit },
        };
        post(&tx, internal);
    })
}

/// Queue `event` for the actor. False once the actor is gone.
fn post(tx: &WeakUnboundedSender<Message>, event: Internal) -> bool {
    tx.upgrade()
        .is_some_and(|tx| tx.send(Message::Internal(event)).is_ok())
}
