//! Periodic stepping while a run is in progress.

use std::sync::Weak;

use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cadence::Cadence;
use crate::gateway::SimulationGateway;
use crate::orchestrator::{ControlOutcome, IgnoreReason, Orchestrator, Phase};

/// Owner side of a spawned loop. Dropping it without calling
/// [`AutoLoopHandle::cancel`] also stops the loop.
#[derive(Debug)]
pub(crate) struct AutoLoopHandle {
    epoch: u64,
    cancel: watch::Sender<bool>,
}

impl AutoLoopHandle {
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn cancel(self) {
        let _ = self.cancel.send(true);
    }
}

pub(crate) fn spawn<G: SimulationGateway + 'static>(
    orchestrator: Weak<Orchestrator<G>>,
    cadence: Cadence,
    epoch: u64,
) -> AutoLoopHandle {
    let (cancel, cancelled) = watch::channel(false);
    tokio::spawn(run(orchestrator, cadence, epoch, cancelled));
    info!(
        target: "horizon::auto_loop",
        epoch,
        cadence_ms = cadence.millis(),
        "auto_loop.started"
    );
    AutoLoopHandle { epoch, cancel }
}

async fn run<G: SimulationGateway + 'static>(
    orchestrator: Weak<Orchestrator<G>>,
    cadence: Cadence,
    epoch: u64,
    mut cancelled: watch::Receiver<bool>,
) {
    let period = cadence.as_duration();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            changed = cancelled.changed() => {
                // Err means the handle was dropped.
                if changed.is_err() || *cancelled.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let Some(orchestrator) = orchestrator.upgrade() else {
            break;
        };
        if *cancelled.borrow() {
            break;
        }

        match orchestrator.step_once().await {
            Ok(ControlOutcome::Applied(view)) => {
                if view.phase != Phase::Running {
                    break;
                }
            }
            Ok(ControlOutcome::Ignored(IgnoreReason::InFlight)) => {
                debug!(target: "horizon::auto_loop", epoch, "auto_loop.tick_dropped");
            }
            Ok(ControlOutcome::Ignored(reason)) => {
                orchestrator.stop_auto_for_epoch(epoch, reason.as_str());
                break;
            }
            Err(err) => {
                warn!(
                    target: "horizon::auto_loop",
                    epoch,
                    error = %err,
                    "auto_loop.step_failed"
                );
                break;
            }
        }
    }

    debug!(target: "horizon::auto_loop", epoch, "auto_loop.exited");
}
