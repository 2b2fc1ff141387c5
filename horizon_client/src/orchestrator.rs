//! Control-side state machine for a remotely simulated run.
//!
//! The orchestrator owns the last good snapshot, sequences every control
//! request through a single lane, and publishes a read-only
//! [`OrchestratorView`] after each transition.

use std::sync::Arc;

use horizon_schema::{Creature, CreatureId, Snapshot};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auto_loop::{self, AutoLoopHandle};
use crate::cadence::Cadence;
use crate::completion::detect_winner;
use crate::config::ClientConfig;
use crate::error::{ClientError, ValidationError};
use crate::gateway::{Operation, SimulationGateway};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No run has been started in this session.
    Idle,
    Running,
    /// The engine reported completion, the run was force-finished, or a
    /// creature was observed at the goal.
    Finished,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Finished => "finished",
        }
    }
}

/// Why a control action did not reach the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Another control request is still outstanding.
    InFlight,
    NotStarted,
    AlreadyFinished,
}

impl IgnoreReason {
    pub fn as_str(self) -> &'static str {
        match self {
            IgnoreReason::InFlight => "in_flight",
            IgnoreReason::NotStarted => "not_started",
            IgnoreReason::AlreadyFinished => "already_finished",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ControlOutcome {
    Applied(OrchestratorView),
    Ignored(IgnoreReason),
}

impl ControlOutcome {
    pub fn applied(&self) -> Option<&OrchestratorView> {
        match self {
            ControlOutcome::Applied(view) => Some(view),
            ControlOutcome::Ignored(_) => None,
        }
    }
}

/// Immutable copy of the orchestrator state handed to presentation code.
#[derive(Clone, Debug, PartialEq)]
pub struct OrchestratorView {
    pub phase: Phase,
    pub snapshot: Option<Snapshot>,
    pub selected_actor: Option<CreatureId>,
    pub auto_running: bool,
    pub cadence: Cadence,
    pub winner: Option<CreatureId>,
    /// The engine's own `finished` flag on the latest snapshot.
    pub server_finished: bool,
    pub last_error: Option<String>,
}

impl OrchestratorView {
    pub fn iteration_count(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|snapshot| snapshot.iteration_count)
    }

    pub fn speed_multiplier(&self) -> u32 {
        self.cadence.multiplier()
    }

    /// The highlighted creature, if it is still present in the snapshot.
    pub fn selected_creature(&self) -> Option<&Creature> {
        let id = self.selected_actor?;
        self.snapshot.as_ref()?.find(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub initial_cadence: Cadence,
    pub confirm_goal_with_server: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            initial_cadence: Cadence::BASE,
            confirm_goal_with_server: true,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            initial_cadence: Cadence::new(config.initial_cadence_ms)?,
            confirm_goal_with_server: config.confirm_goal_with_server,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transition {
    /// A fresh run from `start` or `reset`.
    NewRun,
    /// A later snapshot of the current run.
    Advance,
    /// Response to an explicit finish request.
    Finish,
}

struct OrchestratorState {
    snapshot: Option<Snapshot>,
    selected_actor: Option<CreatureId>,
    cadence: Cadence,
    winner: Option<CreatureId>,
    finished: bool,
    last_error: Option<String>,
    auto: Option<AutoLoopHandle>,
    next_epoch: u64,
}

impl OrchestratorState {
    fn phase(&self) -> Phase {
        match self.snapshot {
            None => Phase::Idle,
            Some(_) if self.finished => Phase::Finished,
            Some(_) => Phase::Running,
        }
    }

    fn view(&self) -> OrchestratorView {
        OrchestratorView {
            phase: self.phase(),
            snapshot: self.snapshot.clone(),
            selected_actor: self.selected_actor,
            auto_running: self.auto.is_some(),
            cadence: self.cadence,
            winner: self.winner,
            server_finished: self
                .snapshot
                .as_ref()
                .map(|snapshot| snapshot.finished)
                .unwrap_or(false),
            last_error: self.last_error.clone(),
        }
    }

    fn take_epoch(&mut self) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch = self.next_epoch.wrapping_add(1);
        epoch
    }

    fn stop_auto(&mut self, reason: &'static str) -> bool {
        match self.auto.take() {
            Some(handle) => {
                let epoch = handle.epoch();
                handle.cancel();
                info!(target: "horizon::orchestrator", epoch, reason, "auto_loop.stopped");
                true
            }
            None => false,
        }
    }
}

struct Applied {
    view: OrchestratorView,
    goal_reached_now: bool,
}

pub struct Orchestrator<G> {
    gateway: G,
    settings: OrchestratorSettings,
    state: Mutex<OrchestratorState>,
    /// In-flight guard: held for the whole round trip of a control request.
    lane: tokio::sync::Mutex<()>,
    views: watch::Sender<OrchestratorView>,
}

impl<G: SimulationGateway> Orchestrator<G> {
    pub fn new(gateway: G, settings: OrchestratorSettings) -> Self {
        let state = OrchestratorState {
            snapshot: None,
            selected_actor: None,
            cadence: settings.initial_cadence,
            winner: None,
            finished: false,
            last_error: None,
            auto: None,
            next_epoch: 0,
        };
        let (views, _) = watch::channel(state.view());
        Self {
            gateway,
            settings,
            state: Mutex::new(state),
            lane: tokio::sync::Mutex::new(()),
            views,
        }
    }

    pub fn from_config(gateway: G, config: &ClientConfig) -> Result<Self, ClientError> {
        let settings = OrchestratorSettings::from_config(config)?;
        Ok(Self::new(gateway, settings))
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn view(&self) -> OrchestratorView {
        self.state.lock().view()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase()
    }

    /// Receiver that observes a fresh view after every transition.
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorView> {
        self.views.subscribe()
    }

    /// Starts a new run, replacing whatever run the session had before.
    pub async fn initialize(&self, creature_count: u32) -> Result<OrchestratorView, ClientError> {
        self.cancel_auto("initialize");
        let _lane = self.lane.lock().await;

        let snapshot = self
            .gateway
            .start(creature_count)
            .await
            .map_err(|err| self.record_failure(Operation::Start, err))?;
        let actor = self.gateway.current_actor().await;
        let applied = self.apply(snapshot, actor, Transition::NewRun);
        info!(
            target: "horizon::orchestrator",
            creature_count,
            active = applied.view.snapshot.as_ref().map(Snapshot::active_count),
            "run.started"
        );
        Ok(self.follow_up(applied).await)
    }

    /// Advances the run by one engine iteration.
    ///
    /// Never waits for the lane: a call made while another request is
    /// outstanding is dropped and reported as [`IgnoreReason::InFlight`].
    pub async fn step_once(&self) -> Result<ControlOutcome, ClientError> {
        let Ok(_lane) = self.lane.try_lock() else {
            debug!(target: "horizon::orchestrator", "step.dropped=in_flight");
            return Ok(ControlOutcome::Ignored(IgnoreReason::InFlight));
        };
        if let Some(reason) = self.ignore_unless_running() {
            return Ok(ControlOutcome::Ignored(reason));
        }

        let snapshot = self
            .gateway
            .step()
            .await
            .map_err(|err| self.record_failure(Operation::Step, err))?;
        let actor = self.gateway.current_actor().await;
        let applied = self.apply(snapshot, actor, Transition::Advance);
        debug!(
            target: "horizon::orchestrator",
            iteration = applied.view.iteration_count(),
            phase = applied.view.phase.as_str(),
            "step.applied"
        );
        Ok(ControlOutcome::Applied(self.follow_up(applied).await))
    }

    /// Restarts the current run from iteration zero. Valid in every phase.
    pub async fn reset(&self) -> Result<OrchestratorView, ClientError> {
        self.cancel_auto("reset");
        let _lane = self.lane.lock().await;

        let snapshot = self
            .gateway
            .reset()
            .await
            .map_err(|err| self.record_failure(Operation::Reset, err))?;
        let actor = self.gateway.current_actor().await;
        let applied = self.apply(snapshot, actor, Transition::NewRun);
        info!(target: "horizon::orchestrator", "run.reset");
        Ok(self.follow_up(applied).await)
    }

    pub async fn force_finish(&self) -> Result<ControlOutcome, ClientError> {
        let _lane = self.lane.lock().await;
        if let Some(reason) = self.ignore_unless_running() {
            return Ok(ControlOutcome::Ignored(reason));
        }

        let snapshot = self
            .gateway
            .force_finish()
            .await
            .map_err(|err| self.record_failure(Operation::ForceFinish, err))?;
        let actor = self.gateway.current_actor().await;
        let applied = self.apply(snapshot, actor, Transition::Finish);
        info!(
            target: "horizon::orchestrator",
            iteration = applied.view.iteration_count(),
            winner = applied.view.winner.map(|id| id.0),
            "run.force_finished"
        );
        Ok(ControlOutcome::Applied(applied.view))
    }

    /// Re-reads the engine state without advancing it.
    pub async fn refresh(&self) -> Result<ControlOutcome, ClientError> {
        let _lane = self.lane.lock().await;
        if self.phase() == Phase::Idle {
            return Ok(ControlOutcome::Ignored(IgnoreReason::NotStarted));
        }

        let snapshot = self
            .gateway
            .status()
            .await
            .map_err(|err| self.record_failure(Operation::Status, err))?;
        let actor = self.gateway.current_actor().await;
        let applied = self.apply(snapshot, actor, Transition::Advance);
        Ok(ControlOutcome::Applied(self.follow_up(applied).await))
    }

    fn ignore_unless_running(&self) -> Option<IgnoreReason> {
        match self.phase() {
            Phase::Idle => Some(IgnoreReason::NotStarted),
            Phase::Finished => Some(IgnoreReason::AlreadyFinished),
            Phase::Running => None,
        }
    }

    /// Reconciles a successful response into the state. Only called with the
    /// lane held.
    fn apply(
        &self,
        snapshot: Snapshot,
        actor: Result<Option<CreatureId>, ClientError>,
        transition: Transition,
    ) -> Applied {
        let mut state = self.state.lock();

        match transition {
            Transition::NewRun => {
                state.finished = false;
                state.winner = None;
                state.stop_auto("new_run");
            }
            Transition::Advance | Transition::Finish => {
                if let Some(previous) = &state.snapshot {
                    if snapshot.iteration_count < previous.iteration_count {
                        warn!(
                            target: "horizon::orchestrator",
                            previous = previous.iteration_count,
                            received = snapshot.iteration_count,
                            "snapshot.iteration_regressed"
                        );
                    }
                    if previous.finished && !snapshot.finished {
                        warn!(
                            target: "horizon::orchestrator",
                            iteration = snapshot.iteration_count,
                            "snapshot.finished_regressed"
                        );
                    }
                }
            }
        }

        if snapshot.finished || transition == Transition::Finish {
            state.finished = true;
        }

        let mut goal_reached_now = false;
        if state.winner.is_none() {
            if let Some(winner) = detect_winner(&snapshot) {
                info!(
                    target: "horizon::orchestrator",
                    winner = winner.0,
                    iteration = snapshot.iteration_count,
                    server_finished = snapshot.finished,
                    "run.goal_reached"
                );
                state.winner = Some(winner);
                state.finished = true;
                goal_reached_now = true;
            }
        }

        match actor {
            Ok(actor) => {
                state.selected_actor = actor;
                state.last_error = None;
            }
            Err(err) => {
                warn!(
                    target: "horizon::orchestrator",
                    error = %err,
                    "current_actor.lookup_failed"
                );
                state.selected_actor = None;
                state.last_error = Some(err.display_message());
            }
        }

        state.snapshot = Some(snapshot);
        if state.finished {
            state.stop_auto("finished");
        }

        let view = state.view();
        self.views.send_replace(view.clone());
        Applied {
            view,
            goal_reached_now,
        }
    }

    /// Asks the engine to agree with a locally detected goal. The local
    /// finish stands whatever the engine answers.
    async fn follow_up(&self, applied: Applied) -> OrchestratorView {
        if !applied.goal_reached_now
            || applied.view.server_finished
            || !self.settings.confirm_goal_with_server
        {
            return applied.view;
        }

        match self.gateway.force_finish().await {
            Ok(snapshot) => {
                let actor = self.gateway.current_actor().await;
                self.apply(snapshot, actor, Transition::Finish).view
            }
            Err(err) => {
                self.record_failure(Operation::ForceFinish, err);
                self.view()
            }
        }
    }

    fn record_failure(&self, operation: Operation, err: ClientError) -> ClientError {
        warn!(
            target: "horizon::orchestrator",
            %operation,
            error = %err,
            "control.failed"
        );
        let mut state = self.state.lock();
        state.last_error = Some(err.display_message());
        // A failed step stops whichever loop is active, including one
        // respawned by a cadence change while the step was in flight.
        if operation == Operation::Step {
            state.stop_auto("step_failed");
        }
        self.views.send_replace(state.view());
        err
    }

    fn cancel_auto(&self, reason: &'static str) {
        let mut state = self.state.lock();
        if state.stop_auto(reason) {
            self.views.send_replace(state.view());
        }
    }

    /// Stops the auto-loop only if `epoch` is still the active one.
    pub(crate) fn stop_auto_for_epoch(&self, epoch: u64, reason: &'static str) {
        let mut state = self.state.lock();
        if state.auto.as_ref().map(AutoLoopHandle::epoch) == Some(epoch) {
            state.stop_auto(reason);
            self.views.send_replace(state.view());
        }
    }
}

impl<G: SimulationGateway + 'static> Orchestrator<G> {
    /// Flips the auto-loop. Enabling outside [`Phase::Running`] is a no-op.
    /// Returns whether the loop is running afterwards.
    pub fn toggle_auto(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        let enable = state.auto.is_none();
        self.set_auto_locked(&mut state, enable)
    }

    pub fn set_auto(self: &Arc<Self>, enabled: bool) -> bool {
        let mut state = self.state.lock();
        self.set_auto_locked(&mut state, enabled)
    }

    /// Changes the tick interval. A running loop is cancelled and restarted
    /// at the new interval; the tick already pending is discarded.
    pub fn set_cadence(self: &Arc<Self>, cadence: Cadence) -> Cadence {
        self.update_cadence(|_| cadence)
    }

    /// Moves one step along the speed ladder.
    pub fn speed_up(self: &Arc<Self>) -> Cadence {
        self.update_cadence(Cadence::next_faster)
    }

    fn update_cadence(self: &Arc<Self>, next: impl FnOnce(Cadence) -> Cadence) -> Cadence {
        let mut state = self.state.lock();
        let cadence = next(state.cadence);
        state.cadence = cadence;
        if state.stop_auto("cadence_changed") {
            self.spawn_auto_locked(&mut state);
        }
        info!(
            target: "horizon::orchestrator",
            cadence_ms = cadence.millis(),
            multiplier = cadence.multiplier(),
            "cadence.changed"
        );
        self.views.send_replace(state.view());
        cadence
    }

    fn set_auto_locked(self: &Arc<Self>, state: &mut OrchestratorState, enabled: bool) -> bool {
        if !enabled {
            if state.stop_auto("disabled") {
                self.views.send_replace(state.view());
            }
            return false;
        }
        if state.auto.is_some() {
            return true;
        }
        if state.phase() != Phase::Running {
            debug!(
                target: "horizon::orchestrator",
                phase = state.phase().as_str(),
                "auto_loop.enable_ignored"
            );
            return false;
        }
        self.spawn_auto_locked(state);
        self.views.send_replace(state.view());
        true
    }

    fn spawn_auto_locked(self: &Arc<Self>, state: &mut OrchestratorState) {
        let epoch = state.take_epoch();
        state.auto = Some(auto_loop::spawn(Arc::downgrade(self), state.cadence, epoch));
    }
}
