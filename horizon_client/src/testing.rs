//! Scripted in-memory engine used by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use horizon_schema::{Creature, CreatureId, ErrorBody, Snapshot};
use parking_lot::Mutex;

use crate::error::{ClientError, DomainError, TransportError};
use crate::gateway::{validate_creature_count, Operation, SimulationGateway};

#[derive(Debug)]
struct Engine {
    creatures: Vec<Creature>,
    inactive: Vec<Creature>,
    iteration: u64,
    finished: bool,
    initial_count: u32,
}

impl Engine {
    fn new(count: u32) -> Self {
        Self {
            creatures: (1..=count as i64)
                .map(|id| Creature::new(id, 0.0, 1_000_000.0))
                .collect(),
            inactive: Vec::new(),
            iteration: 0,
            finished: false,
            initial_count: count,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            status_creatures: self.creatures.clone(),
            inactive_creatures: self.inactive.clone(),
            iteration_count: self.iteration,
            finished: self.finished,
        }
    }

    fn current(&self) -> Option<CreatureId> {
        if self.creatures.is_empty() {
            return None;
        }
        let index = (self.iteration as usize) % self.creatures.len();
        Some(self.creatures[index].id)
    }
}

#[derive(Debug)]
struct FakeInner {
    engine: Mutex<Option<Engine>>,
    stride: Mutex<f64>,
    marks_finished_on_goal: Mutex<bool>,
    step_delay: Mutex<Duration>,
    failures: Mutex<VecDeque<(Operation, ClientError)>>,
    calls: Mutex<Vec<Operation>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Deterministic engine: each step moves the creature whose turn it is by a
/// fixed stride.
#[derive(Debug, Clone)]
pub(crate) struct FakeGateway {
    inner: Arc<FakeInner>,
}

impl FakeGateway {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(FakeInner {
                engine: Mutex::new(None),
                stride: Mutex::new(1_000.0),
                marks_finished_on_goal: Mutex::new(true),
                step_delay: Mutex::new(Duration::ZERO),
                failures: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub(crate) fn with_stride(self, stride: f64) -> Self {
        *self.inner.stride.lock() = stride;
        self
    }

    pub(crate) fn with_step_delay(self, delay: Duration) -> Self {
        *self.inner.step_delay.lock() = delay;
        self
    }

    /// Simulates an engine whose `finished` flag lags behind positions.
    pub(crate) fn lagging_finish_flag(self) -> Self {
        *self.inner.marks_finished_on_goal.lock() = false;
        self
    }

    pub(crate) fn fail_next(&self, operation: Operation, error: ClientError) {
        self.inner.failures.lock().push_back((operation, error));
    }

    pub(crate) fn calls(&self, operation: Operation) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, operation: Operation) -> Result<(), ClientError> {
        self.inner.calls.lock().push(operation);
        let mut failures = self.inner.failures.lock();
        if failures.front().map(|(op, _)| *op) == Some(operation) {
            if let Some((_, error)) = failures.pop_front() {
                return Err(error);
            }
        }
        Ok(())
    }

    fn with_engine<T>(
        &self,
        f: impl FnOnce(&mut Engine) -> T,
    ) -> Result<T, ClientError> {
        let mut engine = self.inner.engine.lock();
        match engine.as_mut() {
            Some(engine) => Ok(f(engine)),
            None => Err(not_started()),
        }
    }
}

pub(crate) fn transport_failure(operation: Operation) -> ClientError {
    TransportError::Status {
        operation,
        status: 503,
        body: "service unavailable".to_string(),
    }
    .into()
}

fn not_started() -> ClientError {
    DomainError {
        operation: Operation::Step,
        status: 409,
        body: ErrorBody {
            error: "Conflict".into(),
            message: "A simulação não foi iniciada corretamente.".into(),
            status: 409,
            timestamp: "2024-05-01T12:00:00Z".into(),
        },
    }
    .into()
}

impl SimulationGateway for FakeGateway {
    async fn start(&self, creature_count: u32) -> Result<Snapshot, ClientError> {
        let count = validate_creature_count(creature_count)?;
        self.record(Operation::Start)?;
        let engine = Engine::new(count);
        let snapshot = engine.snapshot();
        *self.inner.engine.lock() = Some(engine);
        Ok(snapshot)
    }

    async fn step(&self) -> Result<Snapshot, ClientError> {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.inner.step_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = self.record(Operation::Step).and_then(|_| {
            let stride = *self.inner.stride.lock();
            let marks_finished = *self.inner.marks_finished_on_goal.lock();
            self.with_engine(|engine| {
                if !engine.finished {
                    let len = engine.creatures.len();
                    if len > 0 {
                        let index = (engine.iteration as usize) % len;
                        engine.creatures[index].x += stride;
                        if marks_finished && engine.creatures[index].reached_goal() {
                            engine.finished = true;
                        }
                    }
                    engine.iteration += 1;
                }
                engine.snapshot()
            })
        });

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn reset(&self) -> Result<Snapshot, ClientError> {
        self.record(Operation::Reset)?;
        self.with_engine(|engine| {
            *engine = Engine::new(engine.initial_count);
            engine.snapshot()
        })
    }

    async fn force_finish(&self) -> Result<Snapshot, ClientError> {
        self.record(Operation::ForceFinish)?;
        self.with_engine(|engine| {
            engine.finished = true;
            engine.snapshot()
        })
    }

    async fn current_actor(&self) -> Result<Option<CreatureId>, ClientError> {
        self.record(Operation::CurrentActor)?;
        self.with_engine(|engine| engine.current())
    }

    async fn status(&self) -> Result<Snapshot, ClientError> {
        self.record(Operation::Status)?;
        self.with_engine(|engine| engine.snapshot())
    }
}
