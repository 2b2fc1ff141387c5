#![allow(dead_code)]

//! In-process stand-in for the race engine's HTTP API.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use horizon_client::{ClientConfig, HttpGateway};
use horizon_schema::{Creature, Snapshot};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const BASE_PATH: &str = "/api/simulacao";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn load_fixture(name: &str) -> String {
    let path = fixture_path(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("missing fixture {}: {err}", path.display()))
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json_body(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn raw(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn error(status: u16, error: &str, message: &str) -> Self {
        Self::json(
            status,
            json!({
                "error": error,
                "message": message,
                "status": status,
                "timestamp": "2024-05-01T12:00:00.000+00:00"
            }),
        )
    }
}

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

struct EngineState {
    creatures: Vec<Creature>,
    inactive: Vec<Creature>,
    iteration: u64,
    finished: bool,
    count: u32,
}

impl EngineState {
    fn new(count: u32) -> Self {
        Self {
            creatures: (1..=count as i64)
                .map(|id| Creature::new(id, 0.0, 1_000_000.0))
                .collect(),
            inactive: Vec::new(),
            iteration: 0,
            finished: false,
            count,
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

    fn current(&self) -> i64 {
        if self.creatures.is_empty() {
            return -1;
        }
        self.creatures[(self.iteration as usize) % self.creatures.len()].id.0
    }
}

struct MockState {
    engine: Option<EngineState>,
    stride: f64,
    step_delay: Duration,
    requests: Vec<RecordedRequest>,
    scripted: VecDeque<(String, MockResponse)>,
}

type SharedState = Arc<Mutex<MockState>>;

/// Emulated engine served over loopback HTTP.
pub struct MockEngine {
    addr: SocketAddr,
    state: SharedState,
    task: JoinHandle<()>,
}

impl MockEngine {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock engine");
        let addr = listener.local_addr().expect("mock engine addr");
        let state = Arc::new(Mutex::new(MockState {
            engine: None,
            stride: 1_000.0,
            step_delay: Duration::ZERO,
            requests: Vec::new(),
            scripted: VecDeque::new(),
        }));

        let app = router(Arc::clone(&state));
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}{}", self.addr, BASE_PATH)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url(),
            request_timeout_ms: 2_000,
            connect_timeout_ms: 1_000,
            ..ClientConfig::default()
        }
    }

    pub fn gateway(&self) -> HttpGateway {
        HttpGateway::new(&self.config()).expect("gateway for mock engine")
    }

    pub fn set_stride(&self, stride: f64) {
        self.state.lock().stride = stride;
    }

    /// Delays every emulated `/iterar` answer by `delay`.
    pub fn set_step_delay(&self, delay: Duration) {
        self.state.lock().step_delay = delay;
    }

    /// Answers the next request to `route` (relative to the API base) with
    /// `response` instead of the emulated engine.
    pub fn respond_next(&self, route: &str, response: MockResponse) {
        self.state
            .lock()
            .scripted
            .push_back((format!("{BASE_PATH}{route}"), response));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn count(&self, route: &str) -> usize {
        let path = format!("{BASE_PATH}{route}");
        self.state
            .lock()
            .requests
            .iter()
            .filter(|request| request.path == path)
            .count()
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route(&format!("{BASE_PATH}/iniciar"), post(start_run))
        .route(&format!("{BASE_PATH}/iterar"), post(step_run))
        .route(&format!("{BASE_PATH}/resetar"), post(reset_run))
        .route(&format!("{BASE_PATH}/finalizar"), get(finish_run))
        .route(&format!("{BASE_PATH}/status"), get(run_status))
        .route(&format!("{BASE_PATH}/criatura-atual"), get(current_creature))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            record_request,
        ))
        .with_state(state)
}

/// Records every request and answers from the scripted queue when an entry
/// matches its path.
async fn record_request(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let recorded = RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        body: String::from_utf8_lossy(&bytes).into_owned(),
    };

    let scripted = {
        let mut state = state.lock();
        let scripted = state
            .scripted
            .iter()
            .position(|(path, _)| *path == recorded.path)
            .and_then(|index| state.scripted.remove(index))
            .map(|(_, response)| response);
        state.requests.push(recorded);
        scripted
    };
    if let Some(response) = scripted {
        return response.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn start_run(State(state): State<SharedState>, Json(body): Json<Value>) -> MockResponse {
    let quantidade = body.get("quantidade").and_then(Value::as_u64).unwrap_or(0);
    if !(2..=10).contains(&quantidade) {
        return MockResponse::error(
            400,
            "Bad Request",
            "quantidade: A quantidade de criaturas deve estar entre 2 e 10.",
        );
    }
    let engine = EngineState::new(quantidade as u32);
    let response = snapshot_response(&engine.snapshot());
    state.lock().engine = Some(engine);
    response
}

async fn step_run(State(state): State<SharedState>) -> MockResponse {
    let delay = state.lock().step_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut state = state.lock();
    let stride = state.stride;
    with_engine(&mut state, |engine| {
        if !engine.finished && !engine.creatures.is_empty() {
            let index = (engine.iteration as usize) % engine.creatures.len();
            engine.creatures[index].x += stride;
            if engine.creatures[index].reached_goal() {
                engine.finished = true;
            }
            engine.iteration += 1;
        }
        snapshot_response(&engine.snapshot())
    })
}

async fn reset_run(State(state): State<SharedState>) -> MockResponse {
    with_engine(&mut state.lock(), |engine| {
        *engine = EngineState::new(engine.count);
        snapshot_response(&engine.snapshot())
    })
}

async fn finish_run(State(state): State<SharedState>) -> MockResponse {
    with_engine(&mut state.lock(), |engine| {
        engine.finished = true;
        snapshot_response(&engine.snapshot())
    })
}

async fn run_status(State(state): State<SharedState>) -> MockResponse {
    with_engine(&mut state.lock(), |engine| {
        snapshot_response(&engine.snapshot())
    })
}

async fn current_creature(State(state): State<SharedState>) -> Json<i64> {
    let current = state
        .lock()
        .engine
        .as_ref()
        .map(EngineState::current)
        .unwrap_or(-1);
    Json(current)
}

async fn not_found() -> MockResponse {
    MockResponse::raw(404, "text/plain", "not found")
}

fn with_engine(
    state: &mut MockState,
    f: impl FnOnce(&mut EngineState) -> MockResponse,
) -> MockResponse {
    match state.engine.as_mut() {
        Some(engine) => f(engine),
        None => MockResponse::error(
            409,
            "Conflict",
            "simulacao: A simulação não foi iniciada corretamente.",
        ),
    }
}

fn snapshot_response(snapshot: &Snapshot) -> MockResponse {
    MockResponse::json(
        200,
        serde_json::to_value(snapshot).expect("snapshot serializes"),
    )
}
