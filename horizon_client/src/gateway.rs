use std::fmt;
use std::future::Future;
use std::time::Instant;

use horizon_schema::{
    CreatureId, ErrorBody, Snapshot, StartRequest, MAX_CREATURES, MIN_CREATURES,
};
use reqwest::{header, Client, Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, DomainError, TransportError, ValidationError};

const MAX_ERROR_BODY_CHARS: usize = 256;

/// Remote control endpoints exposed by the simulation engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Start,
    Step,
    Reset,
    ForceFinish,
    CurrentActor,
    Status,
}

impl Operation {
    pub fn method(self) -> Method {
        match self {
            Operation::Start | Operation::Step | Operation::Reset => Method::POST,
            Operation::ForceFinish | Operation::CurrentActor | Operation::Status => Method::GET,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Operation::Start => "/iniciar",
            Operation::Step => "/iterar",
            Operation::Reset => "/resetar",
            Operation::ForceFinish => "/finalizar",
            Operation::CurrentActor => "/criatura-atual",
            Operation::Status => "/status",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Step => "step",
            Operation::Reset => "reset",
            Operation::ForceFinish => "force_finish",
            Operation::CurrentActor => "current_actor",
            Operation::Status => "status",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request/response contract of the remote engine.
///
/// Implementations never retry and never cache; each call maps to exactly one
/// round trip (or none, when a local precondition fails).
pub trait SimulationGateway: Send + Sync {
    fn start(
        &self,
        creature_count: u32,
    ) -> impl Future<Output = Result<Snapshot, ClientError>> + Send;

    fn step(&self) -> impl Future<Output = Result<Snapshot, ClientError>> + Send;

    fn reset(&self) -> impl Future<Output = Result<Snapshot, ClientError>> + Send;

    fn force_finish(&self) -> impl Future<Output = Result<Snapshot, ClientError>> + Send;

    /// Creature whose turn is next, or `None` when the engine has none.
    fn current_actor(
        &self,
    ) -> impl Future<Output = Result<Option<CreatureId>, ClientError>> + Send;

    /// Current snapshot without advancing the run.
    fn status(&self) -> impl Future<Output = Result<Snapshot, ClientError>> + Send;
}

pub fn validate_creature_count(count: u32) -> Result<u32, ValidationError> {
    if count < MIN_CREATURES {
        return Err(ValidationError::CreatureCountBelowMinimum {
            count,
            minimum: MIN_CREATURES,
        });
    }
    if count > MAX_CREATURES {
        return Err(ValidationError::CreatureCountAboveMaximum {
            count,
            maximum: MAX_CREATURES,
        });
    }
    Ok(count)
}

/// [`SimulationGateway`] over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = &config.bearer_token {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ValidationError::InvalidBearerToken)?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .default_headers(headers)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(
        &self,
        operation: Operation,
        body: Option<&StartRequest>,
    ) -> Result<Value, ClientError> {
        let url = join_url(&self.base_url, operation.path());
        let started = Instant::now();

        let mut request = self.client.request(operation.method(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|source| TransportError::Request { operation, source })?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| TransportError::Request { operation, source })?;

        debug!(
            target: "horizon::gateway",
            %operation,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gateway.response"
        );

        if !status.is_success() {
            return Err(classify_failure(operation, status, &bytes));
        }

        serde_json::from_slice::<Value>(&bytes).map_err(|_| {
            TransportError::NonJsonBody {
                operation,
                status: status.as_u16(),
            }
            .into()
        })
    }

    async fn snapshot(
        &self,
        operation: Operation,
        body: Option<&StartRequest>,
    ) -> Result<Snapshot, ClientError> {
        let value = self.call(operation, body).await?;
        decode_snapshot(operation, value)
    }
}

impl SimulationGateway for HttpGateway {
    async fn start(&self, creature_count: u32) -> Result<Snapshot, ClientError> {
        let quantidade = validate_creature_count(creature_count)?;
        self.snapshot(Operation::Start, Some(&StartRequest { quantidade }))
            .await
    }

    async fn step(&self) -> Result<Snapshot, ClientError> {
        self.snapshot(Operation::Step, None).await
    }

    async fn reset(&self) -> Result<Snapshot, ClientError> {
        self.snapshot(Operation::Reset, None).await
    }

    async fn force_finish(&self) -> Result<Snapshot, ClientError> {
        self.snapshot(Operation::ForceFinish, None).await
    }

    async fn current_actor(&self) -> Result<Option<CreatureId>, ClientError> {
        let value = self.call(Operation::CurrentActor, None).await?;
        decode_actor(value)
    }

    async fn status(&self) -> Result<Snapshot, ClientError> {
        self.snapshot(Operation::Status, None).await
    }
}

/// Shape-checks a decoded JSON body and its structural invariants.
pub fn decode_snapshot(operation: Operation, value: Value) -> Result<Snapshot, ClientError> {
    let snapshot: Snapshot = serde_json::from_value(value)
        .map_err(|source| ValidationError::MalformedResponse { operation, source })?;
    snapshot
        .check_invariants()
        .map_err(|source| ValidationError::Snapshot { operation, source })?;
    Ok(snapshot)
}

/// The engine answers `-1` when no creature is due to act.
pub fn decode_actor(value: Value) -> Result<Option<CreatureId>, ClientError> {
    let raw: i64 = serde_json::from_value(value).map_err(|source| {
        ValidationError::MalformedResponse {
            operation: Operation::CurrentActor,
            source,
        }
    })?;
    Ok((raw >= 0).then_some(CreatureId(raw)))
}

fn classify_failure(operation: Operation, status: StatusCode, bytes: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorBody>(bytes) {
        Ok(body) => DomainError {
            operation,
            status: status.as_u16(),
            body,
        }
        .into(),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes);
            TransportError::Status {
                operation,
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            }
            .into()
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
