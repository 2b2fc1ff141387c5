use horizon_schema::{ErrorBody, SnapshotViolation};
use thiserror::Error;

use crate::gateway::Operation;

/// Every failure the client surfaces, grouped the way callers react to them.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Text suitable for showing next to the last good snapshot.
    pub fn display_message(&self) -> String {
        match self {
            ClientError::Domain(err) => err.body.display_message().to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, ClientError::Domain(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

/// Bad local input, or a response that does not look like what the engine
/// promises to send.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("creature count {count} is below the minimum of {minimum}")]
    CreatureCountBelowMinimum { count: u32, minimum: u32 },
    #[error("creature count {count} exceeds the maximum of {maximum}")]
    CreatureCountAboveMaximum { count: u32, maximum: u32 },
    #[error("cadence must be a positive number of milliseconds")]
    InvalidCadence,
    #[error("bearer token contains characters not allowed in a header")]
    InvalidBearerToken,
    #[error("{operation} returned a malformed body: {source}")]
    MalformedResponse {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },
    #[error("{operation} returned an inconsistent snapshot: {source}")]
    Snapshot {
        operation: Operation,
        #[source]
        source: SnapshotViolation,
    },
}

/// Structured rejection reported by the engine.
#[derive(Debug, Error)]
#[error("{operation} rejected by server ({status}): {}", .body.message)]
pub struct DomainError {
    pub operation: Operation,
    pub status: u16,
    pub body: ErrorBody,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{operation} request failed: {source}")]
    Request {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: Operation,
        status: u16,
        body: String,
    },
    #[error("{operation} returned a non-JSON body (HTTP {status})")]
    NonJsonBody { operation: Operation, status: u16 },
}
