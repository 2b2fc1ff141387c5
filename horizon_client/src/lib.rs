//! Client-side control of a remotely simulated creature race.
//!
//! The engine owns the rules; this crate drives it over HTTP through
//! [`HttpGateway`], keeps the last good [`Snapshot`] in an [`Orchestrator`],
//! and steps it on a timer when the auto-loop is enabled.

mod auto_loop;
pub mod cadence;
pub mod completion;
pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;

#[cfg(test)]
mod testing;

pub use cadence::{Cadence, CADENCE_LADDER};
pub use completion::{detect_winner, goal_progress};
pub use config::{
    load_client_config_from_env, load_or_builtin, ClientConfig, ClientConfigError,
};
pub use error::{ClientError, DomainError, TransportError, ValidationError};
pub use gateway::{validate_creature_count, HttpGateway, Operation, SimulationGateway};
pub use orchestrator::{
    ControlOutcome, IgnoreReason, Orchestrator, OrchestratorSettings, OrchestratorView, Phase,
};

pub use horizon_schema::{Creature, CreatureId, Snapshot};
