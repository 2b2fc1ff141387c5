//! Wire contracts for the creature horizon simulation service.
//!
//! These types mirror the JSON bodies exchanged with the remote engine. They
//! carry no behaviour beyond structural checks so that both the client crate
//! and developer tooling can share them without pulling in HTTP machinery.

use std::collections::HashSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position at which a creature is considered to have reached the horizon.
pub const GOAL_POSITION: f64 = 10_000_000.0;

/// Smallest creature count the engine accepts for a new run.
pub const MIN_CREATURES: u32 = 2;

/// Largest creature count the engine accepts for a new run.
pub const MAX_CREATURES: u32 = 10;

/// Identifier of a creature, unique within one simulation run.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct CreatureId(pub i64);

impl fmt::Display for CreatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Creature {
    pub id: CreatureId,
    pub x: f64,
    pub gold: f64,
}

impl Creature {
    pub fn new(id: i64, x: f64, gold: f64) -> Self {
        Self {
            id: CreatureId(id),
            x,
            gold,
        }
    }

    pub fn reached_goal(&self) -> bool {
        self.x >= GOAL_POSITION
    }
}

/// One point-in-time view of a run as reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Active creatures in server display order.
    pub status_creatures: Vec<Creature>,
    pub inactive_creatures: Vec<Creature>,
    pub iteration_count: u64,
    pub finished: bool,
}

/// Structural problems detected in a decoded [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotViolation {
    #[error("creature {id} listed more than once in the {list} list")]
    DuplicateCreature { id: CreatureId, list: &'static str },
    #[error("creature {id} is both active and inactive")]
    ActiveAndInactive { id: CreatureId },
    #[error("creature {id} has invalid position {x}")]
    InvalidPosition { id: CreatureId, x: f64 },
    #[error("creature {id} has invalid gold amount {gold}")]
    InvalidGold { id: CreatureId, gold: f64 },
}

impl Snapshot {
    pub fn active_count(&self) -> usize {
        self.status_creatures.len()
    }

    pub fn inactive_count(&self) -> usize {
        self.inactive_creatures.len()
    }

    /// Looks a creature up in both lists. A miss is not an error: the id may
    /// belong to a creature that left the run since it was selected.
    pub fn find(&self, id: CreatureId) -> Option<&Creature> {
        self.status_creatures
            .iter()
            .chain(self.inactive_creatures.iter())
            .find(|creature| creature.id == id)
    }

    /// Active creature furthest along the horizon. Ties keep list order.
    pub fn leader(&self) -> Option<&Creature> {
        self.status_creatures.iter().fold(None, |best, creature| match best {
            Some(current) if current.x >= creature.x => Some(current),
            _ => Some(creature),
        })
    }

    pub fn check_invariants(&self) -> Result<(), SnapshotViolation> {
        let active = collect_ids(&self.status_creatures, "active")?;
        let inactive = collect_ids(&self.inactive_creatures, "inactive")?;

        // Report in active-list order so the first offender is deterministic.
        if let Some(creature) = self
            .status_creatures
            .iter()
            .find(|creature| inactive.contains(&creature.id))
        {
            return Err(SnapshotViolation::ActiveAndInactive { id: creature.id });
        }
        debug_assert!(active.is_disjoint(&inactive));

        for creature in self
            .status_creatures
            .iter()
            .chain(self.inactive_creatures.iter())
        {
            if !creature.x.is_finite() || creature.x < 0.0 {
                return Err(SnapshotViolation::InvalidPosition {
                    id: creature.id,
                    x: creature.x,
                });
            }
            if !creature.gold.is_finite() || creature.gold < 0.0 {
                return Err(SnapshotViolation::InvalidGold {
                    id: creature.id,
                    gold: creature.gold,
                });
            }
        }
        Ok(())
    }
}

fn collect_ids(
    creatures: &[Creature],
    list: &'static str,
) -> Result<HashSet<CreatureId>, SnapshotViolation> {
    let mut seen = HashSet::with_capacity(creatures.len());
    for creature in creatures {
        if !seen.insert(creature.id) {
            return Err(SnapshotViolation::DuplicateCreature {
                id: creature.id,
                list,
            });
        }
    }
    Ok(seen)
}

/// Body of `POST /iniciar`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartRequest {
    pub quantidade: u32,
}

/// Structured error body returned by the engine on a rejected request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorBody {
    /// Message without the leading `field: ` prefix the engine adds to
    /// validation failures.
    pub fn display_message(&self) -> &str {
        match self.message.split_once(": ") {
            Some((_, rest)) => rest,
            None => &self.message,
        }
    }
}

pub fn decode_snapshot_json(data: &str) -> serde_json::Result<Snapshot> {
    serde_json::from_str(data)
}

pub fn snapshot_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(Snapshot)
}
