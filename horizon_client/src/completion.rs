//! Local goal detection.
//!
//! The engine's `finished` flag can lag one step behind the positions it
//! reports, so the orchestrator also checks the positions itself.

use horizon_schema::{Creature, CreatureId, Snapshot, GOAL_POSITION};

/// First active creature, in list order, standing at or past the goal.
pub fn detect_winner(snapshot: &Snapshot) -> Option<CreatureId> {
    snapshot
        .status_creatures
        .iter()
        .find(|creature| creature.reached_goal())
        .map(|creature| creature.id)
}

/// Fraction of the way to the goal, clamped to `[0, 1]`.
pub fn goal_progress(creature: &Creature) -> f64 {
    if !creature.x.is_finite() {
        return 0.0;
    }
    (creature.x / GOAL_POSITION).clamp(0.0, 1.0)
}
