use std::fmt;
use std::time::Duration;

use crate::error::ValidationError;

/// Intervals offered by the speed control, fastest last.
pub const CADENCE_LADDER: [u64; 4] = [500, 250, 167, 125];

/// Interval between auto-loop ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cadence(u64);

impl Cadence {
    pub const BASE: Cadence = Cadence(CADENCE_LADDER[0]);

    pub fn new(millis: u64) -> Result<Self, ValidationError> {
        if millis == 0 {
            return Err(ValidationError::InvalidCadence);
        }
        Ok(Self(millis))
    }

    pub fn millis(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// Next step on the ladder. Wraps to the base cadence after the fastest
    /// entry; an off-ladder cadence also returns to the base.
    pub fn next_faster(self) -> Cadence {
        match CADENCE_LADDER.iter().position(|&ms| ms == self.0) {
            Some(index) => Cadence(CADENCE_LADDER[(index + 1) % CADENCE_LADDER.len()]),
            None => Cadence::BASE,
        }
    }

    /// Nominal speed relative to the base cadence, as shown to the user.
    pub fn multiplier(self) -> u32 {
        (Cadence::BASE.0 as f64 / self.0 as f64).round() as u32
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence::BASE
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms ({}x)", self.0, self.multiplier())
    }
}
