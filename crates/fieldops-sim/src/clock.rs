use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use fieldops_core::clock::{Clock, ManualClock};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// How simulated wall time moves between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Start of the run, in milliseconds since the epoch.
    pub start_millis: i64,
    /// Ordinary advance per round.
    pub step_millis: i64,
    /// Chance per round of a long jump instead of a step.
    pub jump_percent: u8,
    /// Upper bound of a long jump, in hours.
    pub max_jump_hours: u8,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            // Sat 2024-03-09 12:00 UTC, the day before the spring transition.
            start_millis: 1_709_985_600_000,
            step_millis: 15 * 60 * 1_000,
            jump_percent: 15,
            max_jump_hours: 30,
        }
    }
}

/// Shared simulated clock: the engine reads it, the simulator moves it.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    config: ClockConfig,
    inner: Arc<ManualClock>,
}

impl SimulatedClock {
    #[must_use]
    pub fn new(config: ClockConfig) -> Self {
        let start = DateTime::from_timestamp_millis(config.start_millis).unwrap_or_default();
        Self {
            config,
            inner: Arc::new(ManualClock::new(start)),
        }
    }

    /// Handle for the engine.
    #[must_use]
    pub fn handle(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner) as Arc<dyn Clock>
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }

    /// Advance by one round, sometimes by a long jump. Returns the advance.
    pub fn tick(&self, rng: &mut DeterministicRng) -> TimeDelta {
        let delta = if rng.chance(self.config.jump_percent) {
            let hours = rng.below(u64::from(self.config.max_jump_hours)) + 1;
            TimeDelta::hours(i64::try_from(hours).unwrap_or(1))
        } else {
            TimeDelta::milliseconds(self.config.step_millis)
        };
        self.inner.advance(delta);
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_handle_sees_ticks() {
        let clock = SimulatedClock::new(ClockConfig {
            jump_percent: 0,
            ..ClockConfig::default()
        });
        let handle = clock.handle();
        let before = handle.now();
        let mut rng = DeterministicRng::new(1);

        assert_eq!(clock.tick(&mut rng), TimeDelta::minutes(15));
        assert_eq!(handle.now() - before, TimeDelta::minutes(15));
    }

    #[test]
    fn jumps_stay_within_bound() {
        let clock = SimulatedClock::new(ClockConfig {
            jump_percent: 100,
            max_jump_hours: 4,
            ..ClockConfig::default()
        });
        let mut rng = DeterministicRng::new(9);
        for _ in 0..20 {
            let delta = clock.tick(&mut rng);
            assert!(delta >= TimeDelta::hours(1) && delta <= TimeDelta::hours(4));
        }
    }
}
