//! Cycle derivation from wall-clock time.
//!
//! Cycle 0 covers everything before the pool's start time. From the start
//! time on, cycle `n` spans `[start + (n - 1) * interval, start + n * interval)`.

use serde::Serialize;

/// Position of a pool in its release schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "cycle")]
pub enum CycleState {
    /// No start time set, or it has not been reached.
    NotStarted,
    /// Cycle `n >= 1` is current.
    Active(u64),
}

impl CycleState {
    /// Numeric cycle index; `NotStarted` is 0.
    pub fn index(self) -> u64 {
        match self {
            Self::NotStarted => 0,
            Self::Active(n) => n,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Start time and interval of a release schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleSchedule {
    pub start_time: Option<u64>,
    /// Cycle length in seconds. Zero is rejected by pool configuration.
    pub interval: u64,
}

impl CycleSchedule {
    pub fn new(start_time: Option<u64>, interval: u64) -> Self {
        Self { start_time, interval }
    }

    /// Cycle state at Unix time `now`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stakepool_rewards::{CycleSchedule, CycleState};
    /// let s = CycleSchedule::new(Some(100), 10);
    /// assert_eq!(s.state_at(99), CycleState::NotStarted);
    /// assert_eq!(s.state_at(100), CycleState::Active(1));
    /// assert_eq!(s.state_at(125), CycleState::Active(3));
    /// ```
    pub fn state_at(&self, now: u64) -> CycleState {
        match self.start_time {
            Some(start) if now >= start && self.interval > 0 => {
                CycleState::Active((now - start) / self.interval + 1)
            }
            _ => CycleState::NotStarted,
        }
    }

    /// Unix time at which cycle `n` becomes current. `None` for cycle 0, an
    /// unset start time, or an unrepresentable instant.
    pub fn cycle_start(&self, n: u64) -> Option<u64> {
        let start = self.start_time?;
        let elapsed = n.checked_sub(1)?.checked_mul(self.interval)?;
        start.checked_add(elapsed)
    }
}
