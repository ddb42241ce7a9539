use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, TimeDelta};

/// Source of the current time for status caches, estimators and simulators.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock.
#[derive(Copy, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to, for simulations and tests.
pub struct ManualClock(Mutex<DateTime<Local>>);

impl ManualClock {
    #[must_use]
    pub const fn starting_at(now: DateTime<Local>) -> Self {
        Self(Mutex::new(now))
    }

    /// Move the clock forward and return the new time.
    pub fn advance(&self, by: TimeDelta) -> DateTime<Local> {
        let mut now = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
