use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};

use crate::{
    battery::{Command, Timeline},
    quantity::{charge::MilliampHours, current::Milliamps},
};

/// Coulomb-counting state of charge estimate.
///
/// The estimate starts from a baseline and integrates the commanded current since then. It never
/// goes below zero.
pub struct SocEstimator(Mutex<State>);

struct State {
    estimate: f64,
    updated_at: DateTime<Local>,
    timeline: Timeline,
}

impl State {
    fn advance(&mut self, now: DateTime<Local>) {
        if now > self.updated_at {
            self.estimate = (self.estimate - self.timeline.drain(self.updated_at, now)).max(0.0);
            self.updated_at = now;
        }
    }
}

impl SocEstimator {
    pub fn new(now: DateTime<Local>) -> Self {
        Self(Mutex::new(State { estimate: 0.0, updated_at: now, timeline: Timeline::default() }))
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn estimate(&self, now: DateTime<Local>) -> MilliampHours {
        let mut state = self.lock();
        state.advance(now);
        MilliampHours(state.estimate.round() as i64)
    }

    pub fn rebase(&self, now: DateTime<Local>, state_of_charge: MilliampHours) {
        let mut state = self.lock();
        state.advance(now);
        state.estimate = state_of_charge.to_f64().max(0.0);
    }

    pub fn hold(&self, now: DateTime<Local>, current: Milliamps) {
        let mut state = self.lock();
        state.advance(now);
        state.timeline.hold(current);
    }

    pub fn schedule(&self, now: DateTime<Local>, command: Command) {
        let mut state = self.lock();
        state.advance(now);
        state.timeline.schedule(command);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::interval::Interval;

    #[test]
    fn integrates_held_current() {
        let now = Local::now();
        let estimator = SocEstimator::new(now);
        estimator.rebase(now, MilliampHours(5000));
        estimator.hold(now, Milliamps(1000));
        assert_eq!(estimator.estimate(now + TimeDelta::hours(2)), MilliampHours(3000));
    }

    #[test]
    fn honours_the_window() {
        let now = Local::now();
        let estimator = SocEstimator::new(now);
        estimator.rebase(now, MilliampHours(1000));
        estimator.schedule(
            now,
            Command {
                target: Milliamps(-2000),
                is_greater_than: false,
                window: Interval::new(now + TimeDelta::hours(1), now + TimeDelta::hours(2)),
            },
        );
        assert_eq!(estimator.estimate(now + TimeDelta::hours(1)), MilliampHours(1000));
        assert_eq!(estimator.estimate(now + TimeDelta::hours(3)), MilliampHours(3000));
    }

    #[test]
    fn never_negative() {
        let now = Local::now();
        let estimator = SocEstimator::new(now);
        estimator.rebase(now, MilliampHours(100));
        estimator.hold(now, Milliamps(1000));
        assert_eq!(estimator.estimate(now + TimeDelta::hours(1)), MilliampHours(0));
    }
}
