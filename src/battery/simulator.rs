use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bon::bon;
use chrono::{DateTime, Local, TimeDelta};
use tracing::{debug, instrument, warn};

use crate::{
    battery::{
        Battery,
        BatteryKind,
        BatteryStatus,
        Command,
        SocEstimator,
        StatusCache,
        Timeline,
    },
    clock::Clock,
    error::{Error, Result},
    interval::Interval,
    quantity::{charge::MilliampHours, current::Milliamps},
};

/// Physical battery simulated in-process.
///
/// The simulation integrates the enacted current over time and keeps the state of charge within
/// `0..=max_capacity`. Every refresh advances the simulation up to the clock's current time.
pub struct SimulatedBattery {
    name: String,
    clock: Arc<dyn Clock>,
    cache: StatusCache,
    estimator: SocEstimator,
    state: Mutex<State>,
}

struct State {
    /// Fractional state of charge, so that short ticks do not get lost to rounding.
    residual: f64,

    status: BatteryStatus,
    updated_at: DateTime<Local>,
    timeline: Timeline,
}

#[bon]
impl SimulatedBattery {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        clock: Arc<dyn Clock>,
        staleness: TimeDelta,
        initial: BatteryStatus,
    ) -> Self {
        let now = clock.now();
        let estimator = SocEstimator::new(now);
        estimator.rebase(now, initial.state_of_charge);
        let status = BatteryStatus { current: Milliamps(0), ..initial };
        Self {
            name,
            clock,
            cache: StatusCache::new(staleness),
            estimator,
            state: Mutex::new(State {
                residual: status.state_of_charge.to_f64(),
                status,
                updated_at: now,
                timeline: Timeline::default(),
            }),
        }
    }
}

impl SimulatedBattery {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring the simulation up to the moment.
    #[allow(clippy::cast_possible_truncation)]
    fn advance(&self, state: &mut State, now: DateTime<Local>) {
        if now > state.updated_at {
            let drained = state.timeline.drain(state.updated_at, now);
            let max_capacity = state.status.max_capacity.to_f64();
            state.residual = (state.residual - drained).clamp(0.0, max_capacity);
            state.updated_at = now;
        }
        state.status.state_of_charge = MilliampHours(state.residual.round() as i64);
        state.status.current = state.timeline.current_at(now);
        debug!(
            name = %self.name,
            state_of_charge = ?state.status.state_of_charge,
            current = ?state.status.current,
            n_pending = state.timeline.n_pending(),
            "advanced",
        );
    }

    fn check_limits(&self, status: &BatteryStatus, target: Milliamps) -> Result {
        if status.allows(target) {
            Ok(())
        } else {
            warn!(name = %self.name, ?target, "target current is beyond the device limits");
            Err(Error::CurrentLimitExceeded {
                target,
                max_charging: status.max_charging_current,
                max_discharging: status.max_discharging_current,
            })
        }
    }
}

impl Battery for SimulatedBattery {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BatteryKind {
        BatteryKind::Physical
    }

    fn refresh(&self) -> Result<BatteryStatus> {
        let now = self.clock.now();
        let status = {
            let mut state = self.lock();
            self.advance(&mut state, now);
            state.status
        };
        self.cache.store(now, status);
        Ok(status)
    }

    fn get_status(&self) -> Result<BatteryStatus> {
        self.cache.get_or_refresh(self.clock.now(), || self.refresh())
    }

    #[instrument(skip_all, fields(name = %self.name, ?target))]
    fn set_current(&self, target: Milliamps, is_greater_than: bool) -> Result {
        let now = self.clock.now();
        let mut state = self.lock();
        self.check_limits(&state.status, target)?;
        self.advance(&mut state, now);
        state.timeline.hold(target);
        state.status.current = target;
        drop(state);
        self.estimator.hold(now, target);
        debug!(is_greater_than, "holding");
        Ok(())
    }

    #[instrument(skip_all, fields(name = %self.name, ?target, ?window))]
    fn schedule_set_current(
        &self,
        target: Milliamps,
        is_greater_than: bool,
        window: Interval,
    ) -> Result {
        if window.is_empty() {
            warn!("empty scheduling window");
            return Err(Error::EmptyWindow);
        }
        let now = self.clock.now();
        let mut state = self.lock();
        self.check_limits(&state.status, target)?;
        self.advance(&mut state, now);
        let command = Command { target, is_greater_than, window };
        state.timeline.schedule(command);
        state.status.current = state.timeline.current_at(now);
        drop(state);
        self.estimator.schedule(now, command);
        debug!(is_greater_than, "scheduled");
        Ok(())
    }

    fn get_estimated_soc(&self) -> MilliampHours {
        self.estimator.estimate(self.clock.now())
    }

    fn set_estimated_soc(&self, state_of_charge: MilliampHours) {
        self.estimator.rebase(self.clock.now(), state_of_charge);
    }

    fn reset_estimated_soc(&self) {
        if let Some(status) = self.cache.last() {
            self.set_estimated_soc(status.state_of_charge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        directory::Directory,
        policy::{Binding, Splitter},
        quantity::voltage::Millivolts,
    };

    fn battery(clock: Arc<ManualClock>) -> SimulatedBattery {
        SimulatedBattery::builder()
            .name("pack")
            .clock(clock)
            .staleness(TimeDelta::zero())
            .initial(
                BatteryStatus::builder()
                    .voltage(Millivolts(48_000))
                    .state_of_charge(MilliampHours(10_000))
                    .max_capacity(MilliampHours(20_000))
                    .max_charging_current(Milliamps(5000))
                    .max_discharging_current(Milliamps(8000))
                    .build(),
            )
            .build()
    }

    #[test]
    fn discharges_over_time() {
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        let battery = battery(clock.clone());
        battery.set_current(Milliamps(2000), false).unwrap();
        clock.advance(TimeDelta::hours(1));
        let status = battery.refresh().unwrap();
        assert_eq!(status.state_of_charge, MilliampHours(8000));
        assert_eq!(status.current, Milliamps(2000));
        assert_eq!(status.voltage, Millivolts(48_000));
        assert_eq!(battery.get_estimated_soc(), MilliampHours(8000));
    }

    #[test]
    fn clamps_at_capacity() {
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        let battery = battery(clock.clone());
        battery.set_current(Milliamps(-5000), false).unwrap();
        clock.advance(TimeDelta::hours(3));
        assert_eq!(battery.refresh().unwrap().state_of_charge, MilliampHours(20_000));
    }

    #[test]
    fn enacts_the_window() {
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        let battery = battery(clock.clone());
        let start = clock.now() + TimeDelta::minutes(30);
        battery
            .schedule_set_current(
                Milliamps(4000),
                false,
                Interval::new(start, start + TimeDelta::minutes(30)),
            )
            .unwrap();
        assert_eq!(battery.refresh().unwrap().current, Milliamps(0));

        clock.advance(TimeDelta::minutes(45));
        let status = battery.refresh().unwrap();
        assert_eq!(status.current, Milliamps(4000));
        assert_eq!(status.state_of_charge, MilliampHours(9000));

        clock.advance(TimeDelta::hours(1));
        let status = battery.refresh().unwrap();
        assert_eq!(status.current, Milliamps(0));
        assert_eq!(status.state_of_charge, MilliampHours(8000));
    }

    #[test]
    fn rejects_beyond_limits() {
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        let battery = battery(clock);
        assert!(matches!(
            battery.set_current(Milliamps(8001), false),
            Err(Error::CurrentLimitExceeded { .. }),
        ));
        assert!(matches!(
            battery.set_current(Milliamps(-5001), false),
            Err(Error::CurrentLimitExceeded { .. }),
        ));
        assert_eq!(battery.refresh().unwrap().current, Milliamps(0));
    }

    #[test]
    fn rejects_the_most_negative_current() {
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        let battery = battery(clock.clone());
        assert!(matches!(
            battery.set_current(Milliamps(i64::MIN), false),
            Err(Error::CurrentLimitExceeded { .. }),
        ));
        let start = clock.now();
        assert!(matches!(
            battery.schedule_set_current(
                Milliamps(i64::MIN),
                false,
                Interval::new(start, start + TimeDelta::hours(1)),
            ),
            Err(Error::CurrentLimitExceeded { .. }),
        ));
    }

    #[test]
    fn enacts_a_floor_exactly() {
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        let battery = battery(clock.clone());
        battery.set_current(Milliamps(1000), true).unwrap();
        clock.advance(TimeDelta::hours(1));
        let status = battery.refresh().unwrap();
        assert_eq!(status.current, Milliamps(1000));
        assert_eq!(status.state_of_charge, MilliampHours(9000));
    }

    #[test]
    fn cannot_be_bound() {
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        let directory = Arc::new(Directory::default());
        let battery = Arc::new(battery(clock));
        let id = directory.register(battery.clone()).unwrap();
        let splitter = Arc::new(Splitter::new("bare", "pack", &directory));
        assert!(matches!(battery.bind(Binding { policy: splitter, id }), Err(Error::NotVirtual(_))));
    }

    #[test]
    fn reset_estimate_uses_cached_status() {
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        let battery = battery(clock);
        battery.refresh().unwrap();
        battery.set_estimated_soc(MilliampHours(1));
        battery.reset_estimated_soc();
        assert_eq!(battery.get_estimated_soc(), MilliampHours(10_000));
    }
}
