use chrono::TimeDelta;

use crate::quantity::current::Milliamps;

quantity!(
    /// Electric charge, used both for the state of charge and the capacity.
    MilliampHours, suffix: "mAh"
);

impl Milliamps {
    /// Charge that flows out of the battery when the current is held for the duration.
    ///
    /// Fractional milliamp-hours are kept, since a short tick rarely moves a whole unit.
    #[must_use]
    pub fn drained_over(self, duration: TimeDelta) -> f64 {
        self.to_f64() * duration.as_seconds_f64() / 3600.0
    }
}
