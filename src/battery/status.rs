use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::quantity::{charge::MilliampHours, current::Milliamps, voltage::Millivolts};

/// Snapshot of a battery's electrical state at one instant.
#[must_use]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Builder, Serialize, Deserialize)]
pub struct BatteryStatus {
    #[builder(default)]
    #[serde(default)]
    pub voltage: Millivolts,

    /// Positive when discharging, negative when charging.
    #[builder(default)]
    #[serde(default)]
    pub current: Milliamps,

    pub state_of_charge: MilliampHours,

    pub max_capacity: MilliampHours,

    pub max_charging_current: Milliamps,

    pub max_discharging_current: Milliamps,
}

impl BatteryStatus {
    /// Cut every resource down to what the `limit` has.
    ///
    /// Voltage is inherited from the limit, and the current is reset.
    pub fn clipped_to(self, limit: &Self) -> Self {
        Self {
            voltage: limit.voltage,
            current: Milliamps(0),
            state_of_charge: self.state_of_charge.min(limit.state_of_charge),
            max_capacity: self.max_capacity.min(limit.max_capacity),
            max_charging_current: self.max_charging_current.min(limit.max_charging_current),
            max_discharging_current: self
                .max_discharging_current
                .min(limit.max_discharging_current),
        }
    }

    /// Whether the current fits into the charging and discharging limits.
    ///
    /// `i64::MIN` has no charging counterpart and never fits.
    #[must_use]
    pub fn allows(&self, current: Milliamps) -> bool {
        current <= self.max_discharging_current
            && current
                .0
                .checked_neg()
                .is_some_and(|charging| charging <= self.max_charging_current.0)
    }
}
