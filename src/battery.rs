mod cache;
mod estimator;
mod simulator;
mod status;
mod timeline;
mod virtual_battery;

use std::fmt::{Display, Formatter};

pub use self::{
    cache::StatusCache,
    estimator::SocEstimator,
    simulator::SimulatedBattery,
    status::BatteryStatus,
    timeline::{Command, Timeline},
    virtual_battery::VirtualBattery,
};
use crate::{
    error::{Error, Result},
    interval::Interval,
    policy::Binding,
    quantity::{charge::MilliampHours, current::Milliamps},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BatteryKind {
    /// Backed by a device (or its simulation).
    Physical,

    /// Backed by a splitter policy.
    Virtual,
}

impl Display for BatteryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Physical => write!(f, "Physical"),
            Self::Virtual => write!(f, "Virtual"),
        }
    }
}

/// Battery capability shared by physical and virtual batteries.
///
/// Implementations synchronize internally, so that a battery may be shared between consumer
/// threads behind an [`std::sync::Arc`].
pub trait Battery: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> BatteryKind;

    /// Force a status update.
    fn refresh(&self) -> Result<BatteryStatus>;

    /// Cached status, refreshed when stale.
    fn get_status(&self) -> Result<BatteryStatus>;

    /// Enact the target current right away.
    fn set_current(&self, target: Milliamps, is_greater_than: bool) -> Result;

    /// Enact the target current within the window.
    ///
    /// A newer command takes precedence over older ones wherever their windows overlap.
    fn schedule_set_current(
        &self,
        target: Milliamps,
        is_greater_than: bool,
        window: Interval,
    ) -> Result;

    /// Running coulomb-counting estimate of the state of charge.
    fn get_estimated_soc(&self) -> MilliampHours;

    /// Rebase the estimate on the given state of charge.
    fn set_estimated_soc(&self, state_of_charge: MilliampHours);

    /// Rebase the estimate on the last known status, without forcing a refresh.
    fn reset_estimated_soc(&self);

    /// Attach the battery to the policy that will serve its reads and writes.
    fn bind(&self, _binding: Binding) -> Result {
        Err(Error::NotVirtual(self.name().to_owned()))
    }
}
