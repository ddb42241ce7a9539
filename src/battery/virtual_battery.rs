use std::sync::{Arc, OnceLock};

use chrono::TimeDelta;
use tracing::{debug, instrument};

use crate::{
    battery::{Battery, BatteryKind, BatteryStatus, Command, SocEstimator, StatusCache},
    clock::Clock,
    error::{Error, Result},
    interval::Interval,
    policy::Binding,
    quantity::{charge::MilliampHours, current::Milliamps},
};

/// Battery without an electrical reality of its own: every read and write goes to its policy.
///
/// It is registered in the directory first and bound to a policy afterwards, exactly once.
pub struct VirtualBattery {
    name: String,
    clock: Arc<dyn Clock>,
    cache: StatusCache,
    estimator: SocEstimator,
    binding: OnceLock<Binding>,
}

impl VirtualBattery {
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>, staleness: TimeDelta) -> Self {
        let estimator = SocEstimator::new(clock.now());
        Self {
            name: name.into(),
            clock,
            cache: StatusCache::new(staleness),
            estimator,
            binding: OnceLock::new(),
        }
    }

    fn binding(&self) -> Result<&Binding> {
        self.binding.get().ok_or_else(|| Error::Unbound(self.name.clone()))
    }
}

impl Battery for VirtualBattery {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BatteryKind {
        BatteryKind::Virtual
    }

    fn refresh(&self) -> Result<BatteryStatus> {
        let binding = self.binding()?;
        let status = binding.policy.get_status_of(binding.id)?;
        self.cache.store(self.clock.now(), status);
        Ok(status)
    }

    fn get_status(&self) -> Result<BatteryStatus> {
        self.cache.get_or_refresh(self.clock.now(), || self.refresh())
    }

    #[instrument(skip_all, fields(name = %self.name, ?target))]
    fn set_current(&self, target: Milliamps, is_greater_than: bool) -> Result {
        let binding = self.binding()?;
        binding.policy.set_current_of(binding.id, target, is_greater_than)?;
        self.estimator.hold(self.clock.now(), target);
        debug!("accepted");
        Ok(())
    }

    #[instrument(skip_all, fields(name = %self.name, ?target, ?window))]
    fn schedule_set_current(
        &self,
        target: Milliamps,
        is_greater_than: bool,
        window: Interval,
    ) -> Result {
        let binding = self.binding()?;
        binding.policy.schedule_set_current_of(binding.id, target, is_greater_than, window)?;
        self.estimator.schedule(self.clock.now(), Command { target, is_greater_than, window });
        debug!("scheduled");
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

    fn bind(&self, binding: Binding) -> Result {
        let id = binding.id;
        self.binding.set(binding).map_err(|_| Error::AlreadyBound(self.name.clone()))?;
        debug!(name = %self.name, %id, "bound");
        Ok(())
    }
}
