use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, TimeDelta};

use crate::{battery::BatteryStatus, error::Result};

/// Last known status of a battery along with the time it was taken.
pub struct StatusCache {
    staleness: TimeDelta,
    last: Mutex<Option<(DateTime<Local>, BatteryStatus)>>,
}

impl StatusCache {
    pub const fn new(staleness: TimeDelta) -> Self {
        Self { staleness, last: Mutex::new(None) }
    }

    /// Return the cached status unless it is stale, otherwise refresh it.
    ///
    /// The cache lock is not held while refreshing: the refresh may lock a policy.
    pub fn get_or_refresh(
        &self,
        now: DateTime<Local>,
        refresh: impl FnOnce() -> Result<BatteryStatus>,
    ) -> Result<BatteryStatus> {
        if let Some((taken_at, status)) = *self.lock()
            && (now - taken_at < self.staleness)
        {
            return Ok(status);
        }
        let status = refresh()?;
        self.store(now, status);
        Ok(status)
    }

    pub fn store(&self, now: DateTime<Local>, status: BatteryStatus) {
        *self.lock() = Some((now, status));
    }

    pub fn last(&self) -> Option<BatteryStatus> {
        self.lock().map(|(_, status)| status)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<(DateTime<Local>, BatteryStatus)>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
