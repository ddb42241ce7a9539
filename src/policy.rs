mod proportional;
mod scale;

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{info, warn};

pub use self::{proportional::ProportionalPolicy, scale::Scale};
use crate::{
    battery::{Battery, BatteryStatus},
    directory::{BatteryId, Directory},
    error::{Error, Result},
    interval::Interval,
    quantity::current::Milliamps,
};

/// Allocation logic serving the reads and writes of virtual batteries.
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    fn get_status_of(&self, child: BatteryId) -> Result<BatteryStatus>;

    fn set_current_of(&self, child: BatteryId, target: Milliamps, is_greater_than: bool)
    -> Result;

    fn schedule_set_current_of(
        &self,
        child: BatteryId,
        target: Milliamps,
        is_greater_than: bool,
        window: Interval,
    ) -> Result;
}

/// Attachment of a virtual battery to its policy.
#[derive(Clone)]
pub struct Binding {
    pub policy: Arc<dyn Policy>,

    /// The virtual battery's own handle in the directory.
    pub id: BatteryId,
}

/// Bare splitter: binds a source battery but has no allocation logic of its own.
///
/// Concrete policies build upon it.
pub struct Splitter {
    name: String,
    source_name: String,
    directory: Weak<Directory>,

    /// `None` when the source name did not resolve at construction.
    source: Option<BatteryId>,

    /// Last status of the source seen through this splitter.
    last_status: Mutex<BatteryStatus>,
}

impl Splitter {
    pub fn new(
        name: impl Into<String>,
        source_name: impl Into<String>,
        directory: &Arc<Directory>,
    ) -> Self {
        let name = name.into();
        let source_name = source_name.into();
        let source = directory.id_of(&source_name);
        if source.is_none() {
            warn!(name, source_name, "source not found");
        } else {
            info!(name, source_name, "bound the source");
        }
        Self {
            name,
            source_name,
            directory: Arc::downgrade(directory),
            source,
            last_status: Mutex::new(BatteryStatus::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn directory(&self) -> Result<Arc<Directory>> {
        self.directory.upgrade().ok_or(Error::DirectoryGone)
    }

    /// Resolve the source battery.
    pub fn get_source(&self) -> Result<Arc<dyn Battery>> {
        let unresolved = || Error::UnresolvedSource(self.source_name.clone());
        let id = self.source.ok_or_else(unresolved)?;
        self.directory()?.get(id).ok_or_else(unresolved)
    }

    /// Read the source status and remember it.
    pub fn source_status(&self) -> Result<BatteryStatus> {
        let status = self.get_source()?.get_status()?;
        *self.last_status.lock().unwrap_or_else(PoisonError::into_inner) = status;
        Ok(status)
    }

    /// A splitter has no telemetry of its own: return the last seen status.
    pub fn refresh(&self) -> BatteryStatus {
        *self.last_status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// No-op: a bare splitter does not know how to allocate current.
    pub const fn set_current(&self, _target: Milliamps, _is_greater_than: bool) -> Result {
        Ok(())
    }
}

impl Policy for Splitter {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_status_of(&self, _child: BatteryId) -> Result<BatteryStatus> {
        Ok(self.refresh())
    }

    fn set_current_of(
        &self,
        _child: BatteryId,
        target: Milliamps,
        is_greater_than: bool,
    ) -> Result {
        self.set_current(target, is_greater_than)
    }

    fn schedule_set_current_of(
        &self,
        _child: BatteryId,
        target: Milliamps,
        is_greater_than: bool,
        _window: Interval,
    ) -> Result {
        self.set_current(target, is_greater_than)
    }
}
