use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use derive_more::Display;
use tracing::{info, warn};

use crate::{
    battery::Battery,
    error::{Error, Result},
};

/// Stable battery handle assigned by the [`Directory`].
///
/// Handles are never reused, so a handle of a removed battery stays dangling-safe: it simply
/// resolves to nothing.
#[derive(Copy, Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BatteryId(usize);

/// Name-keyed registry of every battery in the system.
#[derive(Default)]
pub struct Directory(RwLock<Registry>);

#[derive(Default)]
struct Registry {
    /// Arena of batteries indexed by [`BatteryId`], `None` for the removed ones.
    slots: Vec<Option<Arc<dyn Battery>>>,

    ids: HashMap<String, BatteryId>,
}

impl Directory {
    #[must_use]
    pub fn name_exists(&self, name: &str) -> bool {
        self.read().ids.contains_key(name)
    }

    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<BatteryId> {
        self.read().ids.get(name).copied()
    }

    #[must_use]
    pub fn get(&self, id: BatteryId) -> Option<Arc<dyn Battery>> {
        self.read().slots.get(id.0).cloned().flatten()
    }

    #[must_use]
    pub fn get_battery(&self, name: &str) -> Option<Arc<dyn Battery>> {
        let registry = self.read();
        registry.ids.get(name).and_then(|id| registry.slots[id.0].clone())
    }

    /// Register the battery under its own name.
    pub fn register(&self, battery: Arc<dyn Battery>) -> Result<BatteryId> {
        let mut guard = self.write();
        let registry = &mut *guard;
        let id = BatteryId(registry.slots.len());
        match registry.ids.entry(battery.name().to_owned()) {
            Entry::Occupied(entry) => {
                warn!(name = %entry.key(), "battery already exists");
                Err(Error::NameTaken(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                info!(name = %entry.key(), kind = %battery.kind(), %id, "registered");
                entry.insert(id);
                registry.slots.push(Some(battery));
                Ok(id)
            }
        }
    }

    /// Remove the battery from the directory.
    ///
    /// The caller must have unlinked the battery from every policy beforehand.
    pub fn unregister(&self, name: &str) -> Result<Arc<dyn Battery>> {
        let mut guard = self.write();
        let registry = &mut *guard;
        let id = registry.ids.remove(name).ok_or_else(|| Error::UnknownBattery(name.to_owned()))?;
        let battery = registry.slots[id.0].take().ok_or(Error::UnknownId(id))?;
        info!(name, %id, "unregistered");
        Ok(battery)
    }

    /// Registered batteries in the registration order.
    #[must_use]
    pub fn batteries(&self) -> Vec<(BatteryId, Arc<dyn Battery>)> {
        self.read()
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| Some((BatteryId(index), slot.clone()?)))
            .collect()
    }

    /// Registered names in the registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.batteries().into_iter().map(|(_, battery)| battery.name().to_owned()).collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeDelta};
    use itertools::Itertools;

    use super::*;
    use crate::{battery::VirtualBattery, clock::ManualClock};

    fn virtual_battery(name: &str) -> Arc<VirtualBattery> {
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        Arc::new(VirtualBattery::new(name, clock, TimeDelta::seconds(1)))
    }

    #[test]
    fn register_and_look_up() {
        let directory = Directory::default();
        let id = directory.register(virtual_battery("a")).unwrap();
        assert!(directory.name_exists("a"));
        assert!(!directory.name_exists("b"));
        assert_eq!(directory.id_of("a"), Some(id));
        assert_eq!(directory.get(id).unwrap().name(), "a");
        assert_eq!(directory.get_battery("a").unwrap().name(), "a");
        assert!(directory.get_battery("b").is_none());
    }

    #[test]
    fn names_are_unique() {
        let directory = Directory::default();
        directory.register(virtual_battery("a")).unwrap();
        assert!(matches!(
            directory.register(virtual_battery("a")),
            Err(Error::NameTaken(name)) if name == "a",
        ));
        assert_eq!(directory.batteries().len(), 1);
    }

    #[test]
    fn ids_are_not_reused() {
        let directory = Directory::default();
        let a = directory.register(virtual_battery("a")).unwrap();
        directory.unregister("a").unwrap();
        assert!(directory.get(a).is_none());
        assert!(!directory.name_exists("a"));

        let b = directory.register(virtual_battery("a")).unwrap();
        assert_ne!(a, b);
        assert!(directory.get(a).is_none());
        assert_eq!(directory.get(b).unwrap().name(), "a");
    }

    #[test]
    fn unregister_unknown() {
        let directory = Directory::default();
        assert!(matches!(directory.unregister("a"), Err(Error::UnknownBattery(_))));
    }

    #[test]
    fn batteries_in_registration_order() {
        let directory = Directory::default();
        for name in ["c", "a", "b"] {
            directory.register(virtual_battery(name)).unwrap();
        }
        directory.unregister("a").unwrap();
        assert_eq!(directory.names(), ["c", "b"]);
        let ids = directory.batteries().into_iter().map(|(id, _)| id).collect_vec();
        assert_eq!(ids, [BatteryId(0), BatteryId(2)]);
    }
}
