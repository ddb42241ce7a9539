//! Battery topology: physical batteries, the policies splitting them, and the initial forks.
//!
//! The topology is described in TOML:
//!
//! ```toml
//! [[battery]]
//! name = "pack"
//! voltage = 48000
//! state_of_charge = 10000
//! max_capacity = 20000
//! max_charging_current = 5000
//! max_discharging_current = 8000
//!
//! [[policy]]
//! name = "split"
//! source = "pack"
//! first_child = "household"
//!
//! [[fork]]
//! policy = "split"
//! from = "household"
//! name = "car"
//! state_of_charge = 2000
//! max_capacity = 5000
//! max_charging_current = 1000
//! max_discharging_current = 2000
//!
//! [[command]]
//! battery = "car"
//! current = -1000
//! after_minutes = 30
//! for_minutes = 60
//! ```

use std::{fs, path::Path, sync::Arc};

use chrono::{DateTime, Local, TimeDelta};
use serde::Deserialize;

use crate::{
    battery::{BatteryStatus, SimulatedBattery, VirtualBattery},
    clock::Clock,
    directory::Directory,
    interval::Interval,
    policy::ProportionalPolicy,
    prelude::*,
    quantity::current::Milliamps,
};

#[must_use]
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    #[serde(default, rename = "battery")]
    pub batteries: Vec<BatteryConfig>,

    #[serde(default, rename = "policy")]
    pub policies: Vec<PolicyConfig>,

    #[serde(default, rename = "fork")]
    pub forks: Vec<ForkConfig>,

    #[serde(default, rename = "command")]
    pub commands: Vec<CommandConfig>,
}

/// Simulated physical battery.
#[derive(Deserialize)]
pub struct BatteryConfig {
    pub name: String,

    #[serde(flatten)]
    pub status: BatteryStatus,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub name: String,
    pub source: String,

    /// Virtual battery that initially receives the entire source.
    pub first_child: String,
}

#[derive(Deserialize)]
pub struct ForkConfig {
    pub policy: String,
    pub from: String,
    pub name: String,

    /// Requested resources, clipped to what the donor has.
    #[serde(flatten)]
    pub target: BatteryStatus,
}

/// Consumer request issued to a battery.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    pub battery: String,
    pub current: Milliamps,

    #[serde(default)]
    pub is_greater_than: bool,

    /// Window start relative to the moment of issuing.
    #[serde(default)]
    pub after_minutes: i64,

    /// Without a window length, the current is enacted right away.
    pub for_minutes: Option<i64>,
}

impl CommandConfig {
    fn window(&self, now: DateTime<Local>) -> Option<Interval> {
        let start = now + TimeDelta::minutes(self.after_minutes);
        self.for_minutes.map(|minutes| Interval::new(start, start + TimeDelta::minutes(minutes)))
    }

    /// Issue the command to the battery in the directory.
    #[instrument(skip_all, fields(battery = self.battery, current = ?self.current))]
    pub fn issue(&self, directory: &Directory, now: DateTime<Local>) -> Result {
        let battery = directory
            .get_battery(&self.battery)
            .with_context(|| format!("battery `{}` does not exist", self.battery))?;
        match self.window(now) {
            Some(window) => {
                battery.schedule_set_current(self.current, self.is_greater_than, window)?;
            }
            None => {
                ensure!(self.after_minutes == 0, "immediate command cannot be delayed");
                battery.set_current(self.current, self.is_greater_than)?;
            }
        }
        info!("issued");
        Ok(())
    }
}

/// Batteries and policies built from a [`Topology`].
pub struct System {
    pub directory: Arc<Directory>,
    pub policies: Vec<Arc<ProportionalPolicy>>,
}

impl Topology {
    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse `{}`", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Register everything in a new directory.
    ///
    /// Policies are built in their order in the file, each one followed by its forks. Thus, a
    /// policy may split a child of a preceding one.
    pub fn build(&self, clock: &Arc<dyn Clock>, staleness: TimeDelta) -> Result<System> {
        for fork in &self.forks {
            ensure!(
                self.policies.iter().any(|policy| policy.name == fork.policy),
                "policy `{}` does not exist",
                fork.policy,
            );
        }
        let directory = Arc::new(Directory::default());

        for config in &self.batteries {
            let battery = SimulatedBattery::builder()
                .name(config.name.clone())
                .clock(clock.clone())
                .staleness(staleness)
                .initial(config.status)
                .build();
            directory.register(Arc::new(battery))?;
        }

        let mut policies = Vec::with_capacity(self.policies.len());
        for config in &self.policies {
            let first_child = VirtualBattery::new(&config.first_child, clock.clone(), staleness);
            directory.register(Arc::new(first_child))?;
            let policy = ProportionalPolicy::builder()
                .name(&config.name)
                .source_name(&config.source)
                .directory(directory.clone())
                .first_child(&config.first_child)
                .clock(clock.clone())
                .staleness(staleness)
                .build()
                .with_context(|| format!("failed to build policy `{}`", config.name))?;
            for fork in self.forks.iter().filter(|fork| fork.policy == config.name) {
                let actual = policy
                    .fork_from(&fork.from, &fork.name, fork.target)
                    .with_context(|| format!("failed to fork `{}`", fork.name))?;
                info!(name = fork.name, state_of_charge = ?actual.state_of_charge, "forked");
            }
            policies.push(policy);
        }

        Ok(System { directory, policies })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        quantity::{charge::MilliampHours, voltage::Millivolts},
    };

    const TOPOLOGY: &str = r#"
        [[battery]]
        name = "pack"
        voltage = 48000
        state_of_charge = 10000
        max_capacity = 20000
        max_charging_current = 5000
        max_discharging_current = 8000

        [[policy]]
        name = "split"
        source = "pack"
        first_child = "household"

        [[policy]]
        name = "garage"
        source = "household"
        first_child = "tools"

        [[fork]]
        policy = "split"
        from = "household"
        name = "car"
        state_of_charge = 2000
        max_capacity = 5000
        max_charging_current = 1000
        max_discharging_current = 2000

        [[command]]
        battery = "car"
        current = -1000
        after_minutes = 30
        for_minutes = 60

        [[command]]
        battery = "tools"
        current = 200
    "#;

    fn build() -> (Topology, Arc<ManualClock>, System) {
        let topology = Topology::parse(TOPOLOGY).unwrap();
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let system = topology.build(&dyn_clock, TimeDelta::zero()).unwrap();
        (topology, clock, system)
    }

    #[test]
    fn builds_the_system() {
        let (_, _, system) = build();
        let names = system.directory.names();
        assert_eq!(names, ["pack", "household", "car", "tools"]);
        assert_eq!(system.policies.len(), 2);

        let car = system.directory.get_battery("car").unwrap().refresh().unwrap();
        assert_eq!(car.voltage, Millivolts(48_000));
        assert_eq!(car.state_of_charge, MilliampHours(2000));
        assert_eq!(car.max_capacity, MilliampHours(5000));
        assert_eq!(car.max_discharging_current, Milliamps(2000));
    }

    #[test]
    fn issues_the_commands() {
        let (topology, clock, system) = build();
        for command in &topology.commands {
            command.issue(&system.directory, clock.now()).unwrap();
        }
        let pack = system.directory.get_battery("pack").unwrap();
        let household = system.directory.get_battery("household").unwrap();
        let car = system.directory.get_battery("car").unwrap();
        assert_eq!(pack.refresh().unwrap().current, Milliamps(200));
        assert_eq!(household.refresh().unwrap().current, Milliamps(200));
        assert_eq!(car.refresh().unwrap().current, Milliamps(0));

        // Within the car's window, `-1000 + 200`:
        clock.advance(TimeDelta::minutes(45));
        assert_eq!(pack.refresh().unwrap().current, Milliamps(-800));
        assert_eq!(car.refresh().unwrap().current, Milliamps(-1000));

        clock.advance(TimeDelta::hours(1));
        assert_eq!(pack.refresh().unwrap().current, Milliamps(200));
        assert_eq!(car.refresh().unwrap().current, Milliamps(0));
    }

    #[test]
    fn command_order_does_not_matter() {
        let (topology, clock, system) = build();
        for command in topology.commands.iter().rev() {
            command.issue(&system.directory, clock.now()).unwrap();
        }
        let pack = system.directory.get_battery("pack").unwrap();
        assert_eq!(pack.refresh().unwrap().current, Milliamps(200));
        clock.advance(TimeDelta::minutes(45));
        assert_eq!(pack.refresh().unwrap().current, Milliamps(-800));
    }

    #[test]
    fn delayed_immediate_command() {
        let (_, clock, system) = build();
        let command = CommandConfig {
            battery: "car".to_owned(),
            current: Milliamps(1),
            is_greater_than: false,
            after_minutes: 5,
            for_minutes: None,
        };
        assert!(command.issue(&system.directory, clock.now()).is_err());
    }

    #[test]
    fn unknown_command_target() {
        let (_, clock, system) = build();
        let command = CommandConfig {
            battery: "nope".to_owned(),
            current: Milliamps(1),
            is_greater_than: false,
            after_minutes: 0,
            for_minutes: None,
        };
        assert!(command.issue(&system.directory, clock.now()).is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let contents = r#"
            [[policy]]
            name = "split"
            source = "pack"
            first_child = "a"
            second_child = "b"
        "#;
        assert!(Topology::parse(contents).is_err());
    }

    #[test]
    fn fork_of_unknown_policy() {
        let mut topology = Topology::parse(TOPOLOGY).unwrap();
        topology.forks[0].policy = "nope".to_owned();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_at(Local::now()));
        assert!(topology.build(&clock, TimeDelta::zero()).is_err());
    }

    #[test]
    fn sample_topology_builds() {
        let topology = Topology::parse(include_str!("../splitter.toml")).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_at(Local::now()));
        topology.build(&clock, TimeDelta::seconds(1)).unwrap();
    }
}
