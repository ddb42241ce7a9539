use std::{
    collections::HashMap,
    iter,
    ops::Div,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bon::bon;
use chrono::{DateTime, Local, TimeDelta};
use itertools::Itertools;
use tracing::{info, instrument, warn};

use crate::{
    battery::{Battery, BatteryStatus, Command, VirtualBattery},
    clock::Clock,
    directory::{BatteryId, Directory},
    error::{Error, Result},
    interval::Interval,
    policy::{Binding, Policy, Scale, Splitter},
    quantity::{Zero, charge::MilliampHours, current::Milliamps},
};

/// Splits the source battery between the children in proportion to their quotas.
///
/// Every child is a virtual battery. The child's capacity and current limits are the source's
/// ones scaled by the child's [`Scale`], while the state of charge is the source's one shared in
/// proportion to the children's own estimates.
///
/// The policy keeps every child's immediate target and scheduled windows. On each accepted
/// request, the source's schedule is replaced: the sum of the immediate targets is held, and every
/// stretch covered by a window gets its own command with the sum of the targets enacted there.
pub struct ProportionalPolicy {
    splitter: Splitter,
    clock: Arc<dyn Clock>,

    /// Status staleness for the forked children.
    staleness: TimeDelta,

    state: Mutex<State>,
}

struct State {
    /// In the order of creation.
    children: Vec<BatteryId>,

    scales: HashMap<BatteryId, Scale>,
    requests: Requests,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Target {
    current: Milliamps,
    is_greater_than: bool,
}

impl Target {
    /// The sum is a floor as soon as any of the terms is.
    fn sum(targets: impl Iterator<Item = Self>) -> Self {
        targets.fold(Self::default(), |total, target| Self {
            current: total.current + target.current,
            is_greater_than: total.is_greater_than || target.is_greater_than,
        })
    }
}

/// Accepted current requests of the children.
#[derive(Clone, Default)]
struct Requests {
    /// Target of each child outside of its windows.
    held: HashMap<BatteryId, Target>,

    /// Oldest first.
    windows: Vec<(BatteryId, Command)>,
}

impl Requests {
    fn held_of(&self, child: BatteryId) -> Target {
        self.held.get(&child).copied().unwrap_or_default()
    }

    /// Child's target at the moment: its newest window containing the moment wins.
    fn target_at(&self, child: BatteryId, moment: DateTime<Local>) -> Target {
        self.windows
            .iter()
            .rev()
            .find(|(id, command)| *id == child && command.window.contains(moment))
            .map_or_else(
                || self.held_of(child),
                |(_, command)| Target {
                    current: command.target,
                    is_greater_than: command.is_greater_than,
                },
            )
    }

    fn held_total(&self) -> Target {
        Target::sum(self.held.values().copied())
    }

    fn total_at(&self, moment: DateTime<Local>) -> Target {
        Target::sum(self.held.keys().map(|child| self.target_at(*child, moment)))
    }

    /// Replace the child's target and drop its windows.
    fn hold(&mut self, child: BatteryId, target: Target) {
        self.held.insert(child, target);
        self.windows.retain(|(id, _)| *id != child);
    }

    fn schedule(&mut self, child: BatteryId, command: Command) {
        self.windows.push((child, command));
    }

    fn remove(&mut self, child: BatteryId) {
        self.held.remove(&child);
        self.windows.retain(|(id, _)| *id != child);
    }

    fn prune(&mut self, now: DateTime<Local>) {
        self.windows.retain(|(_, command)| !command.window.has_ended_by(now));
    }

    /// First non-zero current the child holds or has scheduled.
    fn pending_current_of(&self, child: BatteryId) -> Option<Milliamps> {
        iter::once(self.held_of(child).current)
            .chain(
                self.windows
                    .iter()
                    .filter(|(id, _)| *id == child)
                    .map(|(_, command)| command.target),
            )
            .find(|current| *current != Milliamps::ZERO)
    }

    /// Source commands for the stretches in between the window bounds, where the total differs
    /// from the held one.
    fn source_commands(&self, now: DateTime<Local>) -> Vec<Command> {
        let held = self.held_total();
        self.windows
            .iter()
            .flat_map(|(_, command)| [command.window.start, command.window.end])
            .map(|moment| moment.max(now))
            .sorted()
            .dedup()
            .tuple_windows()
            .filter_map(|(start, end)| {
                let total = self.total_at(start);
                (total != held).then_some(Command {
                    target: total.current,
                    is_greater_than: total.is_greater_than,
                    window: Interval::new(start, end),
                })
            })
            .collect()
    }

    /// Replace the source's schedule with these requests.
    fn enact(&self, source: &dyn Battery, now: DateTime<Local>) -> Result<Milliamps> {
        let held = self.held_total();
        source.set_current(held.current, held.is_greater_than)?;
        for command in self.source_commands(now) {
            source.schedule_set_current(command.target, command.is_greater_than, command.window)?;
        }
        Ok(held.current)
    }
}

#[bon]
impl ProportionalPolicy {
    /// Create the policy and bind the already registered first child to it with the full quota.
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        #[builder(into)] source_name: String,
        directory: Arc<Directory>,
        #[builder(into)] first_child: String,
        clock: Arc<dyn Clock>,
        staleness: TimeDelta,
    ) -> Result<Arc<Self>> {
        let splitter = Splitter::new(name, source_name, &directory);
        let first_id =
            directory.id_of(&first_child).ok_or_else(|| Error::UnknownBattery(first_child))?;
        let first_battery = directory.get(first_id).ok_or(Error::UnknownId(first_id))?;
        // Read before binding, so that a failure leaves the first child free:
        let source_status =
            splitter.get_source().ok().map(|source| source.get_status()).transpose()?;
        let policy = Arc::new(Self {
            splitter,
            clock,
            staleness,
            state: Mutex::new(State {
                children: vec![first_id],
                scales: HashMap::from([(first_id, Scale::FULL)]),
                requests: Requests {
                    held: HashMap::from([(first_id, Target::default())]),
                    windows: Vec::new(),
                },
            }),
        });
        first_battery.bind(Binding { policy: policy.clone(), id: first_id })?;
        if let Some(source_status) = source_status {
            first_battery.set_estimated_soc(source_status.state_of_charge);
        }
        info!(name = policy.name(), first_child = first_battery.name(), "created");
        Ok(policy)
    }
}

impl ProportionalPolicy {
    #[must_use]
    pub const fn splitter(&self) -> &Splitter {
        &self.splitter
    }

    /// Snapshot of the children's handles, in the order of creation.
    #[must_use]
    pub fn get_children(&self) -> Vec<BatteryId> {
        self.lock().children.clone()
    }

    pub fn scale_of(&self, child: BatteryId) -> Result<Scale> {
        let state = self.lock();
        self.scale_in(&state, child)
    }

    /// Child's target current enacted right now.
    pub fn current_of(&self, child: BatteryId) -> Result<Milliamps> {
        let state = self.lock();
        self.scale_in(&state, child)?;
        Ok(state.requests.target_at(child, self.clock.now()).current)
    }

    /// Carve a new child out of the donor's quota.
    ///
    /// The requested resources are clipped to what the donor has, and the actually allocated
    /// status is returned.
    #[instrument(skip_all, fields(policy = self.name(), from = from, child = child))]
    pub fn fork_from(
        self: &Arc<Self>,
        from: &str,
        child: &str,
        target: BatteryStatus,
    ) -> Result<BatteryStatus> {
        let mut state = self.lock();
        let directory = self.splitter.directory()?;

        let donor = directory.id_of(from).ok_or_else(|| {
            warn!("donor does not exist");
            Error::UnknownBattery(from.to_owned())
        })?;
        if directory.name_exists(child) {
            warn!("name is already taken");
            return Err(Error::NameTaken(child.to_owned()));
        }
        let donor_scale = self.scale_in(&state, donor)?;
        let donor_battery = directory.get(donor).ok_or(Error::UnknownId(donor))?;

        let source = self.splitter.source_status()?;
        let donor_status = self.status_in(&state, &directory, donor, &source)?;
        if donor_status.current != Milliamps::ZERO {
            warn!(current = ?donor_status.current, "donor is not idle");
        }
        let actual = target.clipped_to(&donor_status);
        let scale = Scale::new(
            ratio(actual.state_of_charge, source.state_of_charge),
            ratio(actual.max_capacity, source.max_capacity),
            ratio(actual.max_discharging_current, source.max_discharging_current),
            ratio(actual.max_charging_current, source.max_charging_current),
        )?;
        let remaining = donor_scale.checked_sub(scale)?;

        let battery = Arc::new(VirtualBattery::new(child, self.clock.clone(), self.staleness));
        let id = directory.register(battery.clone())?;
        battery.bind(Binding { policy: self.clone(), id })?;
        state.children.push(id);
        state.scales.insert(id, scale);
        state.requests.hold(id, Target::default());
        state.scales.insert(donor, remaining);

        donor_battery.set_estimated_soc(donor_status.state_of_charge - actual.state_of_charge);
        battery.set_estimated_soc(actual.state_of_charge);
        info!(%id, ?scale, ?remaining, "forked");
        Ok(actual)
    }

    /// Give the idle child's quota back to another child and remove it from the directory.
    ///
    /// The child is busy while it holds or has scheduled a non-zero current.
    #[instrument(skip_all, fields(policy = self.name(), name = name, to = to))]
    pub fn merge_into(&self, name: &str, to: &str) -> Result {
        let mut state = self.lock();
        let directory = self.splitter.directory()?;

        let id = directory.id_of(name).ok_or_else(|| Error::UnknownBattery(name.to_owned()))?;
        let to_id = directory.id_of(to).ok_or_else(|| Error::UnknownBattery(to.to_owned()))?;
        if id == to_id {
            warn!("cannot merge into itself");
            return Err(Error::SelfMerge(id));
        }
        let scale = self.scale_in(&state, id)?;
        let to_scale = self.scale_in(&state, to_id)?;
        state.requests.prune(self.clock.now());
        if let Some(current) = state.requests.pending_current_of(id) {
            warn!(?current, "child is busy");
            return Err(Error::ChildBusy(id, current));
        }
        let merged = to_scale.checked_add(scale)?;
        let battery = directory.get(id).ok_or(Error::UnknownId(id))?;
        let to_battery = directory.get(to_id).ok_or(Error::UnknownId(to_id))?;

        state.children.retain(|child| *child != id);
        state.scales.remove(&id);
        state.requests.remove(id);
        state.scales.insert(to_id, merged);
        to_battery.set_estimated_soc(to_battery.get_estimated_soc() + battery.get_estimated_soc());
        if let Err(error) = directory.unregister(name) {
            warn!("failed to unregister the merged child: {error:#}");
        }
        info!(?merged, "merged");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scale_in(&self, state: &State, child: BatteryId) -> Result<Scale> {
        state.scales.get(&child).copied().ok_or_else(|| {
            warn!(policy = self.name(), %child, "not a child");
            Error::NotAChild { policy: self.name().to_owned(), child }
        })
    }

    /// Child's status computed from the locked state, without calling into the child.
    fn status_in(
        &self,
        state: &State,
        directory: &Directory,
        child: BatteryId,
        source: &BatteryStatus,
    ) -> Result<BatteryStatus> {
        let scale = self.scale_in(state, child)?;
        let mut child_estimate = MilliampHours::ZERO;
        let mut total_estimate = MilliampHours::ZERO;
        for id in &state.children {
            let estimate = directory.get(*id).ok_or(Error::UnknownId(*id))?.get_estimated_soc();
            if *id == child {
                child_estimate = estimate;
            }
            total_estimate += estimate;
        }
        let state_of_charge = if total_estimate == MilliampHours::ZERO {
            let n_children = i64::try_from(state.children.len()).unwrap_or(i64::MAX);
            MilliampHours(source.state_of_charge.0 / n_children)
        } else {
            source.state_of_charge * (child_estimate / total_estimate)
        };
        Ok(BatteryStatus {
            voltage: source.voltage,
            current: state.requests.target_at(child, self.clock.now()).current,
            state_of_charge,
            max_capacity: source.max_capacity * scale.max_capacity(),
            max_charging_current: source.max_charging_current * scale.max_charge_rate(),
            max_discharging_current: source.max_discharging_current * scale.max_discharge_rate(),
        })
    }

    /// Check the child's target against its share of the source limits.
    fn check_quota(&self, state: &State, child: BatteryId, target: Milliamps) -> Result {
        let scale = self.scale_in(state, child)?;
        let source = self.splitter.source_status()?;
        let limits = BatteryStatus {
            max_charging_current: source.max_charging_current * scale.max_charge_rate(),
            max_discharging_current: source.max_discharging_current * scale.max_discharge_rate(),
            ..source
        };
        if limits.allows(target) {
            Ok(())
        } else {
            warn!(policy = self.name(), %child, ?target, "target current is beyond the quota");
            Err(Error::CurrentLimitExceeded {
                target,
                max_charging: limits.max_charging_current,
                max_discharging: limits.max_discharging_current,
            })
        }
    }

    /// Enact the new requests at the source and adopt them.
    ///
    /// On failure, the previous requests are enacted again and kept.
    fn forward(
        &self,
        state: &mut State,
        requests: Requests,
        now: DateTime<Local>,
    ) -> Result<Milliamps> {
        let source = self.splitter.get_source()?;
        match requests.enact(&*source, now) {
            Ok(aggregate) => {
                state.requests = requests;
                Ok(aggregate)
            }
            Err(error) => {
                if let Err(restore_error) = state.requests.enact(&*source, now) {
                    warn!(
                        policy = self.name(),
                        "failed to restore the source schedule: {restore_error:#}",
                    );
                }
                Err(error)
            }
        }
    }
}

impl Policy for ProportionalPolicy {
    fn name(&self) -> &str {
        self.splitter.name()
    }

    fn get_status_of(&self, child: BatteryId) -> Result<BatteryStatus> {
        let state = self.lock();
        let source = self.splitter.source_status()?;
        self.status_in(&state, &*self.splitter.directory()?, child, &source)
    }

    #[instrument(skip_all, fields(policy = self.name(), %child, ?target))]
    fn set_current_of(&self, child: BatteryId, target: Milliamps, is_greater_than: bool) -> Result {
        let mut state = self.lock();
        self.check_quota(&state, child, target)?;
        let now = self.clock.now();
        let mut requests = state.requests.clone();
        requests.prune(now);
        requests.hold(child, Target { current: target, is_greater_than });
        let aggregate = self.forward(&mut state, requests, now)?;
        info!(?aggregate, "forwarded");
        Ok(())
    }

    #[instrument(skip_all, fields(policy = self.name(), %child, ?target, ?window))]
    fn schedule_set_current_of(
        &self,
        child: BatteryId,
        target: Milliamps,
        is_greater_than: bool,
        window: Interval,
    ) -> Result {
        if window.is_empty() {
            warn!("empty scheduling window");
            return Err(Error::EmptyWindow);
        }
        let mut state = self.lock();
        self.check_quota(&state, child, target)?;
        let now = self.clock.now();
        let mut requests = state.requests.clone();
        requests.prune(now);
        requests.schedule(child, Command { target, is_greater_than, window });
        let aggregate = self.forward(&mut state, requests, now)?;
        info!(?aggregate, "scheduled");
        Ok(())
    }
}

/// Fraction of the whole, zero for an empty whole.
fn ratio<T: Copy + Zero + PartialEq + Div<Output = f64>>(part: T, whole: T) -> f64 {
    if whole == T::ZERO { 0.0 } else { part / whole }
}
