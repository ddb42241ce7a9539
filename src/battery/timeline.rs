use chrono::{DateTime, Local};
use itertools::Itertools;

use crate::{interval::Interval, quantity::current::Milliamps};

#[derive(Copy, Clone, Debug)]
pub struct Command {
    pub target: Milliamps,

    /// The consumer accepts any current above the target.
    ///
    /// Passed through to the device as is. The timeline itself always enacts the exact target.
    pub is_greater_than: bool,

    pub window: Interval,
}

/// Current set-points of a battery over time.
#[derive(Default)]
pub struct Timeline {
    /// Current held outside of any scheduled window.
    held: Milliamps,

    /// Pending and active commands, oldest first.
    commands: Vec<Command>,
}

impl Timeline {
    pub fn schedule(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Hold the current from now on, replacing the whole schedule.
    pub fn hold(&mut self, current: Milliamps) {
        self.held = current;
        self.commands.clear();
    }

    /// Current enacted at the moment: the newest command wins.
    pub fn current_at(&self, moment: DateTime<Local>) -> Milliamps {
        self.commands
            .iter()
            .rev()
            .find(|command| command.window.contains(moment))
            .map_or(self.held, |command| command.target)
    }

    #[must_use]
    pub fn n_pending(&self) -> usize {
        self.commands.len()
    }

    /// Integrate the charge drained in between the moments and forget the expired commands.
    #[must_use]
    pub fn drain(&mut self, since: DateTime<Local>, until: DateTime<Local>) -> f64 {
        if until <= since {
            return 0.0;
        }
        let drained: f64 = self
            .commands
            .iter()
            .flat_map(|command| [command.window.start, command.window.end])
            .filter(|moment| (since < *moment) && (*moment < until))
            .chain([since, until])
            .sorted()
            .dedup()
            .tuple_windows()
            .map(|(start, end)| self.current_at(start).drained_over(end - start))
            .sum();
        self.commands.retain(|command| !command.window.has_ended_by(until));
        drained
    }
}
