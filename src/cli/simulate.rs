use std::{sync::Arc, thread};

use chrono::{Local, TimeDelta};
use clap::Parser;
use itertools::Itertools;
use splitter::{
    clock::{Clock, ManualClock},
    prelude::*,
    topology::{CommandConfig, System},
};

use crate::{
    cli::TopologyArgs,
    tables::{build_policy_table, build_status_table},
};

#[derive(Parser)]
pub struct SimulateArgs {
    /// Simulated time between the status snapshots.
    #[clap(long, env = "SIMULATION_STEP", default_value = "15min")]
    step: humantime::Duration,

    #[clap(long = "steps", env = "SIMULATION_STEPS", default_value = "8")]
    n_steps: u32,
}

impl SimulateArgs {
    pub fn run(&self, topology_args: &TopologyArgs) -> Result {
        let step = TimeDelta::from_std(self.step.into())?;
        let clock = Arc::new(ManualClock::starting_at(Local::now()));
        let topology = topology_args.read()?;
        let system = {
            let clock: Arc<dyn Clock> = clock.clone();
            topology.build(&clock, topology_args.staleness()?)?
        };

        issue_concurrently(&system, &topology.commands, &clock);
        println!("{}", build_status_table(&system.directory));
        for _ in 0..self.n_steps {
            let now = clock.advance(step);
            info!(%now, "advanced");
            println!("{}", build_status_table(&system.directory));
        }
        for policy in &system.policies {
            println!("{}", build_policy_table(policy, &system.directory));
        }
        Ok(())
    }
}

/// Issue every command from its own consumer thread.
fn issue_concurrently(system: &System, commands: &[CommandConfig], clock: &ManualClock) {
    let now = clock.now();
    thread::scope(|scope| {
        let handles = commands
            .iter()
            .map(|command| {
                let directory = &system.directory;
                scope.spawn(move || command.issue(directory, now))
            })
            .collect_vec();
        for (command, handle) in commands.iter().zip(handles) {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(battery = command.battery, "command is rejected: {error:#}");
                }
                Err(_) => {
                    error!(battery = command.battery, "consumer thread panicked");
                }
            }
        }
    });
}
