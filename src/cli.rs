mod show;
mod simulate;

use std::path::PathBuf;

use chrono::TimeDelta;
use clap::{Parser, Subcommand};

pub use self::{show::ShowArgs, simulate::SimulateArgs};
use splitter::{prelude::*, topology::Topology};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[clap(flatten)]
    pub topology: TopologyArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the status of every battery and the quotas of every policy.
    #[clap(name = "show")]
    Show(ShowArgs),

    /// Issue the configured commands and simulate the batteries over time.
    #[clap(name = "simulate")]
    Simulate(SimulateArgs),
}

#[derive(Parser)]
pub struct TopologyArgs {
    /// Topology file.
    #[clap(long = "topology", env = "SPLITTER_TOPOLOGY", default_value = "splitter.toml")]
    pub path: PathBuf,

    /// Maximum age of a cached battery status.
    #[clap(long, env = "SPLITTER_STALENESS", default_value = "1s")]
    pub staleness: humantime::Duration,
}

impl TopologyArgs {
    pub fn read(&self) -> Result<Topology> {
        Topology::read_from(&self.path)
    }

    pub fn staleness(&self) -> Result<TimeDelta> {
        Ok(TimeDelta::from_std(self.staleness.into())?)
    }
}
