use std::sync::Arc;

use clap::Parser;
use splitter::{
    clock::{Clock, SystemClock},
    prelude::*,
};

use crate::{
    cli::TopologyArgs,
    tables::{build_policy_table, build_status_table},
};

#[derive(Parser)]
pub struct ShowArgs {
    /// Skip the policy quota tables.
    #[clap(long)]
    brief: bool,
}

impl ShowArgs {
    pub fn run(&self, topology_args: &TopologyArgs) -> Result {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let system = topology_args.read()?.build(&clock, topology_args.staleness()?)?;
        println!("{}", build_status_table(&system.directory));
        if !self.brief {
            for policy in &system.policies {
                println!("{}", build_policy_table(policy, &system.directory));
            }
        }
        Ok(())
    }
}
