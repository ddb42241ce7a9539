#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod cli;
mod tables;

use clap::{Parser, crate_version};
use splitter::prelude::*;

use crate::cli::{Args, Command};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();
    match args.command {
        Command::Show(show_args) => show_args.run(&args.topology)?,
        Command::Simulate(simulate_args) => simulate_args.run(&args.topology)?,
    }

    info!("done!");
    Ok(())
}
