//! The `prune` command: carve a target workspace, everything it depends on
//! and a matching lockfile out of a monorepo.

#![deny(clippy::all)]

mod cli;
mod commands;
mod tracing;
mod ui;

use ::tracing::error;

pub use crate::{
    cli::Args,
    commands::prune::{ConfigError, Error, PruneRequest, PruneState, Pruner},
};

/// Runs the command line and returns the exit code for the process
pub fn main() -> i32 {
    match cli::run() {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            eprintln!("{}", ui::UI::infer().error_line(&err));
            1
        }
    }
}
