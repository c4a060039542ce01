use std::{env::current_dir, path::PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use dunce::canonicalize as fs_canonicalize;
use prunepath::AbsoluteSystemPathBuf;
use tracing::{debug, error};

use crate::{
    commands::{
        prune::{self, PruneRequest},
        CommandBase,
    },
    ui::UI,
};

#[derive(Parser, Clone, Default, Debug, PartialEq)]
#[clap(author, about = "Prepare a minimal subset of a monorepo", long_about = None)]
#[clap(disable_help_subcommand = true)]
#[clap(arg_required_else_help = true)]
pub struct Args {
    /// Force color usage in the terminal
    #[clap(long, global = true, conflicts_with = "no_color")]
    pub color: bool,
    /// The directory in which to run prune
    #[clap(long, global = true, value_parser)]
    pub cwd: Option<PathBuf>,
    /// Suppress color usage in the terminal
    #[clap(long, global = true)]
    pub no_color: bool,
    /// verbosity
    #[clap(flatten)]
    pub verbosity: Verbosity,
    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Parser, Clone, Copy, PartialEq, Eq, Default)]
pub struct Verbosity {
    #[clap(
        long = "verbosity",
        global = true,
        conflicts_with = "v",
        value_name = "COUNT"
    )]
    /// Verbosity level
    pub verbosity: Option<u8>,
    #[clap(
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        hide = true,
        conflicts_with = "verbosity"
    )]
    pub v: u8,
}

impl From<Verbosity> for u8 {
    fn from(val: Verbosity) -> Self {
        let Verbosity { verbosity, v } = val;
        verbosity.unwrap_or(v)
    }
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Command {
    /// Prepare a subset of your monorepo.
    Prune {
        /// Workspaces to keep along with everything they depend on
        #[clap(long, env = "PRUNE_SCOPE")]
        scope: Vec<String>,
        /// Split the output into json/ and full/ directories for docker
        /// layer caching
        #[clap(long, env = "PRUNE_DOCKER")]
        docker: bool,
        #[clap(
            long = "out-dir",
            env = "PRUNE_OUT_DIR",
            default_value_t = String::from("out"),
            value_parser
        )]
        output_dir: String,
    },
}

impl Args {
    pub fn ui(&self) -> UI {
        if self.no_color {
            UI::new(true)
        } else if self.color {
            UI::new(false)
        } else {
            UI::infer()
        }
    }

    fn repo_root(&self) -> Result<AbsoluteSystemPathBuf> {
        let repo_root = match &self.cwd {
            Some(cwd) => fs_canonicalize(cwd)?,
            None => current_dir()?,
        };
        Ok(AbsoluteSystemPathBuf::new(repo_root)?)
    }
}

/// Parses the command line and runs the requested command
///
/// returns: the exit code of the process
pub fn run() -> Result<i32> {
    let args = Args::parse();
    let ui = args.ui();
    crate::tracing::init(args.verbosity.into(), &ui)?;

    let repo_root = args.repo_root()?;
    debug!("repository root: {}", repo_root);

    let Some(command) = args.command else {
        return Err(anyhow!("No command specified"));
    };

    match command {
        Command::Prune {
            scope,
            docker,
            output_dir,
        } => {
            let base = CommandBase::new(repo_root, ui);
            let request = PruneRequest {
                scope,
                docker,
                output_dir,
            };
            match prune::prune(&base, request) {
                Ok(_) => Ok(0),
                Err(err) => {
                    error!("{}", err);
                    eprintln!("{}", base.ui.error_line(&err));
                    Ok(1)
                }
            }
        }
    }
}
