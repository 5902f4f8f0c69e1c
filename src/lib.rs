mod cli;
mod error;
mod invocation;
mod logging;
mod model;
mod ops;
mod progress;
mod runtime;

pub use error::VolumeError;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

pub fn run() -> anyhow::Result<()> {
    let args = match cli::Args::try_parse() {
        Ok(args) => args,
        Err(err) if err.kind() == ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            cli::Args::command().print_help().context("print usage")?;
            return Ok(());
        }
        Err(err) => err.exit(),
    };

    logging::init(args.verbose, args.quiet);
    let runtime = runtime::make_runtime(args.dry_run, args.json, args.verbose);

    cli::dispatch(args, runtime)
}

/// Exit code for a failed [`run`].
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<VolumeError>())
        .map_or(1, VolumeError::exit_code)
}
