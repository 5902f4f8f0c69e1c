use crate::invocation::{ContainerSettings, DEFAULT_IMAGE};
use crate::model::{Engine, Operation, VolumeName};
use crate::ops::Runner;
use crate::runtime::{self, ContainerRuntime};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "kilonova",
    about = "Back up, restore, and clone Docker/Podman volumes with throwaway containers.",
    version,
    arg_required_else_help = true,
    after_help = r#"Examples:
  kilonova backup pgdata ./pgdata.tar.gz
  kilonova restore ./pgdata.tar.gz pgdata-restored
  kilonova --engine podman clone pgdata pgdata-copy
  kilonova --dry-run backup pgdata /srv/backups/

Volumes must already exist; create them with `docker volume create` first.
"#
)]
pub struct Args {
    /// Container engine that runs the throwaway container.
    #[arg(
        short,
        long,
        value_enum,
        default_value_t = Engine::Docker,
        env = "KILONOVA_ENGINE",
        global = true
    )]
    pub engine: Engine,

    /// Image providing `tar` and `cp`.
    #[arg(long, default_value = DEFAULT_IMAGE, env = "KILONOVA_IMAGE", global = true)]
    pub image: String,

    /// Debug logging; stream container output and list archived files.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print the container command instead of running it.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Output JSON for machine consumption.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Archive a volume into a gzip-compressed tarball.
    Backup {
        /// The volume to back up.
        volume: VolumeName,
        /// Where to store the archive. A directory receives `<volume>.tar.gz`.
        archive: PathBuf,
    },
    /// Extract an archive into a volume, overwriting files with the same names.
    Restore {
        /// A `.tar.gz` archive written by `backup`.
        archive: PathBuf,
        /// The volume to place data into.
        volume: VolumeName,
    },
    /// Copy the contents of one volume into another.
    Clone {
        /// The volume containing data to be transferred.
        source: VolumeName,
        /// The volume to transfer data into.
        target: VolumeName,
    },
}

impl Command {
    fn operation(&self) -> Operation {
        match self {
            Self::Backup { .. } => Operation::Backup,
            Self::Restore { .. } => Operation::Restore,
            Self::Clone { .. } => Operation::Clone,
        }
    }
}

pub fn dispatch(args: Args, runtime: Box<dyn ContainerRuntime>) -> anyhow::Result<()> {
    let settings = ContainerSettings {
        program: runtime::engine_bin(args.engine),
        image: args.image,
        verbose: args.verbose,
    };
    let json = args.json && !runtime.dry_run();
    let runner = Runner::new(&*runtime, settings);
    let operation = args.cmd.operation();

    let report = match args.cmd {
        Command::Backup { volume, archive } => runner.backup(&volume, &archive),
        Command::Restore { archive, volume } => runner.restore(&archive, &volume),
        Command::Clone { source, target } => runner.clone_volume(&source, &target),
    }
    .with_context(|| format!("{operation} failed"))?;

    if json {
        print_json(&report)?;
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
