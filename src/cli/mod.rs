// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod extract;
mod merge_parking;

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TapeDefinition;

#[derive(Parser)]
#[command(
    name = "onstream-recovery",
    version,
    about = "Recover CA ARCserve backups from raw OnStream ADR tape dumps"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Rebuild the backed-up archive from a tape's dump files.
    Extract {
        /// Log packet-level detail.
        #[arg(long)]
        debug: bool,
        /// Skip the slow size cross-checks; for quick inspection runs.
        #[arg(long)]
        fastdebug: bool,
        /// Tape definition (TOML) naming the cartridge and dump files.
        tape_definition: PathBuf,
    },
    /// Collect every parking-zone record from the dumps into a combined
    /// `tape_parking.dump`.
    MergeParking {
        #[arg(long)]
        debug: bool,
        tape_definition: PathBuf,
    },
}

/// Dispatch a parsed command line. Any error out of here exits with code 1.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Extract {
            debug,
            fastdebug,
            tape_definition,
        } => {
            let definition = TapeDefinition::load(&tape_definition)
                .context("tape definition is unusable")?;
            let output_dir = output_dir(&tape_definition);
            let _guard = setup_logging(&output_dir.join(definition.log_file_name()), debug)?;
            extract::run(&definition, &output_dir, fastdebug)
        }
        Command::MergeParking {
            debug,
            tape_definition,
        } => {
            let definition = TapeDefinition::load(&tape_definition)
                .context("tape definition is unusable")?;
            let output_dir = output_dir(&tape_definition);
            let _guard = setup_logging(&output_dir.join(definition.log_file_name()), debug)?;
            merge_parking::run(&definition, &output_dir)
        }
    }
}

/// Outputs land next to the tape definition, with the dumps.
fn output_dir(tape_definition: &Path) -> PathBuf {
    tape_definition
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_owned()
}

/// Console logging plus a per-run extraction log file. The returned guard
/// must stay alive for the run, or buffered file output is lost.
fn setup_logging(log_path: &Path, debug: bool) -> anyhow::Result<WorkerGuard> {
    let log_file = File::create(log_path)
        .with_context(|| format!("cannot create log file {}", log_path.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(log_file);
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let initialised = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init();
    if initialised.is_err() {
        // A subscriber from an earlier run in this process stays in
        // charge; the run still proceeds.
        eprintln!("logging already initialised; reusing the existing subscriber");
    }
    Ok(guard)
}
