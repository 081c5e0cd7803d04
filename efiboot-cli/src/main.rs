// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! A command line frontend for `efiboot-core`.
//!
//! Reads a declarative TOML config, compares it against the live boot entry
//! store, and applies whatever the comparison says is missing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use efiboot_core::backend;
use efiboot_core::config::Config;
use log::LevelFilter;

mod bootnext;
mod logger;
mod push;
mod status;
mod timeout;

/// The command line arguments.
#[derive(Parser)]
#[command(name = "efiboot", version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/boot/efiboot.toml", global = true)]
    config: PathBuf,

    /// Override a config value, e.g. -x timeout=5; may be repeated
    #[arg(short = 'x', long = "override", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Log informational messages
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Log debug messages (implies --verbose)
    #[arg(short, long, default_value_t = false, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// The subcommands of `efiboot`.
#[derive(Subcommand)]
enum Commands {
    /// Reconcile the boot entry store with the config
    Push {
        /// Also arm the first configured entry as the one-shot next boot
        #[arg(long, default_value_t = false)]
        bootnext: bool,
    },

    /// Print the boot entry store
    Status,

    /// Get, set or clear the one-shot next-boot override
    Bootnext {
        /// A label, a Boot#### id, or "clear"; omit to print the current one
        entry: Option<String>,
    },

    /// Get, set or clear the boot menu timeout
    Timeout {
        /// Seconds, or "clear"; omit to print the current one
        seconds: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.debug {
        LevelFilter::Debug
    } else if args.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    logger::init(level);

    let mut config = Config::from_path(&args.config)?;
    config.apply_overrides(&args.overrides)?;
    config.validate()?;
    let mut backend = backend::select(&config)?;

    match args.command {
        Commands::Push { bootnext } => push::push(&config, backend.as_mut(), bootnext)?,
        Commands::Status => status::status(backend.as_mut())?,
        Commands::Bootnext { entry } => {
            bootnext::bootnext(backend.as_mut(), entry.as_deref())?;
        }
        Commands::Timeout { seconds } => {
            timeout::timeout(backend.as_mut(), seconds.as_deref())?;
        }
    }
    Ok(())
}
