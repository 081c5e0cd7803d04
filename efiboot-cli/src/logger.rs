// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! Simple stderr backend for the [`log`] crate.

use log::{LevelFilter, Metadata, Record};

/// A logging backend that writes `LEVEL: message` lines to standard error,
/// leaving standard output to the subcommands.
#[derive(Default)]
pub struct StderrLogger;

/// The global logging instance.
static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true // filtering happens through the max level
    }

    fn log(&self, record: &Record) {
        eprintln!("{}: {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Installs the logger with the given maximum level.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(level));
}
