// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! The `push` subcommand: reconcile the store with the config.

use efiboot_core::backend::Backend;
use efiboot_core::config::Config;
use efiboot_core::error::EfiError;
use efiboot_core::plan::ReconcileOptions;

/// Reads a snapshot, plans the difference against the config, and applies it.
///
/// With `bootnext`, the first configured entry is additionally armed as the
/// one-shot override for the next boot.
///
/// # Errors
///
/// May return an `Error` if the config has no entries, the snapshot cannot
/// be read, or any operation fails. A partial failure prints which
/// operations committed before propagating.
pub fn push(config: &Config, backend: &mut dyn Backend, bootnext: bool) -> anyhow::Result<()> {
    let options = ReconcileOptions {
        timeout: config.timeout,
        next_boot: bootnext
            .then(|| config.entries.first().map(|entry| entry.label.clone()))
            .flatten(),
    };

    match efiboot_core::sync(config, backend, &options) {
        Ok(applied) if applied.operations == 0 => {
            println!("Everything up to date");
            Ok(())
        }
        Ok(applied) => {
            println!("Applied {} operations", applied.operations);
            Ok(())
        }
        Err(EfiError::Execution(halt)) => {
            for op in &halt.completed {
                eprintln!("completed: {op}");
            }
            eprintln!("   failed: {}", halt.failed);
            for op in &halt.remaining {
                eprintln!("  skipped: {op}");
            }
            Err(EfiError::Execution(halt).into())
        }
        Err(err) => Err(err.into()),
    }
}
