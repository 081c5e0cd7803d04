// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! The `timeout` subcommand: the boot menu timeout.

use anyhow::Context;
use efiboot_core::backend::Backend;

/// Prints, sets or clears the boot menu timeout.
///
/// # Errors
///
/// May return an `Error` if the argument is neither a number of seconds nor
/// `clear`, or the backend call fails.
pub fn timeout(backend: &mut dyn Backend, seconds: Option<&str>) -> anyhow::Result<()> {
    let Some(arg) = seconds else {
        let snapshot = backend.read()?;
        match snapshot.timeout {
            Some(secs) => println!("{secs} seconds"),
            None => println!("not set"),
        }
        return Ok(());
    };

    if arg == "clear" {
        backend.set_timeout(None)?;
        return Ok(());
    }

    let secs: u16 = arg
        .parse()
        .with_context(|| format!("\"{arg}\" is neither a number of seconds nor \"clear\""))?;
    backend.set_timeout(Some(secs))?;
    Ok(())
}
