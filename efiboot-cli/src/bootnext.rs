// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! The `bootnext` subcommand: the one-shot next-boot override.

use anyhow::{Context, bail};
use efiboot_core::backend::Backend;
use efiboot_core::state::{BootId, Snapshot};

/// Prints, arms or clears the next-boot override.
///
/// With no argument the current override is printed. `clear` removes it.
/// Anything else is resolved as a label first, then as a `Boot####` id.
///
/// # Errors
///
/// May return an `Error` if the argument matches no entry, matches several
/// entries, or the backend call fails.
pub fn bootnext(backend: &mut dyn Backend, entry: Option<&str>) -> anyhow::Result<()> {
    let snapshot = backend.read()?;

    let Some(entry) = entry else {
        match snapshot.next_boot {
            Some(id) => match snapshot.entry(id) {
                Some(observed) => println!("{id} ({})", observed.label),
                None => println!("{id}"),
            },
            None => println!("not set"),
        }
        return Ok(());
    };

    if entry == "clear" {
        backend.set_next_boot(None)?;
        return Ok(());
    }

    let id = resolve(&snapshot, entry)?;
    backend.set_next_boot(Some(id))?;
    Ok(())
}

/// Resolves an entry argument against the snapshot. Labels take priority
/// over ids, so an entry labelled `0001` shadows the id `Boot0001`.
fn resolve(snapshot: &Snapshot, entry: &str) -> anyhow::Result<BootId> {
    let by_label = snapshot.find(entry);
    match by_label.as_slice() {
        [id] => return Ok(*id),
        [] => {}
        _ => bail!("several entries are labelled \"{entry}\", use a Boot#### id"),
    }

    let id: BootId = entry
        .parse()
        .ok()
        .with_context(|| format!("no boot entry labelled \"{entry}\""))?;
    if snapshot.entry(id).is_none() {
        bail!("no boot entry {id}");
    }
    Ok(id)
}
