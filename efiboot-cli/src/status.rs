// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! The `status` subcommand: print the boot entry store.

use efiboot_core::backend::Backend;
use efiboot_core::state::{BootId, Snapshot};

/// Prints the store in a tab-separated listing, one `Boot` line per entry.
///
/// # Errors
///
/// May return an `Error` if the snapshot cannot be read.
pub fn status(backend: &mut dyn Backend) -> anyhow::Result<()> {
    let snapshot = backend.read()?;
    for line in render(&snapshot) {
        println!("{line}");
    }
    Ok(())
}

/// Formats one of the `Current`/`Next` lines, with the entry's label when
/// the entry is still known to the store.
fn entry_line(snapshot: &Snapshot, name: &str, id: Option<BootId>) -> String {
    match id {
        Some(id) => match snapshot.entry(id) {
            Some(entry) => format!("{name}\t{:04X}\t{}", id.0, entry.label),
            None => format!("{name}\t{:04X}", id.0),
        },
        None => format!("{name}\tnot set"),
    }
}

/// Renders the snapshot as the tab-separated listing, line by line.
fn render(snapshot: &Snapshot) -> Vec<String> {
    let mut lines = Vec::new();

    match snapshot.timeout {
        Some(secs) => lines.push(format!("Timeout\t{secs} seconds")),
        None => lines.push("Timeout\tnot set".to_owned()),
    }
    lines.push(entry_line(snapshot, "Current", snapshot.current));
    lines.push(entry_line(snapshot, "Next", snapshot.next_boot));

    if snapshot.order.is_empty() {
        lines.push("Order\tnot set".to_owned());
    } else {
        let order: Vec<String> = snapshot
            .order
            .iter()
            .map(|id| format!("{:04X}", id.0))
            .collect();
        lines.push(format!("Order\t{}", order.join(",")));
    }

    for entry in &snapshot.entries {
        let mut tags = Vec::new();
        if snapshot.current == Some(entry.id) {
            tags.push("current");
        }
        if snapshot.next_boot == Some(entry.id) {
            tags.push("next");
        }
        if !entry.active {
            tags.push("inactive");
        }
        if tags.is_empty() {
            lines.push(format!("Boot\t{:04X}\t{}", entry.id.0, entry.label));
        } else {
            lines.push(format!(
                "Boot\t{:04X}\t{}\t[{}]",
                entry.id.0,
                entry.label,
                tags.join(",")
            ));
        }
    }
    lines
}
