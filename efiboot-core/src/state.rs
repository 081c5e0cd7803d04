// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! Observed state of the boot entry store.
//!
//! A [`Snapshot`] is a "before" image read once per run through a
//! [`crate::backend::Backend`]. The store itself remains the owner of truth:
//! nothing here is cached across runs, and the engine never constructs
//! observed entries except by reading.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;

use crate::config::BootEntry;

/// Errors indicating that a [`Snapshot`] violates its own invariants.
///
/// These point at a backend bug, not at anything the user configured.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The boot order lists the same id twice.
    #[error("boot order lists {0} twice")]
    DuplicateOrderId(BootId),

    /// The boot order references an id with no matching entry.
    #[error("boot order references unknown entry {0}")]
    DanglingOrderId(BootId),

    /// The next-boot override references an id with no matching entry.
    #[error("next-boot override references unknown entry {0}")]
    DanglingNextBoot(BootId),

    /// Two observed entries carry the same id.
    #[error("two entries share the id {0}")]
    DuplicateEntryId(BootId),
}

/// A platform-assigned boot entry identifier.
///
/// Stable across reads within a session, but only meaningful relative to the
/// live store; deleting and recreating an entry may produce a different id.
/// Displays in the firmware's `Boot%04X` spelling.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BootId(pub u16);

impl fmt::Display for BootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Boot{:04X}", self.0)
    }
}

impl FromStr for BootId {
    type Err = ParseIntError;

    /// Parses a hex boot number, with or without the `Boot` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("Boot").unwrap_or(s);
        Ok(Self(u16::from_str_radix(digits, 16)?))
    }
}

/// A boot entry as read from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservedEntry {
    /// The platform-assigned identifier.
    pub id: BootId,

    /// The label of the entry.
    pub label: String,

    /// The loader path, if the backend reports it. `efibootmgr` does not
    /// in its plain listing, so this is often unknown.
    pub loader: Option<String>,

    /// The loader parameters, if the backend reports them.
    pub params: Option<Vec<String>>,

    /// Whether the entry is marked active in the store.
    pub active: bool,
}

impl ObservedEntry {
    /// Whether the observed content provably equals the desired content.
    ///
    /// Unknown loader or params count as not matching, since they cannot be
    /// proven equal without rewriting the entry.
    #[must_use = "Has no effect if the result is unused"]
    pub fn content_matches(&self, desired: &BootEntry) -> bool {
        self.loader.as_deref() == Some(desired.loader.as_str())
            && self.params.as_deref() == Some(desired.params.as_slice())
    }
}

/// A point-in-time view of the boot entry store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Every boot entry present in the store, in listing order.
    pub entries: Vec<ObservedEntry>,

    /// The boot priority order. May omit entries; real firmware routinely
    /// leaves entries out of the order.
    pub order: Vec<BootId>,

    /// The entry the machine most recently booted, if reported. This is
    /// informational only: firmware may keep reporting an entry deleted
    /// since boot, so it is exempt from validation.
    pub current: Option<BootId>,

    /// The one-shot override for the next boot, if armed.
    pub next_boot: Option<BootId>,

    /// The boot menu timeout in seconds, if set.
    pub timeout: Option<u16>,
}

impl Snapshot {
    /// The default entry, i.e. the head of the boot order.
    #[must_use = "Has no effect if the result is unused"]
    pub fn default_entry(&self) -> Option<BootId> {
        self.order.first().copied()
    }

    /// Looks up an entry by id.
    #[must_use = "Has no effect if the result is unused"]
    pub fn entry(&self, id: BootId) -> Option<&ObservedEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Finds all entries with the given label, in listing order.
    #[must_use = "Has no effect if the result is unused"]
    pub fn find(&self, label: &str) -> Vec<BootId> {
        self.entries
            .iter()
            .filter(|entry| entry.label == label)
            .map(|entry| entry.id)
            .collect()
    }

    /// Checks the snapshot invariants: unique entry ids, an order without
    /// duplicates or dangling references, and a next-boot override that
    /// names a known entry.
    ///
    /// # Errors
    ///
    /// May return an `Error` describing the first violated invariant.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut ids = std::collections::HashSet::new();
        for entry in &self.entries {
            if !ids.insert(entry.id) {
                return Err(SnapshotError::DuplicateEntryId(entry.id));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for &id in &self.order {
            if !seen.insert(id) {
                return Err(SnapshotError::DuplicateOrderId(id));
            }
            if !ids.contains(&id) {
                return Err(SnapshotError::DanglingOrderId(id));
            }
        }

        if let Some(id) = self.next_boot
            && !ids.contains(&id)
        {
            return Err(SnapshotError::DanglingNextBoot(id));
        }

        Ok(())
    }
}
