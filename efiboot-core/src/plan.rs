// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! The reconciliation engine.
//!
//! [`reconcile`] diffs a desired entry list against an observed [`Snapshot`]
//! and produces an ordered [`Plan`] of operations that transforms the store
//! into the desired state. Entries are matched by label, never by id: ids
//! are store-assigned and do not survive deletion and recreation.
//!
//! The function is pure. It allocates nothing external, mutates nothing, and
//! always produces the same plan for the same inputs, so it is safe to call
//! repeatedly or concurrently for different input pairs.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::config::BootEntry;
use crate::state::{BootId, Snapshot, SnapshotError};

/// Errors from [`reconcile`].
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Two desired entries share a label. Config validation catches this
    /// first; the engine re-checks because matching is keyed by label.
    #[error("multiple desired entries with label \"{0}\"")]
    DuplicateLabel(String),

    /// The observed snapshot violates its invariants, which indicates a
    /// backend bug. Nothing is mutated.
    #[error("inconsistent snapshot")]
    InconsistentSnapshot(#[from] SnapshotError),

    /// The configured timeout cannot be represented in the store.
    #[error("invalid timeout: {0}")]
    InvalidTimeout(i64),

    /// The requested next-boot label is not among the desired entries.
    #[error("next-boot label \"{0}\" is not a configured entry")]
    UnknownNextBoot(String),
}

/// An id as known at planning time.
///
/// New entries have no id until the backend creates them, so plans carry a
/// placeholder: an index into the plan's creates, in emission order. The
/// executor resolves placeholders once the corresponding create succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanId {
    /// An id that already exists in the store.
    Existing(BootId),

    /// The id that the n-th `Create` of the plan will produce.
    Pending(usize),
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Existing(id) => write!(f, "{id}"),
            Self::Pending(n) => write!(f, "Boot<create #{n}>"),
        }
    }
}

/// A single mutation against the boot entry store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Create a new entry. Produces the id referenced by
    /// [`PlanId::Pending`] placeholders.
    Create(BootEntry),

    /// Rewrite the loader and params of an existing entry. The label is
    /// unchanged; backends that rewrite by delete + recreate need it, so the
    /// whole desired entry is carried.
    Update {
        /// The id of the entry to rewrite.
        id: BootId,
        /// The desired content for the entry.
        entry: BootEntry,
    },

    /// Delete an entry. The id is never referenced again.
    Delete(BootId),

    /// Replace the full boot order. Emitted at most once, after every create
    /// and delete, so that it names a final, valid id set.
    Reorder(Vec<PlanId>),

    /// Make an entry the default (the head of the boot order).
    SetDefault(PlanId),

    /// Arm or clear the one-shot next-boot override.
    SetNextBoot(Option<PlanId>),

    /// Set the boot menu timeout, or clear it back to the platform default.
    SetTimeout(Option<u16>),
}

impl Operation {
    /// Whether this operation changes the entry set or its order, as opposed
    /// to the default/next-boot/timeout settings.
    #[must_use = "Has no effect if the result is unused"]
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Create(_) | Self::Update { .. } | Self::Delete(_) | Self::Reorder(_)
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(entry) => {
                write!(
                    f,
                    "CREATE \"{}\" {} {:?}",
                    entry.label, entry.loader, entry.params
                )
            }
            Self::Update { id, entry } => {
                write!(f, "UPDATE {id} {} {:?}", entry.loader, entry.params)
            }
            Self::Delete(id) => write!(f, "DELETE {id}"),
            Self::Reorder(order) => {
                write!(f, "SET BootOrder = [")?;
                for (i, id) in order.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{id}")?;
                }
                write!(f, "]")
            }
            Self::SetDefault(id) => write!(f, "SET Default = {id}"),
            Self::SetNextBoot(Some(id)) => write!(f, "SET BootNext = {id}"),
            Self::SetNextBoot(None) => write!(f, "UNSET BootNext"),
            Self::SetTimeout(Some(secs)) => write!(f, "SET Timeout = {secs}"),
            Self::SetTimeout(None) => write!(f, "UNSET Timeout"),
        }
    }
}

/// An ordered sequence of operations. Execution order is significant;
/// see [`crate::executor`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    /// The operations, in the order they must run.
    ops: Vec<Operation>,
}

impl Plan {
    /// Whether the plan contains no operations at all.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The number of operations in the plan.
    #[must_use = "Has no effect if the result is unused"]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Iterates over the operations in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter()
    }

    /// Returns the operations as a slice, in execution order.
    #[must_use = "Has no effect if the result is unused"]
    pub fn as_slice(&self) -> &[Operation] {
        &self.ops
    }
}

/// Settings that shape a plan beyond the entry list itself.
#[derive(Clone, Debug, Default)]
pub struct ReconcileOptions {
    /// The desired boot menu timeout. `None` never touches the store's
    /// timeout; `-1` always clears it, even when it already reads as unset,
    /// since "unset" and "platform default" are not distinguishable in every
    /// backend.
    pub timeout: Option<i64>,

    /// A desired label to arm as the one-shot next-boot override.
    pub next_boot: Option<String>,
}

/// Computes the plan that brings `observed` in line with `desired`.
///
/// Matching rule: by exact, case-sensitive label. A matched entry is updated
/// only when its content differs (or cannot be proven equal); an unmatched
/// desired entry is created; an unmatched observed entry is deleted. When
/// several observed entries carry the same desired label, the first in
/// listing order is kept and the surplus deleted.
///
/// Operations are emitted in a fixed order: creates and updates in desired
/// order, deletes in observed order, then at most one reorder, then
/// default, next-boot and timeout settings.
///
/// # Errors
///
/// May return an `Error` if `desired` repeats a label, the snapshot is
/// inconsistent, the timeout is out of range, or the next-boot label is not
/// a desired entry.
pub fn reconcile(
    desired: &[BootEntry],
    observed: &Snapshot,
    options: &ReconcileOptions,
) -> Result<Plan, ReconcileError> {
    let mut labels = HashSet::new();
    for entry in desired {
        if !labels.insert(entry.label.as_str()) {
            return Err(ReconcileError::DuplicateLabel(entry.label.clone()));
        }
    }
    observed.validate()?;

    let mut ops = Vec::new();

    // Match desired entries to observed ids by label. Each observed id is
    // claimed at most once, so surplus duplicates fall through to deletion.
    let mut claimed = HashSet::new();
    let mut matched = Vec::with_capacity(desired.len());
    for want in desired {
        let hit = observed
            .entries
            .iter()
            .find(|obs| obs.label == want.label && !claimed.contains(&obs.id));
        if let Some(obs) = hit {
            claimed.insert(obs.id);
        }
        matched.push(hit);
    }

    // Creates and updates, in desired order. `resolved` becomes the target
    // boot order, with placeholders standing in for ids not yet assigned.
    let mut pending = 0;
    let mut resolved = Vec::with_capacity(desired.len());
    for (want, hit) in desired.iter().zip(&matched) {
        match hit {
            Some(obs) => {
                if !obs.content_matches(want) {
                    ops.push(Operation::Update {
                        id: obs.id,
                        entry: want.clone(),
                    });
                }
                resolved.push(PlanId::Existing(obs.id));
            }
            None => {
                ops.push(Operation::Create(want.clone()));
                resolved.push(PlanId::Pending(pending));
                pending += 1;
            }
        }
    }

    // Deletes, in observed order.
    for obs in &observed.entries {
        if !claimed.contains(&obs.id) {
            ops.push(Operation::Delete(obs.id));
        }
    }

    // Reorder only when the observed order, restricted to surviving ids,
    // does not already spell out the target. Any pending create means the
    // orders cannot be equal.
    let surviving: Vec<BootId> = observed
        .order
        .iter()
        .copied()
        .filter(|id| claimed.contains(id))
        .collect();
    let order_matches = surviving.len() == resolved.len()
        && surviving
            .iter()
            .zip(&resolved)
            .all(|(&id, target)| *target == PlanId::Existing(id));
    if !order_matches && !resolved.is_empty() {
        ops.push(Operation::Reorder(resolved.clone()));
    }

    // The first desired entry is always the intended default. An empty
    // desired list emits nothing: clearing an existing default requires
    // explicit intent, not absence of configuration.
    if let Some(&first) = resolved.first() {
        let already_default = match first {
            PlanId::Existing(id) => observed.default_entry() == Some(id),
            PlanId::Pending(_) => false,
        };
        if !already_default {
            ops.push(Operation::SetDefault(first));
        }
    }

    if let Some(label) = &options.next_boot {
        let target = desired
            .iter()
            .position(|entry| &entry.label == label)
            .map(|idx| resolved[idx])
            .ok_or_else(|| ReconcileError::UnknownNextBoot(label.clone()))?;
        let already_armed = match target {
            PlanId::Existing(id) => observed.next_boot == Some(id),
            PlanId::Pending(_) => false,
        };
        if !already_armed {
            ops.push(Operation::SetNextBoot(Some(target)));
        }
    }

    match options.timeout {
        None => {}
        // -1 is emitted verbatim even when the timeout already reads as
        // unset: not every backend can tell "unset" from "platform default".
        Some(-1) => ops.push(Operation::SetTimeout(None)),
        Some(secs) => {
            let secs = u16::try_from(secs).map_err(|_| ReconcileError::InvalidTimeout(secs))?;
            if observed.timeout != Some(secs) {
                ops.push(Operation::SetTimeout(Some(secs)));
            }
        }
    }

    Ok(Plan { ops })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ObservedEntry;

    fn entry(label: &str, loader: &str, params: &[&str]) -> BootEntry {
        BootEntry::new(label, loader, params.iter().copied())
    }

    fn observed(id: u16, label: &str, loader: &str, params: &[&str]) -> ObservedEntry {
        ObservedEntry {
            id: BootId(id),
            label: label.to_owned(),
            loader: Some(loader.to_owned()),
            params: Some(params.iter().map(ToString::to_string).collect()),
            active: true,
        }
    }

    fn snapshot(entries: Vec<ObservedEntry>, order: &[u16]) -> Snapshot {
        Snapshot {
            entries,
            order: order.iter().map(|&n| BootId(n)).collect(),
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_in_sync_store_yields_empty_plan() -> Result<(), ReconcileError> {
        // Scenario A: one entry, identical content, already the default.
        let desired = [entry("A", "/a", &[])];
        let store = snapshot(vec![observed(1, "A", "/a", &[])], &[1]);
        let plan = reconcile(&desired, &store, &ReconcileOptions::default())?;
        assert!(plan.is_empty());
        Ok(())
    }

    #[test]
    fn test_changed_params_yield_update_only() -> Result<(), ReconcileError> {
        // Scenario B: same label and loader, different params.
        let desired = [entry("A", "/a", &["x"])];
        let store = snapshot(vec![observed(1, "A", "/a", &[])], &[1]);
        let plan = reconcile(&desired, &store, &ReconcileOptions::default())?;
        assert_eq!(
            plan.as_slice(),
            [Operation::Update {
                id: BootId(1),
                entry: entry("A", "/a", &["x"]),
            }]
        );
        Ok(())
    }

    #[test]
    fn test_new_entry_creates_reorders_and_sets_default() -> Result<(), ReconcileError> {
        // Scenario C: "A" is new and outranks the existing "B".
        let desired = [entry("A", "/a", &[]), entry("B", "/b", &[])];
        let store = snapshot(vec![observed(1, "B", "/b", &[])], &[1]);
        let plan = reconcile(&desired, &store, &ReconcileOptions::default())?;
        assert_eq!(
            plan.as_slice(),
            [
                Operation::Create(entry("A", "/a", &[])),
                Operation::Reorder(vec![PlanId::Pending(0), PlanId::Existing(BootId(1))]),
                Operation::SetDefault(PlanId::Pending(0)),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_stale_entry_deleted_without_reorder() -> Result<(), ReconcileError> {
        // Scenario D: deleting the stale entry already leaves the right order.
        let desired = [entry("A", "/a", &[])];
        let store = snapshot(
            vec![observed(1, "A", "/a", &[]), observed(2, "Stale", "/s", &[])],
            &[1, 2],
        );
        let plan = reconcile(&desired, &store, &ReconcileOptions::default())?;
        assert_eq!(plan.as_slice(), [Operation::Delete(BootId(2))]);
        Ok(())
    }

    #[test]
    fn test_label_match_reorders_only() -> Result<(), ReconcileError> {
        // Identical label sets and content, different priority order.
        let desired = [entry("A", "/a", &[]), entry("B", "/b", &[])];
        let store = snapshot(
            vec![observed(1, "B", "/b", &[]), observed(2, "A", "/a", &[])],
            &[1, 2],
        );
        let plan = reconcile(&desired, &store, &ReconcileOptions::default())?;
        assert_eq!(
            plan.as_slice(),
            [
                Operation::Reorder(vec![
                    PlanId::Existing(BootId(2)),
                    PlanId::Existing(BootId(1)),
                ]),
                Operation::SetDefault(PlanId::Existing(BootId(2))),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_determinism() -> Result<(), ReconcileError> {
        let desired = [entry("A", "/a", &["x"]), entry("C", "/c", &[])];
        let store = snapshot(
            vec![observed(1, "B", "/b", &[]), observed(2, "A", "/a", &[])],
            &[1, 2],
        );
        let first = reconcile(&desired, &store, &ReconcileOptions::default())?;
        let second = reconcile(&desired, &store, &ReconcileOptions::default())?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_minimality() -> Result<(), ReconcileError> {
        // No delete for a label that stays desired, no create for a label
        // that already exists with identical content.
        let desired = [entry("A", "/a", &[]), entry("B", "/b", &["quiet"])];
        let store = snapshot(
            vec![observed(1, "A", "/a", &[]), observed(2, "B", "/b", &[])],
            &[1, 2],
        );
        let plan = reconcile(&desired, &store, &ReconcileOptions::default())?;
        for op in plan.iter() {
            assert!(!matches!(op, Operation::Create(_) | Operation::Delete(_)));
        }
        Ok(())
    }

    #[test]
    fn test_unknown_observed_content_forces_update() -> Result<(), ReconcileError> {
        // efibootmgr does not report loader/params, so a matched label with
        // unknown content must be rewritten rather than assumed equal.
        let desired = [entry("A", "/a", &[])];
        let store = snapshot(
            vec![ObservedEntry {
                id: BootId(1),
                label: "A".to_owned(),
                loader: None,
                params: None,
                active: true,
            }],
            &[1],
        );
        let plan = reconcile(&desired, &store, &ReconcileOptions::default())?;
        assert_eq!(
            plan.as_slice(),
            [Operation::Update {
                id: BootId(1),
                entry: entry("A", "/a", &[]),
            }]
        );
        Ok(())
    }

    #[test]
    fn test_duplicate_observed_labels_keep_first() -> Result<(), ReconcileError> {
        let desired = [entry("A", "/a", &[])];
        let store = snapshot(
            vec![observed(3, "A", "/a", &[]), observed(5, "A", "/a", &[])],
            &[3, 5],
        );
        let plan = reconcile(&desired, &store, &ReconcileOptions::default())?;
        assert_eq!(plan.as_slice(), [Operation::Delete(BootId(5))]);
        Ok(())
    }

    #[test]
    fn test_empty_desired_never_clears_default() -> Result<(), ReconcileError> {
        let store = snapshot(vec![observed(1, "A", "/a", &[])], &[1]);
        let plan = reconcile(&[], &store, &ReconcileOptions::default())?;
        // The lone observed entry is stale, but no SetDefault/Reorder is
        // emitted for an empty desired list.
        assert_eq!(plan.as_slice(), [Operation::Delete(BootId(1))]);
        Ok(())
    }

    #[test]
    fn test_duplicate_desired_labels_rejected() {
        let desired = [entry("A", "/a", &[]), entry("A", "/a2", &[])];
        let store = snapshot(vec![], &[]);
        assert!(matches!(
            reconcile(&desired, &store, &ReconcileOptions::default()),
            Err(ReconcileError::DuplicateLabel(label)) if label == "A"
        ));
    }

    #[test]
    fn test_inconsistent_snapshot_rejected() {
        let desired = [entry("A", "/a", &[])];
        let store = snapshot(vec![observed(1, "A", "/a", &[])], &[1, 9]);
        assert!(matches!(
            reconcile(&desired, &store, &ReconcileOptions::default()),
            Err(ReconcileError::InconsistentSnapshot(_))
        ));
    }

    #[test]
    fn test_timeout_unset_is_never_touched() -> Result<(), ReconcileError> {
        let desired = [entry("A", "/a", &[])];
        let mut store = snapshot(vec![observed(1, "A", "/a", &[])], &[1]);
        store.timeout = Some(30);
        let plan = reconcile(&desired, &store, &ReconcileOptions::default())?;
        assert!(plan.is_empty());
        Ok(())
    }

    #[test]
    fn test_timeout_set_when_differing() -> Result<(), ReconcileError> {
        let desired = [entry("A", "/a", &[])];
        let mut store = snapshot(vec![observed(1, "A", "/a", &[])], &[1]);
        store.timeout = Some(30);

        let options = ReconcileOptions {
            timeout: Some(30),
            ..ReconcileOptions::default()
        };
        assert!(reconcile(&desired, &store, &options)?.is_empty());

        let options = ReconcileOptions {
            timeout: Some(5),
            ..ReconcileOptions::default()
        };
        let plan = reconcile(&desired, &store, &options)?;
        assert_eq!(plan.as_slice(), [Operation::SetTimeout(Some(5))]);
        Ok(())
    }

    #[test]
    fn test_timeout_clear_is_emitted_verbatim() -> Result<(), ReconcileError> {
        // -1 always clears, even when the store already reads as unset.
        let desired = [entry("A", "/a", &[])];
        let store = snapshot(vec![observed(1, "A", "/a", &[])], &[1]);
        let options = ReconcileOptions {
            timeout: Some(-1),
            ..ReconcileOptions::default()
        };
        let plan = reconcile(&desired, &store, &options)?;
        assert_eq!(plan.as_slice(), [Operation::SetTimeout(None)]);
        Ok(())
    }

    #[test]
    fn test_timeout_out_of_range_rejected() {
        let desired = [entry("A", "/a", &[])];
        let store = snapshot(vec![observed(1, "A", "/a", &[])], &[1]);
        let options = ReconcileOptions {
            timeout: Some(i64::from(u16::MAX) + 1),
            ..ReconcileOptions::default()
        };
        assert!(matches!(
            reconcile(&desired, &store, &options),
            Err(ReconcileError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_next_boot_armed_when_differing() -> Result<(), ReconcileError> {
        let desired = [entry("A", "/a", &[]), entry("B", "/b", &[])];
        let mut store = snapshot(
            vec![observed(1, "A", "/a", &[]), observed(2, "B", "/b", &[])],
            &[1, 2],
        );
        let options = ReconcileOptions {
            next_boot: Some("B".to_owned()),
            ..ReconcileOptions::default()
        };

        let plan = reconcile(&desired, &store, &options)?;
        assert_eq!(
            plan.as_slice(),
            [Operation::SetNextBoot(Some(PlanId::Existing(BootId(2))))]
        );

        store.next_boot = Some(BootId(2)); // already armed
        assert!(reconcile(&desired, &store, &options)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_next_boot_unknown_label_rejected() {
        let desired = [entry("A", "/a", &[])];
        let store = snapshot(vec![observed(1, "A", "/a", &[])], &[1]);
        let options = ReconcileOptions {
            next_boot: Some("Ghost".to_owned()),
            ..ReconcileOptions::default()
        };
        assert!(matches!(
            reconcile(&desired, &store, &options),
            Err(ReconcileError::UnknownNextBoot(label)) if label == "Ghost"
        ));
    }

    #[test]
    fn test_unordered_entry_gets_ordered() -> Result<(), ReconcileError> {
        // Firmware left the matched entry out of BootOrder entirely; the
        // surviving order ([]) differs from the target ([1]), so reorder.
        let desired = [entry("A", "/a", &[])];
        let store = snapshot(vec![observed(1, "A", "/a", &[])], &[]);
        let plan = reconcile(&desired, &store, &ReconcileOptions::default())?;
        assert_eq!(
            plan.as_slice(),
            [
                Operation::Reorder(vec![PlanId::Existing(BootId(1))]),
                Operation::SetDefault(PlanId::Existing(BootId(1))),
            ]
        );
        Ok(())
    }
}
