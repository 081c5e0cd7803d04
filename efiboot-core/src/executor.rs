// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! Applies a [`Plan`] through a [`Backend`].
//!
//! Operations run strictly in plan order, on one thread of control: later
//! operations depend on the outcomes of earlier ones (a reorder names ids
//! that creates produce), so there is nothing to parallelize. On the first
//! failure execution stops: firmware variable stores have no transaction
//! primitive, so completed operations are not rolled back, and remaining
//! operations are not attempted since they may assume the failed one
//! succeeded. The error reports exactly which operations committed, so the
//! caller can tell the user the machine's true state; a re-run against the
//! new observed state is safe because completed work no longer diffs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use thiserror::Error;

use crate::backend::{Backend, BackendError};
use crate::plan::{Operation, Plan, PlanId};
use crate::state::BootId;

/// Why a single plan step did not run to completion.
#[derive(Error, Debug)]
pub enum StepError {
    /// The backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A cancellation was requested before the operation started. Nothing
    /// is ever cancelled mid-operation.
    #[error("cancelled before the operation started")]
    Cancelled,

    /// An operation referenced a create that has not run yet. Plans built
    /// by [`crate::plan::reconcile`] never do this.
    #[error("operation references create #{0} before it ran")]
    UnresolvedCreate(usize),
}

/// A plan that stopped partway through.
#[derive(Error, Debug)]
#[error("plan halted at \"{failed}\" with {} operations completed and {} not attempted", completed.len(), remaining.len())]
pub struct ExecutionError {
    /// The operations that committed, in execution order.
    pub completed: Vec<Operation>,

    /// The operation that failed (or, for a cancellation, did not start).
    pub failed: Operation,

    /// The operations that were never attempted.
    pub remaining: Vec<Operation>,

    /// What went wrong.
    #[source]
    pub source: StepError,
}

/// A successfully executed plan.
#[derive(Clone, Debug, Default)]
pub struct Applied {
    /// The ids assigned to the plan's creates, in plan order.
    pub created: Vec<BootId>,

    /// How many operations ran.
    pub operations: usize,
}

/// Resolves plan-time ids to live store ids during execution.
#[derive(Default)]
struct Resolver {
    /// Ids produced by the plan's creates so far, in plan order.
    created: Vec<BootId>,

    /// Entries whose id changed when a backend rewrote them by delete and
    /// recreate, keyed by the plan-time id.
    renames: HashMap<BootId, BootId>,
}

impl Resolver {
    /// Maps a plan-time id to the id it denotes in the live store.
    fn resolve(&self, id: PlanId) -> Result<BootId, StepError> {
        match id {
            PlanId::Existing(id) => Ok(self.renames.get(&id).copied().unwrap_or(id)),
            PlanId::Pending(n) => self
                .created
                .get(n)
                .copied()
                .ok_or(StepError::UnresolvedCreate(n)),
        }
    }
}

/// Executes a plan to completion, or to its first failure.
///
/// # Errors
///
/// May return an `Error` carrying the completed, failed and unattempted
/// operations when any backend call fails.
pub fn execute(plan: &Plan, backend: &mut dyn Backend) -> Result<Applied, Box<ExecutionError>> {
    execute_with_cancel(plan, backend, &AtomicBool::new(false))
}

/// Executes a plan, checking `cancel` between operations.
///
/// Cancellation is cooperative and coarse: a set flag stops the plan before
/// the next operation, never inside one.
///
/// # Errors
///
/// May return an `Error` when a backend call fails or the flag is set, in
/// both cases reporting exactly which operations committed.
pub fn execute_with_cancel(
    plan: &Plan,
    backend: &mut dyn Backend,
    cancel: &AtomicBool,
) -> Result<Applied, Box<ExecutionError>> {
    let mut resolver = Resolver::default();

    for (idx, op) in plan.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Err(halt(plan, idx, StepError::Cancelled));
        }
        info!("{op}");
        if let Err(source) = apply(op, backend, &mut resolver) {
            return Err(halt(plan, idx, source));
        }
    }

    Ok(Applied {
        created: resolver.created,
        operations: plan.len(),
    })
}

/// Runs one operation against the backend.
fn apply(
    op: &Operation,
    backend: &mut dyn Backend,
    resolver: &mut Resolver,
) -> Result<(), StepError> {
    match op {
        Operation::Create(entry) => {
            let id = backend.create(entry)?;
            resolver.created.push(id);
        }
        Operation::Update { id, entry } => {
            let current = resolver.resolve(PlanId::Existing(*id))?;
            let after = backend.update(current, entry)?;
            if after != current {
                resolver.renames.insert(*id, after);
            }
        }
        Operation::Delete(id) => {
            backend.delete(resolver.resolve(PlanId::Existing(*id))?)?;
        }
        Operation::Reorder(order) => {
            let ids = order
                .iter()
                .map(|&id| resolver.resolve(id))
                .collect::<Result<Vec<_>, _>>()?;
            backend.reorder(&ids)?;
        }
        Operation::SetDefault(id) => {
            backend.set_default(resolver.resolve(*id)?)?;
        }
        Operation::SetNextBoot(id) => {
            let id = id.map(|id| resolver.resolve(id)).transpose()?;
            backend.set_next_boot(id)?;
        }
        Operation::SetTimeout(seconds) => {
            backend.set_timeout(*seconds)?;
        }
    }
    Ok(())
}

/// Packages up the progress made before the plan stopped at `idx`.
fn halt(plan: &Plan, idx: usize, source: StepError) -> Box<ExecutionError> {
    let ops = plan.as_slice();
    Box::new(ExecutionError {
        completed: ops[..idx].to_vec(),
        failed: ops[idx].clone(),
        remaining: ops[idx + 1..].to_vec(),
        source,
    })
}
