// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! The `efiboot` library crate.
//!
//! This crate manages EFI boot entries declaratively: a TOML configuration
//! names an ordered list of boot entries, and the reconciliation engine in
//! [`plan`] computes the minimal sequence of operations that brings the
//! machine's live boot entry store in line with it. The [`executor`] applies
//! that sequence through a [`backend::Backend`], of which the stock
//! implementation wraps the `efibootmgr` utility.
//!
//! The frontend for this crate lives in `efiboot-cli`, but the library is
//! usable on its own, for example to drive reconciliation from a provisioning
//! tool with a custom backend.
//!
//! ## MSRV
//!
//! The minimum supported rust version is 1.88.0.

/// The primary result type that wraps around [`crate::error::EfiError`].
pub type EfiResult<T> = Result<T, crate::error::EfiError>;

pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod plan;
pub mod state;

/// Reads the store, plans the difference against the config's entries, and
/// applies it, all in one call.
///
/// This is the `push` operation as a library function. Callers that need
/// finer control, such as inspecting the plan before applying it or
/// cancelling between operations, compose [`plan::reconcile`] and
/// [`executor::execute`] themselves.
///
/// # Errors
///
/// May return an `Error` if the config is invalid or names no entries, the
/// snapshot cannot be read or reconciled, or execution stops partway.
pub fn sync(
    config: &config::Config,
    backend: &mut dyn backend::Backend,
    options: &plan::ReconcileOptions,
) -> EfiResult<executor::Applied> {
    config.validate()?;
    config.require_entries()?;
    let observed = backend.read()?;
    let plan = plan::reconcile(&config.entries, &observed, options)?;
    executor::execute(&plan, backend).map_err(error::EfiError::Execution)
}
