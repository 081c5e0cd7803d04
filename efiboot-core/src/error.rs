// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! Provides [`EfiError`], which encapsulates other errors

use thiserror::Error;

/// An `Error` resulting from the program.
#[derive(Error, Debug)]
pub enum EfiError {
    /// An error in the configuration file, caught before any backend call.
    #[error("Configuration Error")]
    Config(#[from] crate::config::ConfigError),

    /// An error while talking to the boot entry store.
    #[error("Backend Error")]
    Backend(#[from] crate::backend::BackendError),

    /// The desired entries or the observed snapshot could not be reconciled.
    #[error("Reconcile Error")]
    Reconcile(#[from] crate::plan::ReconcileError),

    /// A plan stopped partway through execution.
    #[error("Execution Error")]
    Execution(#[from] Box<crate::executor::ExecutionError>),
}
