// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! The capability contract between the engine and the boot entry store.
//!
//! Concrete backends adapt a platform mechanism (the stock one wraps the
//! `efibootmgr` utility) to the [`Backend`] trait. The backend is selected
//! once at startup, either explicitly through the config's `backend` key or
//! by static host detection, and is exclusively owned for the duration of a
//! run.

use std::str::FromStr;

use thiserror::Error;

use crate::config::{BootEntry, Config};
use crate::state::{BootId, Snapshot};

pub mod efibootmgr;

/// Errors from a [`Backend`].
#[derive(Error, Debug)]
pub enum BackendError {
    /// The underlying mechanism exists but a call against it failed.
    #[error("{program} failed: {detail}")]
    Command {
        /// The program or mechanism that failed.
        program: &'static str,
        /// What it reported, typically captured stderr.
        detail: String,
    },

    /// An I/O error while invoking the underlying mechanism.
    #[error("backend I/O error")]
    Io(#[from] std::io::Error),

    /// The referenced entry does not exist in the store.
    #[error("no boot entry {0}")]
    NotFound(BootId),

    /// The store's reply could not be understood.
    #[error("failed to parse backend output: {0}")]
    Parse(String),

    /// The underlying mechanism could not be reached at all.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The config names a backend this build does not know.
    #[error("unknown backend \"{0}\"")]
    UnknownBackend(String),

    /// No backend is compatible with this host.
    #[error("backend unsupported: {0}")]
    Unsupported(String),
}

/// The abstract capability to read and mutate the boot entry store.
///
/// Mutations act on live system state and are not required to be idempotent,
/// so callers must not retry blindly; see [`crate::executor`] for the
/// stop-on-first-failure policy built on top of this.
pub trait Backend {
    /// Reads a full snapshot of the store.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the store cannot be reached or its reply
    /// cannot be parsed.
    fn read(&mut self) -> Result<Snapshot, BackendError>;

    /// Creates a new entry and returns its store-assigned id.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the store rejects the entry or the new id
    /// cannot be identified.
    fn create(&mut self, entry: &BootEntry) -> Result<BootId, BackendError>;

    /// Rewrites an entry's content, returning its id afterwards. Backends
    /// with no in-place rewrite may delete and recreate, in which case the
    /// returned id differs from `id`.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the entry does not exist or the rewrite
    /// fails partway.
    fn update(&mut self, id: BootId, entry: &BootEntry) -> Result<BootId, BackendError>;

    /// Deletes an entry.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the entry does not exist.
    fn delete(&mut self, id: BootId) -> Result<(), BackendError>;

    /// Replaces the boot order.
    ///
    /// # Errors
    ///
    /// May return an `Error` if any id in the order does not exist.
    fn reorder(&mut self, order: &[BootId]) -> Result<(), BackendError>;

    /// Makes an entry the default.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the entry does not exist.
    fn set_default(&mut self, id: BootId) -> Result<(), BackendError>;

    /// Arms (`Some`) or clears (`None`) the one-shot next-boot override.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the entry does not exist.
    fn set_next_boot(&mut self, id: Option<BootId>) -> Result<(), BackendError>;

    /// Sets (`Some`) or clears (`None`) the boot menu timeout.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the store rejects the value.
    fn set_timeout(&mut self, seconds: Option<u16>) -> Result<(), BackendError>;
}

/// The backend kinds this build knows about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Pick the first kind compatible with the host.
    #[default]
    Auto,

    /// The `efibootmgr` process wrapper.
    Efibootmgr,
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" | "default" => Ok(Self::Auto),
            "efibootmgr" => Ok(Self::Efibootmgr),
            other => Err(BackendError::UnknownBackend(other.to_owned())),
        }
    }
}

/// Selects and constructs the backend for this host from the config.
///
/// # Errors
///
/// May return an `Error` if the config names an unknown backend, the named
/// backend cannot run on this host, or no known backend can.
pub fn select(config: &Config) -> Result<Box<dyn Backend>, BackendError> {
    let kind = match config.backend.as_deref() {
        None => BackendKind::Auto,
        Some(name) => name.parse()?,
    };

    match kind {
        BackendKind::Efibootmgr => {
            let backend = efibootmgr::EfibootmgrBackend::from_config(config)?;
            Ok(Box::new(backend))
        }
        BackendKind::Auto => {
            if efibootmgr::EfibootmgrBackend::is_compatible_with_host() {
                log::info!("using backend: efibootmgr");
                let backend = efibootmgr::EfibootmgrBackend::from_config(config)?;
                return Ok(Box::new(backend));
            }
            Err(BackendError::Unsupported(
                "no known backend is compatible with this host".to_owned(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("auto".parse::<BackendKind>().ok(), Some(BackendKind::Auto));
        assert_eq!(
            "default".parse::<BackendKind>().ok(),
            Some(BackendKind::Auto)
        );
        assert_eq!(
            "efibootmgr".parse::<BackendKind>().ok(),
            Some(BackendKind::Efibootmgr)
        );
        assert!(matches!(
            "efiboot.backends.exotic".parse::<BackendKind>(),
            Err(BackendError::UnknownBackend(_))
        ));
    }
}
