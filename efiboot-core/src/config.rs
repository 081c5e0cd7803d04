// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! Provides [`Config`], the declarative description of the boot entry store.
//!
//! The configuration lives in a TOML file, by convention at
//! `/boot/efiboot.toml`. The order of the `[[BootEntry]]` tables is
//! significant: it becomes the boot priority order, and the first entry is
//! the default.
//!
//! Example configuration:
//!
//! ```toml
//! timeout = 5
//!
//! [[BootEntry]]
//! label = "Arch Linux"
//! loader = "/vmlinuz-linux"
//! params = ["root=/dev/sda2", "rw", "initrd=/initramfs-linux.img"]
//!
//! [[BootEntry]]
//! label = "Fallback"
//! loader = "/vmlinuz-linux"
//! params = ["root=/dev/sda2", "rw", "initrd=/initramfs-linux-fallback.img"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors indicating that a [`Config`] could not be loaded or is invalid.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A boot entry has the same label as an earlier one.
    #[error("multiple boot entries with label \"{0}\"")]
    DuplicateLabel(String),

    /// A boot entry has an empty label.
    #[error("boot entry {0} has an empty label")]
    EmptyLabel(usize),

    /// A boot entry has an empty loader path.
    #[error("boot entry \"{0}\" has an empty loader")]
    EmptyLoader(String),

    /// The config could not be re-encoded while applying overrides.
    #[error("failed to apply overrides")]
    Encode(#[from] toml::ser::Error),

    /// The timeout is below -1.
    #[error("invalid timeout: {0}")]
    InvalidTimeout(i64),

    /// The config contains no boot entries when at least one is required.
    #[error("config contains no boot entries")]
    NoEntries,

    /// An override is neither a TOML fragment nor `key=value`.
    #[error("failed to parse override: {0}")]
    Override(String),

    /// The config file could not be read.
    #[error("failed to read config at \"{path}\"")]
    Read {
        /// The path that was attempted.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML, or has fields of the wrong type.
    #[error("failed to parse config")]
    Toml(#[from] toml::de::Error),
}

/// A single desired boot entry.
///
/// Immutable once parsed; the engine never mutates entries in place.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BootEntry {
    /// The label of the entry. Must be unique within the config.
    pub label: String,

    /// The EFI application to boot, as a path relative to the root of the
    /// EFI system partition. Forward or backward slashes both work.
    pub loader: String,

    /// Command line parameters passed to the loader.
    #[serde(default)]
    pub params: Vec<String>,
}

impl BootEntry {
    /// Constructs an entry from its parts. Mostly useful in tests and for
    /// callers that do not go through a config file.
    #[must_use = "Has no effect if the result is unused"]
    pub fn new(
        label: impl Into<String>,
        loader: impl Into<String>,
        params: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            label: label.into(),
            loader: loader.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }
}

/// The desired state of the boot entry store, plus backend options.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// The boot menu timeout in seconds. `None` leaves the store's timeout
    /// untouched; `-1` clears it back to the platform default.
    pub timeout: Option<i64>,

    /// The backend to use. `None` or `"auto"` picks the first backend
    /// compatible with the host.
    pub backend: Option<String>,

    /// The partition device holding the EFI system partition, e.g.
    /// `/dev/sda1`. Autodetected from the mount table when unset.
    pub esp: Option<String>,

    /// The EDD version (1 or 3) to pass to the backend, if any.
    pub edd: Option<i64>,

    /// The EDD 1.0 device number, usually 0x80.
    pub edd_device: Option<u32>,

    /// Treat disks with an invalid PMBR as GPT.
    pub force_gpt: Option<bool>,

    /// The desired boot entries, highest priority first.
    #[serde(default, rename = "BootEntry")]
    pub entries: Vec<BootEntry>,
}

impl Config {
    /// Parses a [`Config`] from a TOML string.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the text is not valid TOML or does not match
    /// the config schema.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a [`Config`] from a file.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Validates the config.
    ///
    /// # Errors
    ///
    /// May return an `Error` if any label is empty or repeated, a loader is
    /// empty, or the timeout is below -1. An empty entry list is accepted
    /// here; commands that need entries call [`Config::require_entries`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut labels = HashSet::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.label.is_empty() {
                return Err(ConfigError::EmptyLabel(idx));
            }
            if entry.loader.is_empty() {
                return Err(ConfigError::EmptyLoader(entry.label.clone()));
            }
            if !labels.insert(entry.label.as_str()) {
                return Err(ConfigError::DuplicateLabel(entry.label.clone()));
            }
        }

        if let Some(timeout) = self.timeout
            && timeout < -1
        {
            return Err(ConfigError::InvalidTimeout(timeout));
        }

        Ok(())
    }

    /// Applies `key=value` overrides on top of the parsed config.
    ///
    /// Each override is parsed as a TOML fragment first, so quoted strings,
    /// integers and booleans all work (`timeout=5`, `force_gpt=true`,
    /// `esp="/dev/sda1"`); anything that is not valid TOML falls back to
    /// treating everything after the first `=` as a bare string. Later
    /// overrides win over earlier ones, which win over the file.
    ///
    /// # Errors
    ///
    /// May return an `Error` if an override has no `=` at all, or the merged
    /// result no longer matches the config schema.
    pub fn apply_overrides(&mut self, overrides: &[String]) -> Result<(), ConfigError> {
        if overrides.is_empty() {
            return Ok(());
        }

        let toml::Value::Table(mut doc) = toml::Value::try_from(&*self)? else {
            return Err(ConfigError::Override("config is not a table".to_owned()));
        };

        for text in overrides {
            let table = match text.parse::<toml::Table>() {
                Ok(table) => table,
                Err(_) => {
                    let Some((key, value)) = text.split_once('=') else {
                        return Err(ConfigError::Override(text.clone()));
                    };
                    let mut table = toml::Table::new();
                    table.insert(
                        key.trim().to_owned(),
                        toml::Value::String(value.trim().to_owned()),
                    );
                    table
                }
            };
            for (key, value) in table {
                doc.insert(key, value);
            }
        }

        *self = toml::Value::Table(doc).try_into()?;
        Ok(())
    }

    /// Checks that the config names at least one boot entry.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the entry list is empty.
    pub fn require_entries(&self) -> Result<(), ConfigError> {
        if self.entries.is_empty() {
            return Err(ConfigError::NoEntries);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const FULL_CONFIG: &str = r#"
        timeout = 10
        backend = "efibootmgr"
        esp = "/dev/nvme0n1p1"

        [[BootEntry]]
        label = "Arch Linux"
        loader = "/vmlinuz-linux"
        params = ["root=/dev/nvme0n1p2", "rw"]

        [[BootEntry]]
        label = "Fallback"
        loader = "/vmlinuz-linux"
    "#;

    #[test]
    fn test_full_config() -> Result<(), ConfigError> {
        let config = Config::from_toml(FULL_CONFIG)?;
        assert_eq!(config.timeout, Some(10));
        assert_eq!(config.backend.as_deref(), Some("efibootmgr"));
        assert_eq!(config.esp.as_deref(), Some("/dev/nvme0n1p1"));
        assert_eq!(config.entries.len(), 2);
        assert_eq!(config.entries[0].label, "Arch Linux");
        assert_eq!(
            config.entries[0].params,
            vec!["root=/dev/nvme0n1p2".to_owned(), "rw".to_owned()]
        );
        assert!(config.entries[1].params.is_empty()); // params are optional
        config.validate()?;
        config.require_entries()?;
        Ok(())
    }

    #[test]
    fn test_config_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(FULL_CONFIG.as_bytes())?;
        let config = Config::from_path(file.path())?;
        assert_eq!(config.entries.len(), 2);
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_path(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_empty_config() -> Result<(), ConfigError> {
        let config = Config::from_toml("")?;
        config.validate()?; // an empty config is valid
        assert!(config.require_entries().is_err()); // but cannot be pushed
        Ok(())
    }

    #[test]
    fn test_duplicate_labels() -> Result<(), ConfigError> {
        let config = Config::from_toml(
            r#"
            [[BootEntry]]
            label = "Linux"
            loader = "/vmlinuz"

            [[BootEntry]]
            label = "Linux"
            loader = "/vmlinuz-lts"
        "#,
        )?;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateLabel(label)) if label == "Linux"
        ));
        Ok(())
    }

    #[test]
    fn test_bad_timeout() -> Result<(), ConfigError> {
        let config = Config::from_toml("timeout = -2")?;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(-2))
        ));
        Ok(())
    }

    #[test]
    fn test_overrides_win_over_file() -> Result<(), ConfigError> {
        let mut config = Config::from_toml(FULL_CONFIG)?;
        config.apply_overrides(&[
            "timeout=3".to_owned(),          // TOML integer
            "force_gpt=true".to_owned(),     // TOML boolean
            "esp=/dev/sda1".to_owned(),      // bare string fallback
            "backend = \"auto\"".to_owned(), // quoted TOML string
        ])?;
        assert_eq!(config.timeout, Some(3));
        assert_eq!(config.force_gpt, Some(true));
        assert_eq!(config.esp.as_deref(), Some("/dev/sda1"));
        assert_eq!(config.backend.as_deref(), Some("auto"));
        assert_eq!(config.entries.len(), 2); // entries survive the merge
        config.validate()
    }

    #[test]
    fn test_override_without_equals_rejected() -> Result<(), ConfigError> {
        let mut config = Config::from_toml(FULL_CONFIG)?;
        assert!(matches!(
            config.apply_overrides(&["timeout".to_owned()]),
            Err(ConfigError::Override(text)) if text == "timeout"
        ));
        Ok(())
    }

    #[test]
    fn test_override_with_wrong_type_rejected() -> Result<(), ConfigError> {
        let mut config = Config::from_toml(FULL_CONFIG)?;
        assert!(matches!(
            config.apply_overrides(&["timeout=soon".to_owned()]),
            Err(ConfigError::Toml(_))
        ));
        Ok(())
    }

    #[test]
    fn test_unknown_entry_field_rejected() {
        let result = Config::from_toml(
            r#"
            [[BootEntry]]
            label = "Linux"
            loader = "/vmlinuz"
            looader = "/typo"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }
}
