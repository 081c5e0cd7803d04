// SPDX-FileCopyrightText: 2026 efiboot-rs contributors
// SPDX-License-Identifier: MIT

//! The `efibootmgr` backend.
//!
//! This backend delegates to the [`efibootmgr`](https://github.com/rhboot/efibootmgr)
//! CLI. Every invocation of `efibootmgr` prints the full variable state on
//! stdout, which this module parses back into a [`Snapshot`]; the snapshot
//! from the latest invocation is kept so that mutations which need context
//! (identifying a created id, repairing the order after an update) do not
//! re-read the store.
//!
//! `efibootmgr`'s plain listing does not include loader paths or parameters,
//! so observed entries from this backend carry unknown content and the
//! engine rewrites matched entries rather than assuming them equal.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use duct::cmd;
use log::{debug, warn};
use regex::Regex;

use crate::backend::{Backend, BackendError};
use crate::config::{BootEntry, Config};
use crate::state::{BootId, ObservedEntry, Snapshot};

/// The program this backend wraps.
const EFIBOOTMGR: &str = "efibootmgr";

/// Matches a `BootXXXX* Label` listing line; the tab-separated device path
/// tail, if present, is ignored.
static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Boot([0-9a-fA-F]{4})([* ]) (.+?)(?:\t.*)?$").expect("entry regex is valid")
});

/// Matches the `BootCurrent:` line.
static CURRENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^BootCurrent: ([0-9a-fA-F]{4})$").expect("bootcurrent regex is valid")
});

/// Matches the `BootNext:` line.
static NEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^BootNext: ([0-9a-fA-F]{4})$").expect("bootnext regex is valid"));

/// Matches the `BootOrder:` line, including an empty order.
static ORDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^BootOrder:\s*((?:[0-9a-fA-F]{4},?)*)$").expect("bootorder regex is valid")
});

/// Matches the `Timeout:` line.
static TIMEOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Timeout: ([0-9]+) seconds$").expect("timeout regex is valid"));

/// Matches one line of `mount` output on Linux and the BSDs, where the
/// ` type fstype` part only appears on Linux.
static MOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+) on (.+?)(?: type \S+)? \(.+\)$").expect("mount regex is valid")
});

/// A [`Backend`] that shells out to the `efibootmgr` CLI.
pub struct EfibootmgrBackend {
    /// The disk holding the EFI system partition, e.g. `/dev/sda`.
    disk: String,

    /// The partition number of the EFI system partition.
    partition: u32,

    /// The EDD version to pass (1 or 3), if configured.
    edd: Option<i64>,

    /// The EDD 1.0 device number, usually 0x80.
    edd_device: u32,

    /// Treat disks with an invalid PMBR as GPT.
    force_gpt: bool,

    /// The state printed by the most recent invocation.
    last: Option<Snapshot>,
}

impl EfibootmgrBackend {
    /// Builds the backend from the config, autodetecting the EFI system
    /// partition when the config does not pin one.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the partition device cannot be determined
    /// or split into a disk and partition number.
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let esp = match &config.esp {
            Some(esp) => esp.clone(),
            None => find_esp()?,
        };
        let (disk, partition) = split_partition(&esp)?;

        Ok(Self {
            disk,
            partition,
            edd: config.edd,
            edd_device: config.edd_device.unwrap_or(0x80),
            force_gpt: config.force_gpt.unwrap_or(false),
            last: None,
        })
    }

    /// Whether this backend can run on the host at all.
    #[must_use = "Has no effect if the result is unused"]
    pub fn is_compatible_with_host() -> bool {
        if which::which(EFIBOOTMGR).is_err() {
            warn!("the efibootmgr backend requires the efibootmgr CLI");
            return false;
        }
        true
    }

    /// Returns the latest known state, reading the store if none is cached.
    fn ensure_state(&mut self) -> Result<Snapshot, BackendError> {
        if let Some(state) = &self.last {
            return Ok(state.clone());
        }
        self.run(&[])
    }

    /// Runs `efibootmgr` with the given arguments plus the standing
    /// disk/partition/EDD/GPT flags, and parses the state it prints.
    fn run(&mut self, args: &[&str]) -> Result<Snapshot, BackendError> {
        let partition = self.partition.to_string();
        let mut argv: Vec<&str> = args.to_vec();
        argv.extend(["--disk", &self.disk, "--part", &partition]);

        let edd;
        if let Some(version) = self.edd {
            edd = version.to_string();
            argv.extend(["--edd", &edd]);
        }
        let device;
        if self.edd == Some(1) {
            device = format!("{:#x}", self.edd_device);
            argv.extend(["--device", &device]);
        }
        if self.force_gpt {
            argv.push("--gpt");
        }

        debug!("call: {EFIBOOTMGR} {}", argv.join(" "));
        let output = cmd(EFIBOOTMGR, argv)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::Unavailable(format!("{EFIBOOTMGR} is not on PATH"))
                } else {
                    BackendError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(BackendError::Command {
                program: EFIBOOTMGR,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let state = parse_state(&String::from_utf8_lossy(&output.stdout))?;
        self.last = Some(state.clone());
        Ok(state)
    }

    /// Fails with `NotFound` unless the store knows the id.
    fn require_entry(&mut self, id: BootId) -> Result<Snapshot, BackendError> {
        let state = self.ensure_state()?;
        if state.entry(id).is_none() {
            return Err(BackendError::NotFound(id));
        }
        Ok(state)
    }
}

impl Backend for EfibootmgrBackend {
    fn read(&mut self) -> Result<Snapshot, BackendError> {
        self.run(&[])
    }

    fn create(&mut self, entry: &BootEntry) -> Result<BootId, BackendError> {
        let before: HashSet<BootId> = self
            .ensure_state()?
            .entries
            .iter()
            .map(|obs| obs.id)
            .collect();

        let loader = to_efi_path(&entry.loader);
        let cmdline = entry.params.join(" ");
        let state = self.run(&[
            "--create",
            "--label",
            &entry.label,
            "--loader",
            &loader,
            "--unicode",
            &cmdline,
        ])?;

        // efibootmgr does not print which id it assigned, so diff the id
        // sets before and after.
        let mut created: Vec<&ObservedEntry> = state
            .entries
            .iter()
            .filter(|obs| !before.contains(&obs.id))
            .collect();
        if created.len() > 1 {
            created.retain(|obs| obs.label == entry.label);
        }
        created
            .first()
            .map(|obs| obs.id)
            .ok_or_else(|| BackendError::Command {
                program: EFIBOOTMGR,
                detail: format!("created entry \"{}\" could not be identified", entry.label),
            })
    }

    fn update(&mut self, id: BootId, entry: &BootEntry) -> Result<BootId, BackendError> {
        // efibootmgr has no in-place rewrite; delete and recreate, then put
        // the new id where the old one sat in the order. If the old id was
        // not in the order, restoring the old order also evicts the spot
        // efibootmgr gave the new entry.
        let old_order = self.require_entry(id)?.order;
        self.run(&["--bootnum", &hex(id), "--delete-bootnum"])?;
        let new_id = self.create(entry)?;

        if !old_order.is_empty() {
            let restored: Vec<BootId> = old_order
                .iter()
                .map(|&o| if o == id { new_id } else { o })
                .collect();
            self.reorder(&restored)?;
        }
        Ok(new_id)
    }

    fn delete(&mut self, id: BootId) -> Result<(), BackendError> {
        self.require_entry(id)?;
        self.run(&["--bootnum", &hex(id), "--delete-bootnum"])?;
        Ok(())
    }

    fn reorder(&mut self, order: &[BootId]) -> Result<(), BackendError> {
        if order.is_empty() {
            self.run(&["--delete-bootorder"])?;
            return Ok(());
        }
        let csv = order.iter().map(|&id| hex(id)).collect::<Vec<_>>().join(",");
        self.run(&["--bootorder", &csv])?;
        Ok(())
    }

    fn set_default(&mut self, id: BootId) -> Result<(), BackendError> {
        // The default entry is the head of BootOrder; rotate the id there.
        let state = self.require_entry(id)?;
        if state.default_entry() == Some(id) {
            return Ok(());
        }
        let mut order = vec![id];
        order.extend(state.order.iter().copied().filter(|&o| o != id));
        self.reorder(&order)
    }

    fn set_next_boot(&mut self, id: Option<BootId>) -> Result<(), BackendError> {
        match id {
            Some(id) => {
                self.require_entry(id)?;
                self.run(&["--bootnext", &hex(id)])?;
            }
            None => {
                self.run(&["--delete-bootnext"])?;
            }
        }
        Ok(())
    }

    fn set_timeout(&mut self, seconds: Option<u16>) -> Result<(), BackendError> {
        match seconds {
            Some(seconds) => {
                self.run(&["--timeout", &seconds.to_string()])?;
            }
            None => {
                self.run(&["--delete-timeout"])?;
            }
        }
        Ok(())
    }
}

/// Formats a boot number the way `efibootmgr` wants it: 4 hex digits,
/// no prefix.
fn hex(id: BootId) -> String {
    format!("{:04X}", id.0)
}

/// Converts a Unix-style loader path to an EFI-style one.
fn to_efi_path(path: &str) -> String {
    path.replace('/', "\\")
}

/// Parses a 4-digit hex boot number out of a regex capture.
fn parse_bootnum(digits: &str, line: &str) -> Result<BootId, BackendError> {
    u16::from_str_radix(digits, 16)
        .map(BootId)
        .map_err(|_| BackendError::Parse(format!("bad boot number in \"{line}\"")))
}

/// Parses the state `efibootmgr` prints on stdout.
///
/// # Errors
///
/// May return an `Error` on any line that does not match the known grammar.
fn parse_state(text: &str) -> Result<Snapshot, BackendError> {
    let mut state = Snapshot::default();

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if let Some(c) = CURRENT_RE.captures(line) {
            state.current = Some(parse_bootnum(&c[1], line)?);
        } else if let Some(c) = NEXT_RE.captures(line) {
            state.next_boot = Some(parse_bootnum(&c[1], line)?);
        } else if let Some(c) = ORDER_RE.captures(line) {
            for digits in c[1].split(',').filter(|part| !part.is_empty()) {
                state.order.push(parse_bootnum(digits, line)?);
            }
        } else if let Some(c) = TIMEOUT_RE.captures(line) {
            let seconds = c[1]
                .parse()
                .map_err(|_| BackendError::Parse(format!("bad timeout in \"{line}\"")))?;
            state.timeout = Some(seconds);
        } else if let Some(c) = ENTRY_RE.captures(line) {
            state.entries.push(ObservedEntry {
                id: parse_bootnum(&c[1], line)?,
                label: c[3].to_owned(),
                loader: None,
                params: None,
                active: &c[2] == "*",
            });
        } else {
            return Err(BackendError::Parse(format!(
                "failed to parse {EFIBOOTMGR}: \"{line}\""
            )));
        }
    }

    Ok(state)
}

/// Finds the partition device assumed to be the EFI system partition.
///
/// Checks the mount table for the paths that hold ESPs on the common
/// operating systems, and defaults to `/dev/sda1` when nothing is mounted
/// at any of them.
fn find_esp() -> Result<String, BackendError> {
    let output = cmd("mount", Vec::<String>::new())
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()?;
    let mounts = parse_mounts(&String::from_utf8_lossy(&output.stdout));

    for point in ["/efi", "/boot/efi", "/boot"] {
        if let Some(device) = mounts.get(point) {
            return Ok(device.clone());
        }
    }
    Ok("/dev/sda1".to_owned())
}

/// Parses `mount` output into a map from mount point to device, keeping
/// only real devices (paths starting with `/`).
fn parse_mounts(text: &str) -> HashMap<String, String> {
    let mut mounts = HashMap::new();
    for line in text.lines() {
        if let Some(c) = MOUNT_RE.captures(line) {
            let device = &c[1];
            if device.starts_with('/') {
                mounts.insert(c[2].to_owned(), device.to_owned());
            }
        }
    }
    mounts
}

/// Splits a partition device path into its parent disk and partition
/// number, e.g. `/dev/sda1` into `/dev/sda` + 1 and `/dev/nvme0n1p2` into
/// `/dev/nvme0n1` + 2.
fn split_partition(device: &str) -> Result<(String, u32), BackendError> {
    let digits_at = device.trim_end_matches(|ch: char| ch.is_ascii_digit()).len();
    let (mut disk, digits) = device.split_at(digits_at);
    if digits.is_empty() {
        return Err(BackendError::Unavailable(format!(
            "cannot derive a disk and partition number from \"{device}\""
        )));
    }

    // nvme and mmcblk devices separate the partition number with a "p".
    if let Some(prefix) = disk.strip_suffix('p')
        && prefix.ends_with(|ch: char| ch.is_ascii_digit())
    {
        disk = prefix;
    }

    let partition = digits.parse().map_err(|_| {
        BackendError::Unavailable(format!("partition number out of range in \"{device}\""))
    })?;
    Ok((disk.to_owned(), partition))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "BootCurrent: 0001\n\
        BootNext: 0003\n\
        BootOrder: 0003,0001,0002\n\
        Timeout: 5 seconds\n\
        Boot0001* Arch Linux\n\
        Boot0002  Fallback\tHD(1,GPT,8be4df61)/File(\\vmlinuz-linux)\n\
        Boot0003* Windows Boot Manager\n";

    #[test]
    fn test_parse_full_listing() -> Result<(), BackendError> {
        let state = parse_state(LISTING)?;
        assert_eq!(state.current, Some(BootId(1)));
        assert_eq!(state.next_boot, Some(BootId(3)));
        assert_eq!(state.order, vec![BootId(3), BootId(1), BootId(2)]);
        assert_eq!(state.timeout, Some(5));
        assert_eq!(state.default_entry(), Some(BootId(3)));

        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.entries[0].label, "Arch Linux");
        assert!(state.entries[0].active);
        assert_eq!(state.entries[1].label, "Fallback"); // device path tail dropped
        assert!(!state.entries[1].active);
        assert_eq!(state.entries[2].label, "Windows Boot Manager");
        assert!(state.entries[0].loader.is_none()); // content is never reported
        state.validate().map_err(|e| BackendError::Parse(e.to_string()))
    }

    #[test]
    fn test_parse_minimal_listing() -> Result<(), BackendError> {
        // A store with no entries at all still prints a timeout.
        let state = parse_state("Timeout: 1 seconds\nBootOrder:\n")?;
        assert_eq!(state.timeout, Some(1));
        assert!(state.order.is_empty());
        assert!(state.entries.is_empty());
        assert_eq!(state.default_entry(), None);
        Ok(())
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_state("NotAThing: 42\n"),
            Err(BackendError::Parse(_))
        ));
        assert!(matches!(
            parse_state("BootCurrent: xyzw\n"),
            Err(BackendError::Parse(_))
        ));
    }

    #[test]
    fn test_hex_and_efi_path() {
        assert_eq!(hex(BootId(0xB)), "000B");
        assert_eq!(to_efi_path("/EFI/arch/grubx64.efi"), "\\EFI\\arch\\grubx64.efi");
        assert_eq!(to_efi_path("\\already\\efi"), "\\already\\efi");
    }

    #[test]
    fn test_split_partition() -> Result<(), BackendError> {
        assert_eq!(split_partition("/dev/sda1")?, ("/dev/sda".to_owned(), 1));
        assert_eq!(split_partition("/dev/vdb12")?, ("/dev/vdb".to_owned(), 12));
        assert_eq!(
            split_partition("/dev/nvme0n1p2")?,
            ("/dev/nvme0n1".to_owned(), 2)
        );
        assert_eq!(
            split_partition("/dev/mmcblk0p1")?,
            ("/dev/mmcblk0".to_owned(), 1)
        );
        assert!(split_partition("/dev/sda").is_err());
        Ok(())
    }

    #[test]
    fn test_parse_mounts() {
        let text = "proc on /proc type proc (rw,nosuid)\n\
            /dev/nvme0n1p2 on / type ext4 (rw,relatime)\n\
            /dev/nvme0n1p1 on /boot type vfat (rw,relatime)\n\
            /dev/disk2s1 on /Volumes/USB (hfs, local, nodev)\n";
        let mounts = parse_mounts(text);
        assert_eq!(mounts.get("/"), Some(&"/dev/nvme0n1p2".to_owned()));
        assert_eq!(mounts.get("/boot"), Some(&"/dev/nvme0n1p1".to_owned()));
        assert_eq!(mounts.get("/Volumes/USB"), Some(&"/dev/disk2s1".to_owned()));
        assert!(!mounts.contains_key("/proc")); // proc is not a device
    }
}
