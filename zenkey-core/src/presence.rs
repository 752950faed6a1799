//! Removable device presence.
//!
//! The mount location is probed on every poll tick. A probe that fails for
//! any reason (missing directory, permission denied, I/O error on a yanked
//! device) counts as "not mounted"; [`is_mounted`] is the only place that
//! mapping happens. [`PresenceTracker`] turns the stream of probe results
//! into transitions so that repeated identical states produce no traffic.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsbState {
    Inserted,
    Removed,
}

/// Shared device state: written by the presence tracker, read by the
/// broadcast layer and the scan entry guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePresence {
    pub mounted: bool,
    pub path: Option<PathBuf>,
}

impl DevicePresence {
    pub fn absent() -> Self {
        Self {
            mounted: false,
            path: None,
        }
    }

    pub fn mounted_at(path: impl Into<PathBuf>) -> Self {
        Self {
            mounted: true,
            path: Some(path.into()),
        }
    }

    pub fn state(&self) -> UsbState {
        if self.mounted {
            UsbState::Inserted
        } else {
            UsbState::Removed
        }
    }
}

impl Default for DevicePresence {
    fn default() -> Self {
        Self::absent()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceTransition {
    Inserted { path: PathBuf },
    Removed,
}

/// Raw probe: the mount location exists and has at least one entry.
pub fn probe_mount(path: &Path) -> io::Result<bool> {
    let mut entries = fs::read_dir(path)?;
    Ok(entries.next().transpose()?.is_some())
}

/// Probe with the device-access policy applied: every error is "not mounted".
pub fn is_mounted(path: &Path) -> bool {
    match probe_mount(path) {
        Ok(mounted) => mounted,
        Err(err) => {
            trace!(
                target: "usb::presence",
                path = %path.display(),
                error = %err,
                "mount probe failed; treating device as absent"
            );
            false
        }
    }
}

/// Debounces probe results into transitions.
#[derive(Debug)]
pub struct PresenceTracker {
    mount_path: PathBuf,
    previous: bool,
}

impl PresenceTracker {
    /// Starts in the unmounted state, so a device that is already present at
    /// startup produces an `Inserted` transition on the first poll.
    pub fn new(mount_path: impl Into<PathBuf>) -> Self {
        Self {
            mount_path: mount_path.into(),
            previous: false,
        }
    }

    pub fn mount_path(&self) -> &Path {
        &self.mount_path
    }

    /// Probes the mount location and records the result.
    pub fn poll(&mut self) -> Option<PresenceTransition> {
        let mounted = is_mounted(&self.mount_path);
        self.observe(mounted)
    }

    /// Records an already computed state. Returns a transition only when it
    /// differs from the previous computed state.
    pub fn observe(&mut self, mounted: bool) -> Option<PresenceTransition> {
        if mounted == self.previous {
            return None;
        }
        self.previous = mounted;

        if mounted {
            Some(PresenceTransition::Inserted {
                path: self.mount_path.clone(),
            })
        } else {
            Some(PresenceTransition::Removed)
        }
    }

    pub fn current(&self) -> DevicePresence {
        if self.previous {
            DevicePresence::mounted_at(self.mount_path.clone())
        } else {
            DevicePresence::absent()
        }
    }
}
