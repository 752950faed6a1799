//! Scan session state machine.
//!
//! `Idle -> Scanning -> {Clean, Threat, Error}`, re-entrant from any state
//! except `Scanning`. The session is plain data: the server's service actor
//! owns the only instance and is the only caller of the mutating methods, so
//! there is no locking here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{presence::DevicePresence, report::ScanReport, report::ThreatRecord};

pub const PROGRESS_COMPLETE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Idle,
    Scanning,
    Clean,
    Threat,
    Error,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Clean | ScanStatus::Threat | ScanStatus::Error)
    }
}

/// Why a scan request was refused. Rejections never touch the session.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRejection {
    #[error("Authentication required to start a scan.")]
    Unauthenticated,
    #[error("A scan is already in progress.")]
    AlreadyScanning,
    #[error("No USB device detected or the device is empty.")]
    DeviceAbsent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    status: ScanStatus,
    progress: u8,
    infected_count: u64,
    infected_files: Vec<ThreatRecord>,
    error_message: Option<String>,
    #[serde(skip)]
    generation: u64,
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            status: ScanStatus::Idle,
            progress: 0,
            infected_count: 0,
            infected_files: Vec::new(),
            error_message: None,
            generation: 0,
        }
    }

    pub fn status(&self) -> ScanStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// The report's own counter, which may disagree with the number of
    /// parsed detection lines.
    pub fn infected_count(&self) -> u64 {
        self.infected_count
    }

    pub fn infected_files(&self) -> &[ThreatRecord] {
        &self.infected_files
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Identifies the current run; completions carrying another value are
    /// ignored.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_scanning(&self) -> bool {
        self.status == ScanStatus::Scanning
    }

    /// Entry guard plus `-> Scanning` transition. On success the previous
    /// run's results are cleared and the new generation is returned.
    pub fn begin(
        &mut self,
        authenticated: bool,
        presence: &DevicePresence,
    ) -> Result<u64, ScanRejection> {
        if !authenticated {
            return Err(ScanRejection::Unauthenticated);
        }
        if self.is_scanning() {
            return Err(ScanRejection::AlreadyScanning);
        }
        if !presence.mounted {
            return Err(ScanRejection::DeviceAbsent);
        }

        self.generation += 1;
        self.status = ScanStatus::Scanning;
        self.progress = 0;
        self.infected_count = 0;
        self.infected_files.clear();
        self.error_message = None;
        Ok(self.generation)
    }

    /// Synthetic progress tick. Returns the new value, or `None` once the cap
    /// is reached or the session is no longer scanning.
    pub fn advance(&mut self, step: u8, cap: u8) -> Option<u8> {
        if !self.is_scanning() {
            return None;
        }
        let cap = cap.min(PROGRESS_COMPLETE - 1);
        let next = self.progress.saturating_add(step).min(cap);
        if next <= self.progress {
            return None;
        }
        self.progress = next;
        Some(next)
    }

    /// Successful run. The infection counter alone picks `Clean` vs `Threat`;
    /// the detection list is stored as parsed.
    pub fn complete(&mut self, generation: u64, report: ScanReport) -> bool {
        if !self.accepts(generation) {
            return false;
        }
        self.status = if report.is_clean() {
            ScanStatus::Clean
        } else {
            ScanStatus::Threat
        };
        self.progress = PROGRESS_COMPLETE;
        self.infected_count = report.infected_count;
        self.infected_files = report.infected_files;
        self.error_message = None;
        true
    }

    /// Failed run (spawn error, timeout or non-zero exit).
    pub fn fail(&mut self, generation: u64, message: impl Into<String>) -> bool {
        if !self.accepts(generation) {
            return false;
        }
        self.status = ScanStatus::Error;
        self.progress = PROGRESS_COMPLETE;
        self.infected_count = 0;
        self.infected_files.clear();
        self.error_message = Some(message.into());
        true
    }

    fn accepts(&self, generation: u64) -> bool {
        self.is_scanning() && generation == self.generation
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}
