//! Realtime wire messages.
//!
//! Every frame is a JSON object whose `event` field names the message, with
//! the payload fields alongside it:
//!
//! ```json
//! {"event":"usb_status","state":"inserted","path":"/mnt/usb"}
//! {"event":"analyze"}
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    presence::{DevicePresence, PresenceTransition, UsbState},
    report::ThreatRecord,
    session::{ScanSession, ScanStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanResultStatus {
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfectedSummary {
    pub infected_count: u64,
    pub infected_files: Vec<ThreatRecord>,
}

/// Server -> client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Status {
        msg: String,
    },
    UsbStatus {
        state: UsbState,
        path: Option<String>,
    },
    UsbInserted {
        path: String,
    },
    UsbRemoved {},
    ScanProgress {
        progress: u8,
    },
    ScanResult {
        status: ScanResultStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        report: Option<String>,
        #[serde(
            rename = "infectedSummary",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        infected_summary: Option<InfectedSummary>,
    },
    FormatProgress {
        progress: u8,
    },
    FormatComplete {
        success: bool,
    },
    Pong {
        timestamp: i64,
    },
}

impl ServerEvent {
    pub fn status(msg: impl Into<String>) -> Self {
        ServerEvent::Status { msg: msg.into() }
    }

    pub fn usb_status(presence: &DevicePresence) -> Self {
        ServerEvent::UsbStatus {
            state: presence.state(),
            path: presence
                .path
                .as_ref()
                .map(|path| path.display().to_string()),
        }
    }

    pub fn from_transition(transition: &PresenceTransition) -> Self {
        match transition {
            PresenceTransition::Inserted { path } => ServerEvent::UsbInserted {
                path: path.display().to_string(),
            },
            PresenceTransition::Removed => ServerEvent::UsbRemoved {},
        }
    }

    /// Synchronous negative acknowledgement for a refused request.
    pub fn scan_rejected(reason: impl Into<String>) -> Self {
        ServerEvent::ScanResult {
            status: ScanResultStatus::Error,
            report: Some(reason.into()),
            infected_summary: None,
        }
    }

    /// Terminal result for a finished session. `report` is the raw report
    /// text (or sentinel) on success and ignored on failure.
    pub fn scan_finished(session: &ScanSession, report: Option<String>) -> Self {
        match session.status() {
            ScanStatus::Error => ServerEvent::ScanResult {
                status: ScanResultStatus::Error,
                report: session.error_message().map(str::to_string),
                infected_summary: None,
            },
            _ => ServerEvent::ScanResult {
                status: ScanResultStatus::Done,
                report,
                infected_summary: Some(InfectedSummary {
                    infected_count: session.infected_count(),
                    infected_files: session.infected_files().to_vec(),
                }),
            },
        }
    }
}

/// Client -> server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientCommand {
    UsbCheck,
    Analyze,
    Format,
    Ping { timestamp: i64 },
}
