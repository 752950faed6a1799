//! # ZenKey Core
//!
//! Domain library for the ZenKey scan station: a kiosk that notices when a
//! removable drive is plugged in, lets an authenticated operator run a
//! content scan against it, and streams progress and results to every
//! connected client.
//!
//! ## Architecture
//!
//! The crate holds everything that does not depend on the transport:
//!
//! - [`presence`]: probing the mount location and debouncing poll results
//!   into insert/remove transitions
//! - [`session`]: the single scan-session state machine
//! - [`supervisor`]: launching the containerised scan engine with a hard
//!   timeout and collecting its report artifact
//! - [`report`]: extracting threat records from raw scan report text
//! - [`protocol`]: the realtime wire messages exchanged with clients
//! - [`accounts`]: the account store collaborator used by the HTTP layer
//!
//! The server crate owns the event loop that ties these together; nothing in
//! here spawns long-lived tasks.

pub mod accounts;
pub mod error;
pub mod presence;
pub mod protocol;
pub mod report;
pub mod session;
pub mod supervisor;

pub use accounts::{
    Account, AccountStore, InMemoryAccountStore, Role, hash_secret,
    verify_secret,
};
pub use error::{AccountError, ScanError};
pub use presence::{DevicePresence, PresenceTracker, PresenceTransition, UsbState};
pub use protocol::{ClientCommand, InfectedSummary, ScanResultStatus, ServerEvent};
pub use report::{ScanReport, ThreatRecord};
pub use session::{ScanRejection, ScanSession, ScanStatus};
pub use supervisor::{
    CapturedOutput, ContainerScanRunner, NO_REPORT_SENTINEL, ScanArtifact,
    ScanRunner,
};
