//! The scan station's single state owner.
//!
//! [`ScanService`] is an actor: it owns the presence tracker, the scan
//! session and the progress ticker, and processes poll ticks, progress ticks,
//! client commands and subprocess completions one at a time. Everything else
//! talks to it through a cloneable [`ScanServiceHandle`].

pub mod format;
pub mod service;

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use zenkey_config::Config;
use zenkey_core::{DevicePresence, ScanSession};

use crate::infra::websocket::Connection;

pub use service::ScanService;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub mount_path: PathBuf,
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    pub progress_step: u8,
    pub progress_cap: u8,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            mount_path: config.device.mount_path.clone(),
            poll_interval: config.device.poll_interval,
            progress_interval: config.scanner.progress_interval,
            progress_step: config.scanner.progress_step,
            progress_cap: config.scanner.progress_cap,
        }
    }
}

/// Read-only view of the shared state.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub device: DevicePresence,
    pub scan: ScanSession,
}

#[derive(Debug)]
pub(crate) enum ServiceCommand {
    /// Greet a new connection and add it to the broadcast set.
    Attach { connection: Arc<Connection> },
    /// Answered on the requester's queue so it stays ordered with broadcasts.
    UsbCheck { conn_id: Uuid },
    Analyze { conn_id: Uuid, authenticated: bool },
    Snapshot {
        reply: oneshot::Sender<ServiceSnapshot>,
    },
}

#[derive(Debug, Error)]
#[error("scan service is not running")]
pub struct ServiceUnavailable;

#[derive(Debug, Clone)]
pub struct ScanServiceHandle {
    commands: mpsc::Sender<ServiceCommand>,
}

impl ScanServiceHandle {
    pub(crate) fn new(commands: mpsc::Sender<ServiceCommand>) -> Self {
        Self { commands }
    }

    pub async fn attach(
        &self,
        connection: Arc<Connection>,
    ) -> Result<(), ServiceUnavailable> {
        self.send(ServiceCommand::Attach { connection }).await
    }

    /// Queues a `usb_status` with the presence last computed by the poll
    /// loop to `conn_id`.
    pub async fn usb_check(&self, conn_id: Uuid) -> Result<(), ServiceUnavailable> {
        self.send(ServiceCommand::UsbCheck { conn_id }).await
    }

    /// Fire-and-forget; the outcome reaches the requester (rejection) or
    /// every client (accepted scan) through the broadcast layer.
    pub async fn request_scan(
        &self,
        conn_id: Uuid,
        authenticated: bool,
    ) -> Result<(), ServiceUnavailable> {
        self.send(ServiceCommand::Analyze {
            conn_id,
            authenticated,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<ServiceSnapshot, ServiceUnavailable> {
        let (reply, rx) = oneshot::channel();
        self.send(ServiceCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| ServiceUnavailable)
    }

    async fn send(&self, command: ServiceCommand) -> Result<(), ServiceUnavailable> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServiceUnavailable)
    }
}
