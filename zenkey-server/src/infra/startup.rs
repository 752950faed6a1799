use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zenkey_config::Config;
use zenkey_core::{
    AccountError, AccountStore, ContainerScanRunner, Role, ScanRunner,
};

use crate::infra::{
    app_state::AppState,
    auth::SessionRegistry,
    scan::{ScanService, ServiceSettings},
    websocket::ConnectionManager,
};

/// Shared state plus the service actor's task.
#[derive(Debug)]
pub struct ServerRuntime {
    pub state: AppState,
    pub service: JoinHandle<()>,
}

pub fn container_runner(config: &Config) -> ContainerScanRunner {
    ContainerScanRunner::new(
        config.scanner.container_runtime.clone(),
        config.scanner.image.clone(),
        config.scanner.timeout,
        config.scanner.report_file.clone(),
    )
    .with_mount_suffix(config.scanner.mount_suffix.clone())
}

/// Spawns the scan service and assembles the state shared by every handler.
pub fn build_runtime(
    config: Config,
    runner: Arc<dyn ScanRunner>,
    accounts: Arc<dyn AccountStore>,
    shutdown: CancellationToken,
) -> ServerRuntime {
    let websocket_manager = Arc::new(ConnectionManager::new());
    let (scan_service, service) = ScanService::spawn(
        ServiceSettings::from(&config),
        runner,
        Arc::clone(&websocket_manager),
        shutdown.clone(),
    );

    ServerRuntime {
        state: AppState {
            config: Arc::new(config),
            websocket_manager,
            scan_service,
            accounts,
            sessions: Arc::new(SessionRegistry::new()),
            shutdown,
        },
        service,
    }
}

/// Creates the configured operator account if it does not exist yet.
pub async fn seed_bootstrap_account(state: &AppState) -> Result<()> {
    let Some((identity, secret)) = state.config.auth.bootstrap_account() else {
        return Ok(());
    };

    match state
        .accounts
        .create_account(identity, secret, Role::Admin)
        .await
    {
        Ok(account) => {
            info!(identity = %account.identity, "bootstrap operator account created");
            Ok(())
        }
        Err(AccountError::Conflict(identity)) => {
            warn!(%identity, "bootstrap operator account already exists");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
