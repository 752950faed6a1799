use std::{fmt, sync::Arc};

use tokio_util::sync::CancellationToken;
use zenkey_config::Config;
use zenkey_core::AccountStore;

use crate::infra::{
    auth::SessionRegistry, scan::ScanServiceHandle,
    websocket::ConnectionManager,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub websocket_manager: Arc<ConnectionManager>,
    pub scan_service: ScanServiceHandle,
    pub accounts: Arc<dyn AccountStore>,
    pub sessions: Arc<SessionRegistry>,
    /// Cancelled once on process shutdown; open sockets close on it.
    pub shutdown: CancellationToken,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("websocket_manager", &self.websocket_manager)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn config(&self) -> &Config {
        &self.config
    }
}
