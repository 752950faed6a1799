use std::{
    collections::VecDeque,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use axum_test::TestServer;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zenkey_config::Config;
use zenkey_core::{InMemoryAccountStore, ScanArtifact, ScanError, ServerEvent};
use zenkey_server::{
    create_app,
    infra::{
        app_state::AppState,
        scan::ServiceSettings,
        startup::{ServerRuntime, build_runtime, seed_bootstrap_account},
        websocket::Connection,
    },
};

/// Scan runner that waits `delay` (virtual time under a paused clock) and
/// then returns the next scripted outcome, or a missing report once the
/// script runs out.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    delay: Duration,
    outcomes: Mutex<VecDeque<Result<ScanArtifact, ScanError>>>,
    targets: Mutex<Vec<PathBuf>>,
}

#[allow(unused)]
impl ScriptedRunner {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn then(self, outcome: Result<ScanArtifact, ScanError>) -> Self {
        self.outcomes.lock().unwrap().push_back(outcome);
        self
    }

    pub fn targets(&self) -> Vec<PathBuf> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl zenkey_core::ScanRunner for ScriptedRunner {
    async fn run(&self, target: &Path) -> Result<ScanArtifact, ScanError> {
        self.targets.lock().unwrap().push(target.to_path_buf());
        tokio::time::sleep(self.delay).await;
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ScanArtifact::Missing))
    }
}

#[allow(unused)]
pub fn settings(mount: &Path) -> ServiceSettings {
    ServiceSettings {
        mount_path: mount.to_path_buf(),
        poll_interval: Duration::from_millis(500),
        progress_interval: Duration::from_secs(1),
        progress_step: 5,
        progress_cap: 90,
    }
}

/// A mount directory with one file in it, which the presence probe reports
/// as an inserted device.
#[allow(unused)]
pub fn populated_mount() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("photo.jpg"), b"jpeg").unwrap();
    dir
}

#[allow(unused)]
pub fn client(
    identity: Option<&str>,
) -> (Arc<Connection>, mpsc::Receiver<ServerEvent>) {
    let (tx, rx) = mpsc::channel(512);
    (Arc::new(Connection::new(identity.map(str::to_string), tx)), rx)
}

/// Next event for a client, failing the test after a minute of (virtual)
/// silence.
#[allow(unused)]
pub async fn next_event(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Events for a client up to and including the first `scan_result`.
#[allow(unused)]
pub async fn events_until_result(
    rx: &mut mpsc::Receiver<ServerEvent>,
) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = matches!(event, ServerEvent::ScanResult { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

// Code is used by test modules, but not in this scope
#[allow(unused)]
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub shutdown: CancellationToken,
    pub mount: TempDir,
}

#[allow(unused)]
impl TestApp {
    pub fn base_config(mount: &Path) -> Config {
        let mut config = Config::default();
        config.device.mount_path = mount.to_path_buf();
        config.device.poll_interval = Duration::from_millis(20);
        config.scanner.progress_interval = Duration::from_millis(20);
        config
    }
}

/// Full router on a real listener so WebSocket upgrades work. The mount
/// directory starts empty.
#[allow(unused)]
pub async fn build_test_app(
    configure: impl FnOnce(&mut Config),
) -> Result<TestApp> {
    let mount = tempfile::tempdir()?;
    let mut config = TestApp::base_config(mount.path());
    configure(&mut config);

    let shutdown = CancellationToken::new();
    let ServerRuntime { state, .. } = build_runtime(
        config,
        Arc::new(ScriptedRunner::default()),
        Arc::new(InMemoryAccountStore::new()),
        shutdown.clone(),
    );
    seed_bootstrap_account(&state).await?;

    let make_service = create_app(state.clone())
        .into_make_service_with_connect_info::<SocketAddr>();
    let server = TestServer::builder()
        .http_transport()
        .build(make_service)
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;

    Ok(TestApp {
        server,
        state,
        shutdown,
        mount,
    })
}
