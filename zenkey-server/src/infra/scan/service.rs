use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zenkey_core::{
    PresenceTracker, ScanArtifact, ScanError, ScanReport, ScanRunner,
    ScanSession, ServerEvent, session::PROGRESS_COMPLETE,
};

use super::{ScanServiceHandle, ServiceCommand, ServiceSettings, ServiceSnapshot};
use crate::infra::websocket::{Connection, ConnectionManager};

pub const WELCOME_MESSAGE: &str = "Connected to the ZenKey scan station";
pub const SCAN_STARTED_MESSAGE: &str = "Scan in progress...";

const COMMAND_BUFFER: usize = 256;

/// `interval` panics on a zero period.
const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct ScanCompletion {
    generation: u64,
    outcome: Result<ScanArtifact, ScanError>,
}

#[derive(Debug)]
pub struct ScanService {
    settings: ServiceSettings,
    tracker: PresenceTracker,
    session: ScanSession,
    runner: Arc<dyn ScanRunner>,
    connections: Arc<ConnectionManager>,
    commands: mpsc::Receiver<ServiceCommand>,
    completions_tx: mpsc::Sender<ScanCompletion>,
    completions: mpsc::Receiver<ScanCompletion>,
    /// Present only while a scan is running and below the progress cap.
    ticker: Option<Interval>,
    shutdown: CancellationToken,
}

impl ScanService {
    /// Starts the actor on the current runtime. It runs until `shutdown` is
    /// cancelled.
    pub fn spawn(
        settings: ServiceSettings,
        runner: Arc<dyn ScanRunner>,
        connections: Arc<ConnectionManager>,
        shutdown: CancellationToken,
    ) -> (ScanServiceHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions) = mpsc::channel(4);

        let service = Self {
            tracker: PresenceTracker::new(settings.mount_path.clone()),
            settings,
            session: ScanSession::new(),
            runner,
            connections,
            commands,
            completions_tx,
            completions,
            ticker: None,
            shutdown,
        };

        let handle = tokio::spawn(service.run());
        (ScanServiceHandle::new(commands_tx), handle)
    }

    async fn run(mut self) {
        let mut poll =
            time::interval(self.settings.poll_interval.max(MIN_TIMER_PERIOD));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            target: "usb::presence",
            mount_path = %self.tracker.mount_path().display(),
            interval = ?self.settings.poll_interval,
            "presence monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                Some(completion) = self.completions.recv() => {
                    self.finish_scan(completion);
                }

                Some(command) = self.commands.recv() => {
                    self.handle_command(command);
                }

                _ = poll.tick() => self.poll_presence(),

                _ = next_tick(&mut self.ticker) => self.advance_progress(),
            }
        }

        self.ticker = None;
        if self.session.is_scanning() {
            warn!(
                target: "scan::session",
                generation = self.session.generation(),
                "shutting down with a scan in flight; abandoning it"
            );
        }
        info!(target: "usb::presence", "presence monitor stopped");
    }

    fn handle_command(&mut self, command: ServiceCommand) {
        match command {
            ServiceCommand::Attach { connection } => self.attach(connection),
            ServiceCommand::UsbCheck { conn_id } => {
                self.connections.send_to(
                    conn_id,
                    ServerEvent::usb_status(&self.tracker.current()),
                );
            }
            ServiceCommand::Analyze {
                conn_id,
                authenticated,
            } => self.start_scan(conn_id, authenticated),
            ServiceCommand::Snapshot { reply } => {
                let _ = reply.send(ServiceSnapshot {
                    device: self.tracker.current(),
                    scan: self.session.clone(),
                });
            }
        }
    }

    fn attach(&mut self, connection: Arc<Connection>) {
        connection.send_event(ServerEvent::status(WELCOME_MESSAGE));
        connection.send_event(ServerEvent::usb_status(&self.tracker.current()));
        debug!(conn_id = %connection.id, "connection attached");
        self.connections.add_connection(connection);
    }

    fn poll_presence(&mut self) {
        let Some(transition) = self.tracker.poll() else {
            return;
        };

        info!(
            target: "usb::presence",
            ?transition,
            "device presence changed"
        );
        self.connections
            .broadcast(ServerEvent::from_transition(&transition));
    }

    fn start_scan(&mut self, conn_id: uuid::Uuid, authenticated: bool) {
        let presence = self.tracker.current();
        let generation = match self.session.begin(authenticated, &presence) {
            Ok(generation) => generation,
            Err(rejection) => {
                info!(
                    target: "scan::session",
                    %conn_id,
                    reason = %rejection,
                    "scan request rejected"
                );
                self.connections
                    .send_to(conn_id, ServerEvent::scan_rejected(rejection.to_string()));
                return;
            }
        };

        info!(
            target: "scan::session",
            %conn_id,
            generation,
            device = %self.tracker.mount_path().display(),
            "scan started"
        );
        self.connections
            .broadcast(ServerEvent::status(SCAN_STARTED_MESSAGE));
        self.connections.broadcast(ServerEvent::ScanProgress {
            progress: self.session.progress(),
        });

        let period = self.settings.progress_interval.max(MIN_TIMER_PERIOD);
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);

        let runner = Arc::clone(&self.runner);
        let target = self.tracker.mount_path().to_path_buf();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = runner.run(&target).await;
            // The actor may already be gone on shutdown.
            let _ = completions
                .send(ScanCompletion {
                    generation,
                    outcome,
                })
                .await;
        });
    }

    fn advance_progress(&mut self) {
        match self
            .session
            .advance(self.settings.progress_step, self.settings.progress_cap)
        {
            Some(progress) => {
                debug!(target: "scan::session", progress, "synthetic progress");
                self.connections
                    .broadcast(ServerEvent::ScanProgress { progress });
            }
            None => {
                debug!(target: "scan::session", "progress cap reached; ticker stopped");
                self.ticker = None;
            }
        }
    }

    fn finish_scan(&mut self, completion: ScanCompletion) {
        let ScanCompletion {
            generation,
            outcome,
        } = completion;

        if generation != self.session.generation() || !self.session.is_scanning() {
            debug!(
                target: "scan::session",
                generation,
                current = self.session.generation(),
                "ignoring stale scan completion"
            );
            return;
        }

        self.ticker = None;

        let report_text = match outcome {
            Ok(artifact) => {
                let text = artifact.text().to_string();
                let report = ScanReport::parse(&text);
                self.session.complete(generation, report);
                info!(
                    target: "scan::session",
                    generation,
                    status = ?self.session.status(),
                    infected_count = self.session.infected_count(),
                    records = self.session.infected_files().len(),
                    report_present = matches!(artifact, ScanArtifact::Report(_)),
                    "scan finished"
                );
                Some(text)
            }
            Err(err) => {
                let diagnostic = err.diagnostic();
                warn!(
                    target: "scan::session",
                    generation,
                    error = %err,
                    timeout = err.is_timeout(),
                    "scan failed"
                );
                self.session.fail(generation, diagnostic);
                None
            }
        };

        self.connections.broadcast(ServerEvent::ScanProgress {
            progress: PROGRESS_COMPLETE,
        });
        self.connections
            .broadcast(ServerEvent::scan_finished(&self.session, report_text));
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
