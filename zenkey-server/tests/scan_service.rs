use std::{sync::Arc, time::Duration};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use zenkey_core::{
    NO_REPORT_SENTINEL, ScanArtifact, ScanError, ScanResultStatus, ScanStatus,
    ServerEvent, ThreatRecord,
};
use zenkey_server::infra::{
    scan::{
        ScanService, ScanServiceHandle,
        service::{SCAN_STARTED_MESSAGE, WELCOME_MESSAGE},
    },
    websocket::ConnectionManager,
};

#[path = "support/mod.rs"]
mod support;
use support::{
    ScriptedRunner, client, events_until_result, next_event, populated_mount,
    settings,
};

const INFECTED_REPORT: &str = "\
/mnt/usb/evil.exe: Win.Trojan.X FOUND
/mnt/usb/evil.exe: Removed.

----------- SCAN SUMMARY -----------
Infected files: 1
";

struct Harness {
    handle: ScanServiceHandle,
    task: tokio::task::JoinHandle<()>,
    feed: broadcast::Receiver<ServerEvent>,
    shutdown: CancellationToken,
}

fn start(mount: &std::path::Path, runner: Arc<ScriptedRunner>) -> Harness {
    let manager = Arc::new(ConnectionManager::new());
    let feed = manager.subscribe();
    let shutdown = CancellationToken::new();
    let (handle, task) =
        ScanService::spawn(settings(mount), runner, manager, shutdown.clone());
    Harness {
        handle,
        task,
        feed,
        shutdown,
    }
}

async fn wait_for_feed(
    feed: &mut broadcast::Receiver<ServerEvent>,
    wanted: impl Fn(&ServerEvent) -> bool,
) -> ServerEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(60), feed.recv())
            .await
            .expect("timed out waiting for broadcast")
            .expect("feed closed");
        if wanted(&event) {
            return event;
        }
    }
}

async fn wait_for_insert(harness: &mut Harness) {
    wait_for_feed(&mut harness.feed, |event| {
        matches!(event, ServerEvent::UsbInserted { .. })
    })
    .await;
}

fn progress_values(events: &[ServerEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::ScanProgress { progress } => Some(*progress),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn presence_changes_are_broadcast_once() {
    let mount = tempfile::tempdir().unwrap();
    let mut harness = start(mount.path(), Arc::new(ScriptedRunner::default()));

    assert!(!harness.handle.snapshot().await.unwrap().device.mounted);

    std::fs::write(mount.path().join("notes.txt"), b"hi").unwrap();
    let inserted = wait_for_feed(&mut harness.feed, |_| true).await;
    assert_eq!(
        inserted,
        ServerEvent::UsbInserted {
            path: mount.path().display().to_string()
        }
    );
    let presence = harness.handle.snapshot().await.unwrap().device;
    assert!(presence.mounted);
    assert_eq!(presence.path.as_deref(), Some(mount.path()));

    std::fs::remove_file(mount.path().join("notes.txt")).unwrap();
    let removed = wait_for_feed(&mut harness.feed, |_| true).await;
    assert_eq!(removed, ServerEvent::UsbRemoved {});

    // Steady state produces no further traffic.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(harness.feed.try_recv().is_err());

    harness.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn attach_greets_with_current_presence() {
    let mount = populated_mount();
    let mut harness = start(mount.path(), Arc::new(ScriptedRunner::default()));
    wait_for_insert(&mut harness).await;

    let (connection, mut rx) = client(None);
    harness.handle.attach(connection).await.unwrap();

    assert_eq!(next_event(&mut rx).await, ServerEvent::status(WELCOME_MESSAGE));
    assert_eq!(
        next_event(&mut rx).await,
        ServerEvent::UsbStatus {
            state: zenkey_core::UsbState::Inserted,
            path: Some(mount.path().display().to_string()),
        }
    );

    harness.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn usb_check_is_answered_on_the_connection_queue() {
    let mount = tempfile::tempdir().unwrap();
    let mut harness = start(mount.path(), Arc::new(ScriptedRunner::default()));

    let (connection, mut rx) = client(None);
    let (other, mut other_rx) = client(None);
    let conn_id = connection.id;
    harness.handle.attach(connection).await.unwrap();
    harness.handle.attach(other).await.unwrap();
    for rx in [&mut rx, &mut other_rx] {
        next_event(rx).await;
        next_event(rx).await;
    }

    std::fs::write(mount.path().join("notes.txt"), b"hi").unwrap();
    wait_for_insert(&mut harness).await;
    harness.handle.usb_check(conn_id).await.unwrap();

    let inserted_path = Some(mount.path().display().to_string());
    assert_eq!(
        next_event(&mut rx).await,
        ServerEvent::UsbInserted {
            path: mount.path().display().to_string()
        }
    );
    assert_eq!(
        next_event(&mut rx).await,
        ServerEvent::UsbStatus {
            state: zenkey_core::UsbState::Inserted,
            path: inserted_path,
        }
    );

    // Only the requester gets the reply; an unknown id is a no-op.
    harness.handle.usb_check(Uuid::now_v7()).await.unwrap();
    harness.handle.snapshot().await.unwrap();
    assert!(matches!(
        other_rx.try_recv(),
        Ok(ServerEvent::UsbInserted { .. })
    ));
    assert!(other_rx.try_recv().is_err());

    harness.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn successful_scan_reports_progress_then_result() {
    let mount = populated_mount();
    let runner = Arc::new(
        ScriptedRunner::new(Duration::from_secs(60))
            .then(Ok(ScanArtifact::Report(INFECTED_REPORT.to_string()))),
    );
    let mut harness = start(mount.path(), Arc::clone(&runner));
    wait_for_insert(&mut harness).await;

    let (operator, mut operator_rx) = client(Some("operator"));
    let (observer, mut observer_rx) = client(None);
    let operator_id = operator.id;
    harness.handle.attach(operator).await.unwrap();
    harness.handle.attach(observer).await.unwrap();
    for rx in [&mut operator_rx, &mut observer_rx] {
        next_event(rx).await;
        next_event(rx).await;
    }

    harness.handle.request_scan(operator_id, true).await.unwrap();
    let events = events_until_result(&mut operator_rx).await;

    assert_eq!(events[0], ServerEvent::status(SCAN_STARTED_MESSAGE));
    let mut expected: Vec<u8> = (0..=90).step_by(5).collect();
    expected.push(100);
    assert_eq!(progress_values(&events), expected);

    let ServerEvent::ScanResult {
        status,
        report,
        infected_summary,
    } = events.last().unwrap().clone()
    else {
        panic!("last event is not a scan result");
    };
    assert_eq!(status, ScanResultStatus::Done);
    assert_eq!(report.as_deref(), Some(INFECTED_REPORT));
    let summary = infected_summary.unwrap();
    assert_eq!(summary.infected_count, 1);
    assert_eq!(
        summary.infected_files,
        vec![ThreatRecord {
            path: "/mnt/usb/evil.exe".to_string(),
            threat_name: "Win.Trojan.X".to_string(),
            removed: true,
        }]
    );

    // Observers see the same broadcast sequence.
    assert_eq!(events_until_result(&mut observer_rx).await, events);

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.scan.status(), ScanStatus::Threat);
    assert_eq!(snapshot.scan.progress(), 100);
    assert_eq!(runner.targets(), vec![mount.path().to_path_buf()]);

    harness.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn missing_report_finishes_clean_with_sentinel() {
    let mount = populated_mount();
    let mut harness = start(
        mount.path(),
        Arc::new(ScriptedRunner::new(Duration::from_secs(2))),
    );
    wait_for_insert(&mut harness).await;

    let (operator, mut rx) = client(Some("operator"));
    let operator_id = operator.id;
    harness.handle.attach(operator).await.unwrap();
    harness.handle.request_scan(operator_id, true).await.unwrap();

    let events = events_until_result(&mut rx).await;
    assert_eq!(
        events.last(),
        Some(&ServerEvent::ScanResult {
            status: ScanResultStatus::Done,
            report: Some(NO_REPORT_SENTINEL.to_string()),
            infected_summary: Some(zenkey_core::InfectedSummary {
                infected_count: 0,
                infected_files: Vec::new(),
            }),
        })
    );
    let snapshot = harness.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.scan.status(), ScanStatus::Clean);

    harness.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn progress_stops_at_cap_while_scan_runs_long() {
    let mount = populated_mount();
    let mut harness = start(
        mount.path(),
        Arc::new(ScriptedRunner::new(Duration::from_secs(600))),
    );
    wait_for_insert(&mut harness).await;

    let (operator, mut rx) = client(Some("operator"));
    let operator_id = operator.id;
    harness.handle.attach(operator).await.unwrap();
    harness.handle.request_scan(operator_id, true).await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert_eq!(progress_values(&seen).last(), Some(&90));
    assert!(
        !seen
            .iter()
            .any(|event| matches!(event, ServerEvent::ScanResult { .. }))
    );

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.scan.status(), ScanStatus::Scanning);
    assert_eq!(snapshot.scan.progress(), 90);

    harness.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn rejections_reach_only_the_requester() {
    let mount = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new(Duration::from_secs(60)));
    let mut harness = start(mount.path(), runner);

    let (first, mut first_rx) = client(Some("first"));
    let (second, mut second_rx) = client(Some("second"));
    let (guest, mut guest_rx) = client(None);
    let (first_id, second_id, guest_id) = (first.id, second.id, guest.id);
    for connection in [first, second, guest] {
        harness.handle.attach(connection).await.unwrap();
    }
    for rx in [&mut first_rx, &mut second_rx, &mut guest_rx] {
        next_event(rx).await;
        next_event(rx).await;
    }

    // No device yet.
    harness.handle.request_scan(first_id, true).await.unwrap();
    assert_eq!(
        next_event(&mut first_rx).await,
        ServerEvent::scan_rejected(
            "No USB device detected or the device is empty."
        )
    );

    // Authentication is checked before anything else.
    harness.handle.request_scan(guest_id, false).await.unwrap();
    assert_eq!(
        next_event(&mut guest_rx).await,
        ServerEvent::scan_rejected("Authentication required to start a scan.")
    );

    std::fs::write(mount.path().join("doc.pdf"), b"%PDF").unwrap();
    wait_for_insert(&mut harness).await;
    for rx in [&mut first_rx, &mut second_rx, &mut guest_rx] {
        assert!(matches!(
            next_event(rx).await,
            ServerEvent::UsbInserted { .. }
        ));
    }

    harness.handle.request_scan(first_id, true).await.unwrap();
    assert_eq!(
        next_event(&mut second_rx).await,
        ServerEvent::status(SCAN_STARTED_MESSAGE)
    );

    harness.handle.request_scan(second_id, true).await.unwrap();
    let rejection = loop {
        match next_event(&mut second_rx).await {
            ServerEvent::ScanProgress { .. } => continue,
            other => break other,
        }
    };
    assert_eq!(
        rejection,
        ServerEvent::scan_rejected("A scan is already in progress.")
    );

    harness.handle.snapshot().await.unwrap();
    while let Ok(event) = first_rx.try_recv() {
        assert!(!matches!(event, ServerEvent::ScanResult { .. }));
    }
    assert!(
        harness.handle.snapshot().await.unwrap().scan.is_scanning(),
        "rejection must not disturb the running scan"
    );

    harness.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn failures_end_in_error_and_allow_a_new_scan() {
    let mount = populated_mount();
    let runner = Arc::new(
        ScriptedRunner::new(Duration::from_secs(3))
            .then(Err(ScanError::NonZeroExit {
                code: Some(125),
                diagnostic: "Unable to find image 'clamav-scan:latest' locally"
                    .to_string(),
            }))
            .then(Err(ScanError::Timeout {
                after: Duration::from_secs(120),
                output: String::new(),
            }))
            .then(Ok(ScanArtifact::Report("Infected files: 0\n".to_string()))),
    );
    let mut harness = start(mount.path(), runner);
    wait_for_insert(&mut harness).await;

    let (operator, mut rx) = client(Some("operator"));
    let operator_id = operator.id;
    harness.handle.attach(operator).await.unwrap();
    next_event(&mut rx).await;
    next_event(&mut rx).await;

    harness.handle.request_scan(operator_id, true).await.unwrap();
    let events = events_until_result(&mut rx).await;
    assert_eq!(
        events[events.len() - 2],
        ServerEvent::ScanProgress { progress: 100 }
    );
    assert_eq!(
        events.last(),
        Some(&ServerEvent::scan_rejected(
            "Unable to find image 'clamav-scan:latest' locally"
        ))
    );
    let snapshot = harness.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.scan.status(), ScanStatus::Error);
    assert_eq!(
        snapshot.scan.error_message(),
        Some("Unable to find image 'clamav-scan:latest' locally")
    );

    harness.handle.request_scan(operator_id, true).await.unwrap();
    let events = events_until_result(&mut rx).await;
    assert_eq!(
        events.last(),
        Some(&ServerEvent::scan_rejected("scan process timed out after 2m"))
    );

    harness.handle.request_scan(operator_id, true).await.unwrap();
    let events = events_until_result(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(ServerEvent::ScanResult {
            status: ScanResultStatus::Done,
            ..
        })
    ));
    let snapshot = harness.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.scan.status(), ScanStatus::Clean);
    assert_eq!(snapshot.scan.error_message(), None);

    harness.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_actor() {
    let mount = populated_mount();
    let harness = start(
        mount.path(),
        Arc::new(ScriptedRunner::new(Duration::from_secs(600))),
    );

    harness.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), harness.task)
        .await
        .expect("service did not stop")
        .unwrap();

    assert!(harness.handle.snapshot().await.is_err());
    assert!(harness.handle.usb_check(Uuid::now_v7()).await.is_err());
}
