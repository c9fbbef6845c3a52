//! Link monitor and connectivity watcher.

use serialink_network::mock::MockController;
use serialink_network::{
    LinkDetails, LinkMonitor, NetworkEvent, ReconnectCoordinator, ReconnectOutcome, ReconnectPolicy,
    SuccessVia, watch_connectivity,
};
use serialink_storage::Database;
use serialink_storage::models::NetworkSettings;
use serialink_storage::repositories::{NetworkSettingsRepository, SqliteNetworkSettingsRepository};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_loss_runs_cycle_with_latest_settings() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteNetworkSettingsRepository::new(db.pool().clone());
    repo.insert(&NetworkSettings::new().with_primary("old", "a"))
        .await
        .unwrap();
    repo.insert(&NetworkSettings::new().with_primary("office", "secret"))
        .await
        .unwrap();

    let (controller, handle) = MockController::new();
    handle.make_reachable("office");
    handle.set_scan(["cafe"]);

    let (event_tx, event_rx) = mpsc::channel(8);
    let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let coordinator = ReconnectCoordinator::new(controller, ReconnectPolicy::default());
    let monitor = LinkMonitor::new(coordinator, outcome_tx).with_settings(repo);
    let task = tokio::spawn(monitor.run(event_rx, shutdown.clone()));

    event_tx.send(NetworkEvent::Available).await.unwrap();
    event_tx.send(NetworkEvent::Lost).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), outcome_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        outcome,
        ReconnectOutcome::Succeeded {
            via: SuccessVia::Primary,
            attempts: 1
        }
    );

    let requests = handle.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].ssid, "office");
    assert_eq!(requests[0].password.as_deref(), Some("secret"));

    shutdown.cancel();
    task.await.unwrap();
    db.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_second_loss_restarts_cycle() {
    let (controller, handle) = MockController::new();
    handle.set_scan(["office", "backup"]);

    let (event_tx, event_rx) = mpsc::channel(8);
    let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let coordinator = ReconnectCoordinator::new(controller, ReconnectPolicy::default());
    let task = tokio::spawn(LinkMonitor::new(coordinator, outcome_tx).run(event_rx, shutdown.clone()));

    event_tx.send(NetworkEvent::Lost).await.unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;
    event_tx.send(NetworkEvent::Lost).await.unwrap();

    let first = outcome_rx.recv().await.unwrap();
    assert_eq!(first, ReconnectOutcome::Cancelled { attempts: 2 });

    handle.make_reachable("office");
    let second = outcome_rx.recv().await.unwrap();
    assert!(second.is_success());

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_running_cycle() {
    let (controller, _handle) = MockController::new();

    let (event_tx, event_rx) = mpsc::channel(8);
    let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let coordinator = ReconnectCoordinator::new(controller, ReconnectPolicy::default());
    let task = tokio::spawn(LinkMonitor::new(coordinator, outcome_tx).run(event_rx, shutdown.clone()));

    event_tx.send(NetworkEvent::Lost).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    shutdown.cancel();

    task.await.unwrap();
    assert_eq!(
        outcome_rx.recv().await,
        Some(ReconnectOutcome::Cancelled { attempts: 1 })
    );
    assert_eq!(outcome_rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_closed_event_channel_stops_monitor() {
    let (controller, _handle) = MockController::new();
    let (event_tx, event_rx) = mpsc::channel(8);
    let (outcome_tx, _outcome_rx) = mpsc::channel(8);

    let coordinator = ReconnectCoordinator::new(controller, ReconnectPolicy::default());
    let task = tokio::spawn(
        LinkMonitor::new(coordinator, outcome_tx).run(event_rx, CancellationToken::new()),
    );

    drop(event_tx);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_watcher_reports_edges_only() {
    let (controller, handle) = MockController::new();
    let (event_tx, mut event_rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(watch_connectivity(
        controller,
        Duration::from_secs(1),
        event_tx,
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.set_connectivity(false);
    assert_eq!(event_rx.recv().await, Some(NetworkEvent::Lost));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.set_connectivity(true);
    assert_eq!(event_rx.recv().await, Some(NetworkEvent::Available));

    shutdown.cancel();
    task.await.unwrap();
    assert_eq!(event_rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_watcher_reports_loss_present_at_start() {
    let (controller, handle) = MockController::new();
    handle.set_connectivity(false);
    let (event_tx, mut event_rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(watch_connectivity(
        controller,
        Duration::from_secs(1),
        event_tx,
        shutdown.clone(),
    ));

    let first = tokio::time::timeout(Duration::from_millis(10), event_rx.recv())
        .await
        .unwrap();
    assert_eq!(first, Some(NetworkEvent::Lost));

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_available_reads_link_details_without_reconnecting() {
    let (controller, handle) = MockController::new();
    handle.set_link_details(Some(LinkDetails {
        device: "wlan0".to_string(),
        dhcp_enabled: true,
        ip_address: Some(Ipv4Addr::new(192, 168, 1, 20)),
        prefix: Some(24),
        ..LinkDetails::default()
    }));

    let (event_tx, event_rx) = mpsc::channel(8);
    let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let coordinator = ReconnectCoordinator::new(controller, ReconnectPolicy::default());
    let task = tokio::spawn(LinkMonitor::new(coordinator, outcome_tx).run(event_rx, shutdown.clone()));

    event_tx.send(NetworkEvent::Available).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    shutdown.cancel();
    task.await.unwrap();
    assert_eq!(handle.request_count(), 0);
    assert_eq!(outcome_rx.recv().await, None);
}
