//! Link-loss monitoring.
//!
//! [`watch_connectivity`] turns connectivity polling into [`NetworkEvent`]s.
//! [`LinkMonitor`] consumes them and runs one reconnect cycle per loss,
//! loading the latest persisted settings at the start of each cycle. A new
//! loss during a cycle cancels it and starts over.

use crate::controller::NetworkController;
use crate::coordinator::{ReconnectCoordinator, ReconnectOutcome};
use serialink_storage::models::NetworkSettings;
use serialink_storage::repositories::{NetworkSettingsRepository, SqliteNetworkSettingsRepository};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Change in host connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Connectivity went away.
    Lost,

    /// Connectivity came back.
    Available,
}

/// Poll `controller` every `interval` and report connectivity edges.
///
/// The first poll runs at once against an up baseline, so a host that
/// starts without connectivity reports [`NetworkEvent::Lost`] immediately.
/// After that only changes are reported. Returns on shutdown or once
/// `events` is closed.
pub async fn watch_connectivity<C: NetworkController>(
    controller: C,
    interval: Duration,
    events: mpsc::Sender<NetworkEvent>,
    shutdown: CancellationToken,
) {
    let mut up = true;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now_up = controller.has_connectivity().await;
        if now_up == up {
            continue;
        }
        up = now_up;

        let event = if up {
            NetworkEvent::Available
        } else {
            NetworkEvent::Lost
        };
        info!(?event, "Connectivity changed");
        if events.send(event).await.is_err() {
            break;
        }
    }

    debug!("Connectivity watcher stopped");
}

/// Runs a reconnect cycle for every link loss.
///
/// # Examples
///
/// ```no_run
/// use serialink_network::{LinkMonitor, NmcliController, ReconnectCoordinator, ReconnectPolicy};
/// use serialink_network::watch_connectivity;
/// use std::time::Duration;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let controller = NmcliController::new();
/// let (event_tx, event_rx) = mpsc::channel(8);
/// let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
/// let shutdown = CancellationToken::new();
///
/// tokio::spawn(watch_connectivity(controller.clone(), Duration::from_secs(1), event_tx, shutdown.clone()));
///
/// let coordinator = ReconnectCoordinator::new(controller, ReconnectPolicy::default());
/// tokio::spawn(LinkMonitor::new(coordinator, outcome_tx).run(event_rx, shutdown));
///
/// while let Some(outcome) = outcome_rx.recv().await {
///     println!("{outcome}");
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct LinkMonitor<C, R = SqliteNetworkSettingsRepository> {
    coordinator: ReconnectCoordinator<C>,
    settings: Option<R>,
    outcomes: mpsc::Sender<ReconnectOutcome>,
}

impl<C: NetworkController> LinkMonitor<C> {
    /// Create a monitor without persisted settings; targets come from scans.
    pub fn new(coordinator: ReconnectCoordinator<C>, outcomes: mpsc::Sender<ReconnectOutcome>) -> Self {
        Self {
            coordinator,
            settings: None,
            outcomes,
        }
    }
}

impl<C: NetworkController, R: NetworkSettingsRepository> LinkMonitor<C, R> {
    /// Read targets and credentials from `repository`.
    pub fn with_settings<S: NetworkSettingsRepository>(self, repository: S) -> LinkMonitor<C, S> {
        LinkMonitor {
            coordinator: self.coordinator,
            settings: Some(repository),
            outcomes: self.outcomes,
        }
    }

    /// Consume `events` until shutdown or until the sender side is gone.
    pub async fn run(mut self, mut events: mpsc::Receiver<NetworkEvent>, shutdown: CancellationToken) {
        let mut pending_loss = false;
        let mut closed = false;

        info!("Link monitor started");

        loop {
            if !pending_loss {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(NetworkEvent::Lost) => {}
                        Some(NetworkEvent::Available) => {
                            self.log_link_details().await;
                            continue;
                        }
                        None => break,
                    },
                }
            }
            pending_loss = false;

            let cycle_cancel = shutdown.child_token();
            let settings = self.load_settings().await;
            let plan = self.coordinator.plan(settings.as_ref(), &cycle_cancel).await;

            let outcome = {
                let cycle = self.coordinator.run(&plan, &cycle_cancel);
                tokio::pin!(cycle);

                loop {
                    tokio::select! {
                        biased;
                        outcome = &mut cycle => break outcome,
                        event = events.recv(), if !cycle_cancel.is_cancelled() => match event {
                            Some(NetworkEvent::Lost) => {
                                debug!("Link lost again, restarting reconnect cycle");
                                pending_loss = true;
                                cycle_cancel.cancel();
                            }
                            Some(NetworkEvent::Available) => {
                                trace!("Connectivity available during reconnect cycle");
                            }
                            None => {
                                closed = true;
                                cycle_cancel.cancel();
                            }
                        },
                    }
                }
            };

            info!(%outcome, "Reconnect cycle finished");
            if self.outcomes.send(outcome).await.is_err() {
                debug!("Outcome receiver dropped");
            }

            if closed || shutdown.is_cancelled() {
                break;
            }
        }

        info!("Link monitor stopped");
    }

    async fn log_link_details(&self) {
        match self.coordinator.link_details().await {
            Some(details) => info!(
                device = %details.device,
                dhcp = details.dhcp_enabled,
                ip = ?details.ip_address,
                subnet_mask = %details.subnet_mask(),
                gateway = ?details.gateway,
                dns = ?details.dns,
                ssids = ?details.ssids,
                "Connectivity available"
            ),
            None => debug!("Connectivity available, no active link"),
        }
    }

    async fn load_settings(&self) -> Option<NetworkSettings> {
        let repository = self.settings.as_ref()?;
        match repository.latest().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Failed to load network settings, using scan results");
                None
            }
        }
    }
}
