//! Primary/fallback reconnect cycle.
//!
//! ```text
//!   Idle ──► AttemptingPrimary(1..=N) ──► AttemptingFallback ──► Exhausted
//!    │              │                           │
//!    └──────────────┴─────── Succeeded ◄────────┘
//! ```
//!
//! A wired or cellular link short-circuits the cycle: it is checked before
//! the first attempt, between primary attempts and on entering the fallback.
//! Every attempt, including the check that precedes it, is bounded by its
//! target's timeout, and cancellation is observed at every await point.

use crate::controller::NetworkController;
use crate::details::LinkDetails;
use crate::state::{ReconnectMachine, ReconnectState, SuccessVia};
use crate::target::{ReconnectPlan, ReconnectPolicy, ReconnectTarget};
use serialink_storage::models::NetworkSettings;
use std::fmt;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a reconnect cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// Connectivity restored after `attempts` join attempts.
    Succeeded { via: SuccessVia, attempts: u32 },

    /// Primary and fallback both failed.
    Exhausted { attempts: u32 },

    /// The cycle was cancelled before it ended.
    Cancelled { attempts: u32 },
}

impl ReconnectOutcome {
    /// Check if connectivity was restored.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Number of join attempts the cycle made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Exhausted { attempts }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

impl fmt::Display for ReconnectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { via, attempts } => {
                write!(f, "reconnected via {} after {} attempt(s)", via, attempts)
            }
            Self::Exhausted { attempts } => {
                write!(f, "reconnect exhausted after {} attempt(s)", attempts)
            }
            Self::Cancelled { attempts } => {
                write!(f, "reconnect cancelled after {} attempt(s)", attempts)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    PriorityLink,
    Clear,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Connected,
    Failed,
    Cancelled,
}

/// Drives one reconnect cycle at a time against a [`NetworkController`].
///
/// # Examples
///
/// ```
/// use serialink_network::mock::MockController;
/// use serialink_network::{ReconnectCoordinator, ReconnectOutcome, ReconnectPolicy, SuccessVia};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let (controller, handle) = MockController::new();
///     handle.set_priority_link(true);
///
///     let mut coordinator = ReconnectCoordinator::new(controller, ReconnectPolicy::default());
///     let cancel = CancellationToken::new();
///     let plan = coordinator.plan(None, &cancel).await;
///     let outcome = coordinator.run(&plan, &cancel).await;
///
///     assert_eq!(outcome, ReconnectOutcome::Succeeded { via: SuccessVia::PriorityLink, attempts: 0 });
///     assert_eq!(handle.request_count(), 0);
/// }
/// ```
#[derive(Debug)]
pub struct ReconnectCoordinator<C> {
    controller: C,
    policy: ReconnectPolicy,
    machine: ReconnectMachine,
    state_tx: watch::Sender<ReconnectState>,
}

impl<C: NetworkController> ReconnectCoordinator<C> {
    /// Create an idle coordinator.
    pub fn new(controller: C, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ReconnectState::Idle);
        Self {
            controller,
            policy,
            machine: ReconnectMachine::new(),
            state_tx,
        }
    }

    /// The controller this coordinator drives.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Retry and timeout bounds in use.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Current state.
    pub fn state(&self) -> ReconnectState {
        *self.machine.current_state()
    }

    /// Recorded transitions of this and earlier cycles.
    pub fn machine(&self) -> &ReconnectMachine {
        &self.machine
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ReconnectState> {
        self.state_tx.subscribe()
    }

    /// Resolve targets from `settings` and a fresh scan.
    ///
    /// The scan is bounded by the policy's scan timeout; a timed-out or
    /// cancelled scan contributes no SSIDs.
    pub async fn plan(
        &self,
        settings: Option<&NetworkSettings>,
        cancel: &CancellationToken,
    ) -> ReconnectPlan {
        let scanned = tokio::select! {
            biased;

            _ = cancel.cancelled() => Vec::new(),

            result = tokio::time::timeout(self.policy.scan_timeout, self.controller.scan()) => {
                result.unwrap_or_else(|_| {
                    warn!(
                        timeout_ms = self.policy.scan_timeout.as_millis() as u64,
                        "Network scan timed out"
                    );
                    Vec::new()
                })
            }
        };
        let plan = ReconnectPlan::resolve(settings, &scanned, &self.policy);

        if plan.primary.is_unknown() || plan.fallback.is_unknown() {
            warn!(
                primary = %plan.primary,
                fallback = %plan.fallback,
                "Reconnect target could not be resolved"
            );
        }

        plan
    }

    /// Addressing of the active link, bounded by the policy's scan timeout.
    pub async fn link_details(&self) -> Option<LinkDetails> {
        match tokio::time::timeout(self.policy.scan_timeout, self.controller.link_details()).await {
            Ok(details) => details,
            Err(_) => {
                debug!("Link details query timed out");
                None
            }
        }
    }

    /// Run one cycle to completion or cancellation.
    ///
    /// Each attempt's deadline is fixed before its priority-link check, so
    /// the check counts against that attempt's timeout.
    pub async fn run(&mut self, plan: &ReconnectPlan, cancel: &CancellationToken) -> ReconnectOutcome {
        if self.state() != ReconnectState::Idle {
            self.enter(ReconnectState::Idle);
        }

        info!(primary = %plan.primary, fallback = %plan.fallback, "Reconnect cycle started");

        if cancel.is_cancelled() {
            return self.cancelled(0);
        }

        let max_attempts = plan.primary.max_attempts.max(1);
        let mut attempts = 0;
        for attempt in 1..=max_attempts {
            let deadline = Instant::now() + plan.primary.timeout;
            match self.check_priority_link(deadline, cancel).await {
                Check::PriorityLink => return self.priority_link(attempts),
                Check::Cancelled => return self.cancelled(attempts),
                Check::Clear => {}
            }

            self.enter(ReconnectState::AttemptingPrimary { attempt });
            attempts += 1;

            match self.attempt(&plan.primary, deadline, cancel).await {
                Attempt::Connected => {
                    self.enter(ReconnectState::Succeeded(SuccessVia::Primary));
                    info!(ssid = %plan.primary, attempt, "Connected to primary network");
                    return ReconnectOutcome::Succeeded {
                        via: SuccessVia::Primary,
                        attempts,
                    };
                }
                Attempt::Failed => {
                    debug!(ssid = %plan.primary, attempt, "Primary attempt failed");
                }
                Attempt::Cancelled => return self.cancelled(attempts),
            }
        }

        warn!(
            ssid = %plan.primary,
            attempts,
            "Primary attempts exhausted, trying fallback"
        );
        self.enter(ReconnectState::AttemptingFallback);

        let deadline = Instant::now() + plan.fallback.timeout;
        match self.check_priority_link(deadline, cancel).await {
            Check::PriorityLink => return self.priority_link(attempts),
            Check::Cancelled => return self.cancelled(attempts),
            Check::Clear => {}
        }

        attempts += 1;
        match self.attempt(&plan.fallback, deadline, cancel).await {
            Attempt::Connected => {
                self.enter(ReconnectState::Succeeded(SuccessVia::Fallback));
                info!(ssid = %plan.fallback, "Connected to fallback network");
                ReconnectOutcome::Succeeded {
                    via: SuccessVia::Fallback,
                    attempts,
                }
            }
            Attempt::Failed => {
                self.enter(ReconnectState::Exhausted);
                warn!(
                    primary = %plan.primary,
                    fallback = %plan.fallback,
                    attempts,
                    "Reconnect exhausted"
                );
                ReconnectOutcome::Exhausted { attempts }
            }
            Attempt::Cancelled => self.cancelled(attempts),
        }
    }

    /// Ask whether a wired or cellular link is up, giving up at the check
    /// timeout or `deadline`, whichever comes first. A check that runs out
    /// of time counts as no priority link.
    async fn check_priority_link(&self, deadline: Instant, cancel: &CancellationToken) -> Check {
        let bound = deadline.min(Instant::now() + self.policy.check_timeout);

        tokio::select! {
            biased;

            _ = cancel.cancelled() => Check::Cancelled,

            result = tokio::time::timeout_at(bound, self.controller.has_priority_link()) => match result {
                Ok(true) => Check::PriorityLink,
                Ok(false) => Check::Clear,
                Err(_) => {
                    debug!("Priority link check timed out");
                    Check::Clear
                }
            },
        }
    }

    /// Submit a join request, then poll until connected or `deadline`.
    async fn attempt(
        &self,
        target: &ReconnectTarget,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Attempt {
        let poll_interval = self.policy.poll_interval;
        let join = async {
            if let Err(e) = self.controller.request(target).await {
                // The platform may still join through a saved profile.
                debug!(ssid = %target, error = %e, "Join request failed");
            }
            loop {
                if self.controller.is_connected_to(&target.ssid).await {
                    return true;
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => Attempt::Cancelled,

            result = tokio::time::timeout_at(deadline, join) => match result {
                Ok(true) => Attempt::Connected,
                Ok(false) | Err(_) => {
                    debug!(
                        ssid = %target,
                        timeout_ms = target.timeout.as_millis() as u64,
                        "Attempt timed out"
                    );
                    Attempt::Failed
                }
            },
        }
    }

    fn priority_link(&mut self, attempts: u32) -> ReconnectOutcome {
        info!(attempts, "Priority link active, stopping Wi-Fi attempts");
        self.enter(ReconnectState::Succeeded(SuccessVia::PriorityLink));
        ReconnectOutcome::Succeeded {
            via: SuccessVia::PriorityLink,
            attempts,
        }
    }

    fn cancelled(&mut self, attempts: u32) -> ReconnectOutcome {
        info!(attempts, "Reconnect cycle cancelled");
        if self.state() != ReconnectState::Idle {
            self.enter(ReconnectState::Idle);
        }
        ReconnectOutcome::Cancelled { attempts }
    }

    fn enter(&mut self, state: ReconnectState) {
        match self.machine.transition_to(state) {
            Ok(transition) => {
                debug!(from = %transition.from, to = %transition.to, "Reconnect state changed");
                self.state_tx.send_replace(state);
            }
            Err(e) => warn!(error = %e, "Reconnect state change rejected"),
        }
    }
}
