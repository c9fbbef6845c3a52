//! Scriptable network controller for tests and development.

use crate::controller::NetworkController;
use crate::details::LinkDetails;
use crate::error::NetworkError;
use crate::target::ReconnectTarget;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
struct MockState {
    priority_link: bool,
    connectivity: bool,
    scanned: Vec<String>,
    // ssid -> failed checks before the link comes up
    reachable: HashMap<String, u32>,
    joining: Option<(String, u32)>,
    connected: Option<String>,
    request_error: Option<String>,
    requests: Vec<ReconnectTarget>,
    checks: usize,
    details: Option<LinkDetails>,
    // added to every priority-link check and scan
    query_delay: Duration,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            priority_link: false,
            connectivity: true,
            scanned: Vec::new(),
            reachable: HashMap::new(),
            joining: None,
            connected: None,
            request_error: None,
            requests: Vec::new(),
            checks: 0,
            details: None,
            query_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn slow_query(&self) {
        let delay = self.lock().query_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Simulated platform network stack.
///
/// Networks are unreachable until the handle marks them reachable, so by
/// default every attempt runs into its timeout.
///
/// # Examples
///
/// ```
/// use serialink_network::NetworkController;
/// use serialink_network::mock::MockController;
/// use serialink_network::ReconnectTarget;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let (controller, handle) = MockController::new();
///     handle.make_reachable("office");
///
///     let target = ReconnectTarget::new("office", Duration::from_secs(10));
///     controller.request(&target).await.unwrap();
///     assert!(controller.is_connected_to("office").await);
///     assert_eq!(handle.request_count(), 1);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockController {
    shared: Arc<Shared>,
}

impl MockController {
    /// Create a controller and the handle that scripts it.
    pub fn new() -> (Self, MockControllerHandle) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockControllerHandle { shared },
        )
    }
}

impl NetworkController for MockController {
    async fn has_priority_link(&self) -> bool {
        self.shared.slow_query().await;
        self.shared.lock().priority_link
    }

    async fn has_connectivity(&self) -> bool {
        self.shared.lock().connectivity
    }

    async fn scan(&self) -> Vec<String> {
        self.shared.slow_query().await;
        self.shared.lock().scanned.clone()
    }

    async fn request(&self, target: &ReconnectTarget) -> Result<(), NetworkError> {
        let mut state = self.shared.lock();
        state.requests.push(target.clone());

        if let Some(reason) = &state.request_error {
            return Err(NetworkError::request(&target.ssid, reason.clone()));
        }

        debug!(ssid = %target.ssid, "Mock network request");
        state.joining = state
            .reachable
            .get(&target.ssid)
            .map(|&delay| (target.ssid.clone(), delay));
        Ok(())
    }

    async fn is_connected_to(&self, ssid: &str) -> bool {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        state.checks += 1;

        if let Some((joining, remaining)) = state.joining.as_mut()
            && joining.as_str() == ssid
        {
            if *remaining == 0 {
                state.connected = Some(ssid.to_string());
                state.joining = None;
            } else {
                *remaining -= 1;
            }
        }

        state.connected.as_deref() == Some(ssid)
    }

    async fn link_details(&self) -> Option<LinkDetails> {
        self.shared.lock().details.clone()
    }
}

/// Scripts a [`MockController`] and inspects what it was asked to do.
#[derive(Debug, Clone)]
pub struct MockControllerHandle {
    shared: Arc<Shared>,
}

impl MockControllerHandle {
    /// Report a wired or cellular link as active or not.
    pub fn set_priority_link(&self, active: bool) {
        self.shared.lock().priority_link = active;
    }

    /// Report overall connectivity.
    pub fn set_connectivity(&self, up: bool) {
        self.shared.lock().connectivity = up;
    }

    /// Set the SSIDs returned by a scan.
    pub fn set_scan<I, S>(&self, ssids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared.lock().scanned = ssids.into_iter().map(Into::into).collect();
    }

    /// Let requests for `ssid` succeed on the first check.
    pub fn make_reachable(&self, ssid: impl Into<String>) {
        self.make_reachable_after(ssid, 0);
    }

    /// Let requests for `ssid` succeed after `failed_checks` negative checks.
    pub fn make_reachable_after(&self, ssid: impl Into<String>, failed_checks: u32) {
        self.shared.lock().reachable.insert(ssid.into(), failed_checks);
    }

    /// Report `details` for the active link.
    pub fn set_link_details(&self, details: Option<LinkDetails>) {
        self.shared.lock().details = details;
    }

    /// Make every priority-link check and scan take `delay`.
    pub fn set_query_delay(&self, delay: Duration) {
        self.shared.lock().query_delay = delay;
    }

    /// Reject every request with `reason`.
    pub fn fail_requests(&self, reason: impl Into<String>) {
        self.shared.lock().request_error = Some(reason.into());
    }

    /// Drop the current wireless link.
    pub fn drop_link(&self) {
        let mut state = self.shared.lock();
        state.connected = None;
        state.joining = None;
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ReconnectTarget> {
        self.shared.lock().requests.clone()
    }

    /// SSIDs of every request received, in order.
    pub fn requested_ssids(&self) -> Vec<String> {
        self.shared
            .lock()
            .requests
            .iter()
            .map(|target| target.ssid.clone())
            .collect()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.shared.lock().requests.len()
    }

    /// Number of connectivity checks performed.
    pub fn check_count(&self) -> usize {
        self.shared.lock().checks
    }

    /// SSID of the active wireless link.
    pub fn connected_ssid(&self) -> Option<String> {
        self.shared.lock().connected.clone()
    }
}
