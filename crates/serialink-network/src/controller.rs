//! Network-selection primitive.
//!
//! The reconnect coordinator only ever talks to the platform through this
//! trait. [`NmcliController`](crate::NmcliController) drives NetworkManager;
//! [`MockController`](crate::mock::MockController) is scripted from tests.

#![allow(async_fn_in_trait)]

use crate::details::LinkDetails;
use crate::error::NetworkError;
use crate::target::ReconnectTarget;

/// Platform operations a reconnect cycle needs.
///
/// Every method must return within a bounded time. Query failures are
/// reported as `false` / empty results; only [`request`](Self::request)
/// surfaces an error.
pub trait NetworkController: Send + Sync {
    /// Check if a wired or cellular link is active.
    async fn has_priority_link(&self) -> bool;

    /// Check if the host currently has network connectivity.
    async fn has_connectivity(&self) -> bool;

    /// SSIDs currently visible, strongest first.
    async fn scan(&self) -> Vec<String>;

    /// Ask the platform to join `target`. Returns once the request is
    /// submitted, not when the link is up.
    async fn request(&self, target: &ReconnectTarget) -> Result<(), NetworkError>;

    /// Check if the active wireless link is `ssid`.
    async fn is_connected_to(&self, ssid: &str) -> bool;

    /// Addressing of the active link, `None` when nothing is connected.
    async fn link_details(&self) -> Option<LinkDetails>;
}
