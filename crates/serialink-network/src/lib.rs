//! Link-loss recovery for serialink.
//!
//! When connectivity drops, a [`ReconnectCoordinator`] tries the primary
//! network a bounded number of times, then the fallback network once, and
//! stops early as soon as a wired or cellular link is available:
//!
//! - [`NetworkController`]: the platform's network-selection primitive
//!   ([`NmcliController`] for NetworkManager, [`mock::MockController`] for tests)
//! - [`ReconnectPlan`]: primary and fallback targets resolved from the
//!   persisted [`NetworkSettings`](serialink_storage::models::NetworkSettings)
//!   and a scan
//! - [`ReconnectMachine`]: the validating state machine with history
//! - [`LinkMonitor`]: one cycle per [`NetworkEvent::Lost`]
//! - [`LinkDetails`]: addressing of the active link, for pre-filling settings

pub mod controller;
pub mod coordinator;
pub mod details;
pub mod error;
pub mod mock;
pub mod monitor;
pub mod nmcli;
pub mod state;
pub mod target;

pub use controller::NetworkController;
pub use coordinator::{ReconnectCoordinator, ReconnectOutcome};
pub use details::LinkDetails;
pub use error::NetworkError;
pub use monitor::{LinkMonitor, NetworkEvent, watch_connectivity};
pub use nmcli::NmcliController;
pub use state::{ReconnectMachine, ReconnectState, StateTransition, SuccessVia};
pub use target::{ReconnectPlan, ReconnectPolicy, ReconnectTarget, subnet_mask};
