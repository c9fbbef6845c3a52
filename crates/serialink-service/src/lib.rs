//! Connection and event-delivery engine for serialink.
//!
//! The [`ConnectionManager`] owns one transport connection for longer than
//! any single observer lives. Observers attach and detach freely; events that
//! arrive while none is attached are buffered and replayed, in arrival order,
//! to the next one.
//!
//! # Delivery guarantees
//!
//! - **Ordering**: events reach observers in the order the transport
//!   produced them, across any number of attach/detach cycles.
//! - **No loss**: anything produced while detached is present in the next
//!   attach replay, including what a detached observer left unconsumed.
//! - **No duplication**: an event is either delivered or buffered, never both.
//! - **Coalescing**: adjacent data is merged into one batch while it waits,
//!   so a burst of reads is never fragmented across deliveries.

pub mod manager;
pub mod notifier;
pub mod observer;
pub mod pending;
pub mod queue;

pub use manager::{ConnectReport, ConnectionHandle, ConnectionManager, ConnectionStatus, ManagerConfig};
pub use notifier::{LogNotifier, StatusNotifier};
pub use observer::{Observer, ObserverInbox, SerialListener};
pub use pending::{BufferKind, PendingEvents};
pub use queue::{DataBatch, EventQueue, SerialEvent};
