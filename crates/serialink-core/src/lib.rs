//! Core types shared by every serialink crate.
//!
//! This crate holds the vocabulary of the connection engine: the connection
//! state machine, serial line parameters, the failure causes carried inside
//! events, and the synchronous error taxonomy returned by `connect` and
//! `write`. Default timeouts and limits live in [`constants`].

pub mod constants;
pub mod error;
pub mod types;

pub use error::{LinkFault, OpenError, OpenWarning, WriteError};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
