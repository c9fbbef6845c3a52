//! Persistent status indicator.
//!
//! While the connection stays up with no observer attached, the user still
//! needs to see that a link is held open. The manager raises an indicator
//! through [`StatusNotifier`] on detach and clears it on attach or
//! disconnect.

use tracing::info;

/// Outward-facing indicator raised while a connection runs unobserved.
pub trait StatusNotifier: Send + Sync {
    /// Show or update the indicator.
    fn show(&self, text: &str);

    /// Remove the indicator. Safe to call when nothing is shown.
    fn clear(&self);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl StatusNotifier for LogNotifier {
    fn show(&self, text: &str) {
        info!(indicator = %text, "Status indicator raised");
    }

    fn clear(&self) {
        tracing::debug!("Status indicator cleared");
    }
}

/// Indicator text while connected to `name`.
pub(crate) fn connected_text(name: &str) -> String {
    format!("Connected to {}", name)
}
