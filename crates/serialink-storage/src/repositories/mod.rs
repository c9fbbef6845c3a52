mod network_settings;

pub use network_settings::{NetworkSettingsRepository, SqliteNetworkSettingsRepository};
