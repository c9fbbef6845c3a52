mod network_settings;

pub use network_settings::NetworkSettings;
