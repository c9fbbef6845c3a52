//! Addressing of the active link, used to pre-fill network settings.

use crate::target::subnet_mask;
use serde::{Deserialize, Serialize};
use serialink_storage::models::NetworkSettings;
use std::fmt;
use std::net::Ipv4Addr;

/// Prefix length assumed when the platform reports an address without one.
pub const DEFAULT_PREFIX_LENGTH: u8 = 24;

/// IPv4 configuration of the active link and the networks in range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDetails {
    /// Interface carrying the link.
    pub device: String,

    /// The address was leased over DHCP.
    pub dhcp_enabled: bool,

    pub ip_address: Option<Ipv4Addr>,

    /// Prefix length of `ip_address`.
    pub prefix: Option<u8>,

    pub gateway: Option<Ipv4Addr>,

    /// DNS servers in order of preference.
    pub dns: Vec<Ipv4Addr>,

    /// SSIDs currently visible.
    pub ssids: Vec<String>,
}

impl LinkDetails {
    /// Subnet mask of the address, assuming a /24 when the prefix is unknown.
    pub fn subnet_mask(&self) -> Ipv4Addr {
        subnet_mask(self.prefix.unwrap_or(DEFAULT_PREFIX_LENGTH))
            .unwrap_or(Ipv4Addr::new(255, 255, 255, 0))
    }

    /// An unsaved settings record carrying this addressing and no SSIDs.
    ///
    /// A DHCP lease yields a DHCP record; anything else is recorded as a
    /// static address.
    ///
    /// ```
    /// use serialink_network::LinkDetails;
    /// use std::net::Ipv4Addr;
    ///
    /// let details = LinkDetails {
    ///     ip_address: Some(Ipv4Addr::new(10, 0, 0, 7)),
    ///     prefix: Some(16),
    ///     ..LinkDetails::default()
    /// };
    ///
    /// let settings = details.to_settings();
    /// assert!(!settings.dhcp_enabled);
    /// assert_eq!(settings.subnet_mask, "255.255.0.0");
    /// ```
    pub fn to_settings(&self) -> NetworkSettings {
        let mut settings = NetworkSettings::new().with_dns(self.dns_at(0), self.dns_at(1));

        if !self.dhcp_enabled
            && let Some(ip) = self.ip_address
        {
            settings = settings.with_static_ip(
                ip.to_string(),
                self.subnet_mask().to_string(),
                self.gateway.map(|g| g.to_string()).unwrap_or_default(),
            );
        }

        settings
    }

    fn dns_at(&self, index: usize) -> String {
        self.dns.get(index).map(|d| d.to_string()).unwrap_or_default()
    }
}

impl fmt::Display for LinkDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ip = self
            .ip_address
            .map_or_else(|| "0.0.0.0".to_string(), |ip| ip.to_string());
        let gateway = self.gateway.map(|g| g.to_string()).unwrap_or_default();

        write!(
            f,
            "{} {} {}/{} gateway {}",
            self.device,
            if self.dhcp_enabled { "dhcp" } else { "static" },
            ip,
            self.subnet_mask(),
            gateway
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leased() -> LinkDetails {
        LinkDetails {
            device: "wlan0".to_string(),
            dhcp_enabled: true,
            ip_address: Some(Ipv4Addr::new(192, 168, 1, 20)),
            prefix: Some(24),
            gateway: Some(Ipv4Addr::new(192, 168, 1, 1)),
            dns: vec![Ipv4Addr::new(1, 1, 1, 1)],
            ssids: vec!["office".to_string()],
        }
    }

    #[test]
    fn test_dhcp_lease_prefills_dhcp_record() {
        let settings = leased().to_settings();

        assert!(settings.dhcp_enabled);
        assert_eq!(settings.ip_address, "");
        assert_eq!(settings.dns1, "1.1.1.1");
        assert_eq!(settings.dns2, "");
    }

    #[test]
    fn test_static_address_prefills_static_record() {
        let details = LinkDetails {
            dhcp_enabled: false,
            prefix: None,
            ..leased()
        };
        let settings = details.to_settings();

        assert!(!settings.dhcp_enabled);
        assert_eq!(settings.ip_address, "192.168.1.20");
        assert_eq!(settings.subnet_mask, "255.255.255.0");
        assert_eq!(settings.gateway, "192.168.1.1");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            leased().to_string(),
            "wlan0 dhcp 192.168.1.20/255.255.255.0 gateway 192.168.1.1"
        );
    }
}
