use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// One submitted network configuration.
///
/// Rows are never updated. Every submission inserts a new row and the row
/// with the highest `id` is the active configuration.
///
/// The two (SSID, password) pairs feed the reconnect cycle: the primary pair
/// is tried first, the secondary pair is the fallback. Empty or missing SSIDs
/// mean "not configured".
///
/// # Examples
///
/// ```
/// use serialink_storage::models::NetworkSettings;
///
/// let settings = NetworkSettings::new()
///     .with_primary("office", "hunter2")
///     .with_secondary("guest", "");
///
/// assert_eq!(settings.primary_ssid(), Some("office"));
/// assert_eq!(settings.primary_password(), Some("hunter2"));
/// assert_eq!(settings.secondary_password(), None);
/// assert!(settings.dhcp_enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NetworkSettings {
    /// Auto-increment primary key, 0 until inserted
    pub id: i64,

    /// Static IPv4 address, empty when DHCP is used
    pub ip_address: String,

    /// Whether the address is obtained over DHCP
    pub dhcp_enabled: bool,

    /// Dotted-quad subnet mask
    pub subnet_mask: String,

    /// Default gateway
    pub gateway: String,

    /// Primary DNS server
    pub dns1: String,

    /// Secondary DNS server
    pub dns2: String,

    /// SSID tried first on link loss
    pub primary_ssid: Option<String>,

    /// SSID tried once the primary attempts are exhausted
    pub secondary_ssid: Option<String>,

    /// Credential for `primary_ssid`, stored as given
    pub primary_password: Option<String>,

    /// Credential for `secondary_ssid`, stored as given
    pub secondary_password: Option<String>,

    /// When the record was written
    pub created_at: DateTime<Utc>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSettings {
    /// Create an unsaved DHCP configuration without any SSIDs.
    pub fn new() -> Self {
        Self {
            id: 0,
            ip_address: String::new(),
            dhcp_enabled: true,
            subnet_mask: String::new(),
            gateway: String::new(),
            dns1: String::new(),
            dns2: String::new(),
            primary_ssid: None,
            secondary_ssid: None,
            primary_password: None,
            secondary_password: None,
            created_at: Utc::now(),
        }
    }

    /// Use a static address instead of DHCP.
    pub fn with_static_ip(
        mut self,
        ip_address: impl Into<String>,
        subnet_mask: impl Into<String>,
        gateway: impl Into<String>,
    ) -> Self {
        self.dhcp_enabled = false;
        self.ip_address = ip_address.into();
        self.subnet_mask = subnet_mask.into();
        self.gateway = gateway.into();
        self
    }

    /// Set both DNS servers.
    pub fn with_dns(mut self, dns1: impl Into<String>, dns2: impl Into<String>) -> Self {
        self.dns1 = dns1.into();
        self.dns2 = dns2.into();
        self
    }

    /// Set the primary SSID and its password.
    pub fn with_primary(mut self, ssid: impl Into<String>, password: impl Into<String>) -> Self {
        self.primary_ssid = Some(ssid.into());
        self.primary_password = Some(password.into());
        self
    }

    /// Set the fallback SSID and its password.
    pub fn with_secondary(mut self, ssid: impl Into<String>, password: impl Into<String>) -> Self {
        self.secondary_ssid = Some(ssid.into());
        self.secondary_password = Some(password.into());
        self
    }

    /// Primary SSID, if configured and non-empty.
    pub fn primary_ssid(&self) -> Option<&str> {
        non_empty(&self.primary_ssid)
    }

    /// Fallback SSID, if configured and non-empty.
    pub fn secondary_ssid(&self) -> Option<&str> {
        non_empty(&self.secondary_ssid)
    }

    /// Primary password, if configured and non-empty.
    pub fn primary_password(&self) -> Option<&str> {
        non_empty(&self.primary_password)
    }

    /// Fallback password, if configured and non-empty.
    pub fn secondary_password(&self) -> Option<&str> {
        non_empty(&self.secondary_password)
    }

    /// Check if the record has been persisted
    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    /// Check the address fields.
    ///
    /// A static configuration needs an IPv4 address and subnet mask. The
    /// gateway and DNS servers may be left empty, otherwise they must be
    /// IPv4 addresses too. Address fields are ignored under DHCP.
    pub fn validate(&self) -> StorageResult<()> {
        if !self.dhcp_enabled {
            require_ipv4("ip_address", &self.ip_address)?;
            require_ipv4("subnet_mask", &self.subnet_mask)?;
            optional_ipv4("gateway", &self.gateway)?;
        }
        optional_ipv4("dns1", &self.dns1)?;
        optional_ipv4("dns2", &self.dns2)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn require_ipv4(field: &'static str, value: &str) -> StorageResult<()> {
    value
        .trim()
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| StorageError::invalid_settings(field, value))
}

fn optional_ipv4(field: &'static str, value: &str) -> StorageResult<()> {
    if value.trim().is_empty() {
        return Ok(());
    }
    require_ipv4(field, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_is_unsaved_dhcp() {
        let settings = NetworkSettings::new();

        assert!(!settings.is_persisted());
        assert!(settings.dhcp_enabled);
        assert_eq!(settings.primary_ssid(), None);
        assert_eq!(settings.secondary_ssid(), None);
    }

    #[test]
    fn test_static_ip_disables_dhcp() {
        let settings = NetworkSettings::new()
            .with_static_ip("192.168.1.20", "255.255.255.0", "192.168.1.1")
            .with_dns("1.1.1.1", "8.8.8.8");

        assert!(!settings.dhcp_enabled);
        assert_eq!(settings.ip_address, "192.168.1.20");
        assert_eq!(settings.gateway, "192.168.1.1");
        assert_eq!(settings.dns2, "8.8.8.8");
    }

    #[test]
    fn test_dhcp_ignores_address_fields() {
        let settings = NetworkSettings {
            ip_address: "garbage".to_string(),
            ..NetworkSettings::new()
        };
        assert!(settings.validate().is_ok());
    }

    #[rstest]
    #[case("10.0.0.7", "255.255.255.0", "10.0.0.1", None)]
    #[case("10.0.0.7", "255.255.255.0", "", None)]
    #[case("", "255.255.255.0", "10.0.0.1", Some("ip_address"))]
    #[case("10.0.0.7", "/24", "10.0.0.1", Some("subnet_mask"))]
    #[case("10.0.0.7", "255.255.255.0", "router", Some("gateway"))]
    fn test_static_address_validation(
        #[case] ip: &str,
        #[case] mask: &str,
        #[case] gateway: &str,
        #[case] rejected: Option<&str>,
    ) {
        let result = NetworkSettings::new()
            .with_static_ip(ip, mask, gateway)
            .validate();

        match (result, rejected) {
            (Ok(()), None) => {}
            (Err(StorageError::InvalidSettings { field, .. }), Some(expected)) => {
                assert_eq!(field, expected)
            }
            (other, expected) => panic!("got {:?}, expected rejection of {:?}", other, expected),
        }
    }

    #[test]
    fn test_dns_must_be_ipv4_when_set() {
        let settings = NetworkSettings::new().with_dns("1.1.1.1", "dns.example");
        assert!(matches!(
            settings.validate(),
            Err(StorageError::InvalidSettings { field: "dns2", .. })
        ));
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some(""), None)]
    #[case(Some("   "), None)]
    #[case(Some("lab"), Some("lab"))]
    fn test_blank_ssid_is_unconfigured(#[case] raw: Option<&str>, #[case] expected: Option<&str>) {
        let settings = NetworkSettings {
            secondary_ssid: raw.map(str::to_string),
            ..NetworkSettings::new()
        };

        assert_eq!(settings.secondary_ssid(), expected);
    }
}
