//! Bluetooth serial-port-profile transport.
//!
//! The link runs over an RFCOMM TTY (`/dev/rfcommN`) bound to the remote
//! device. Before opening, the kernel's binding of that TTY
//! (`/sys/class/tty/rfcommN/{address,channel}`) must match the target's
//! address and channel. RFCOMM ignores line parameters and has no modem
//! control lines, so neither is touched.

use crate::link::{LinkOptions, SerialLink};
use crate::traits::{EventSink, Transport};
use serialink_core::constants::BLUETOOTH_READ_BUFFER_SIZE;
use serialink_core::{OpenError, OpenWarning, WriteError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default RFCOMM channel of the serial port profile.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// A 48-bit Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BluetoothAddress([u8; 6]);

/// Error parsing a [`BluetoothAddress`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid bluetooth address '{0}': expected XX:XX:XX:XX:XX:XX")]
pub struct ParseAddressError(String);

impl BluetoothAddress {
    /// Create an address from raw bytes, most significant first.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl FromStr for BluetoothAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseAddressError(s.to_string());
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');

        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// A Bluetooth device to connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothTarget {
    /// Remote device address.
    pub address: BluetoothAddress,

    /// RFCOMM channel.
    pub channel: u8,

    /// RFCOMM TTY bound to the device.
    pub device: String,
}

impl BluetoothTarget {
    /// Target `address` through `/dev/rfcomm0` on the default channel.
    pub fn new(address: BluetoothAddress) -> Self {
        Self {
            address,
            channel: DEFAULT_RFCOMM_CHANNEL,
            device: "/dev/rfcomm0".to_string(),
        }
    }

    /// Set the RFCOMM channel.
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    /// Set the RFCOMM TTY path.
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Open the link. Blocking.
    pub(crate) fn open_blocking(
        &self,
    ) -> Result<(BluetoothTransport, Vec<OpenWarning>), OpenError> {
        if !(1..=30).contains(&self.channel) {
            return Err(OpenError::io(format!(
                "invalid RFCOMM channel {}",
                self.channel
            )));
        }

        #[cfg(target_os = "linux")]
        self.verify_binding(Path::new("/sys/class/tty"))?;

        let options = LinkOptions {
            parameters: None,
            control_lines: false,
            buffer_size: BLUETOOTH_READ_BUFFER_SIZE,
        };

        let (link, warnings) = SerialLink::open(self.address.to_string(), &self.device, options)?;
        Ok((BluetoothTransport { link }, warnings))
    }

    /// Check that the TTY is bound to this target's address and channel,
    /// reading the binding from `class_dir/<tty name>`.
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    fn verify_binding(&self, class_dir: &Path) -> Result<(), OpenError> {
        let name = Path::new(&self.device)
            .file_name()
            .ok_or_else(|| OpenError::device_not_found(&self.device))?;
        let attributes = class_dir.join(name);
        let read = |attribute: &str| {
            std::fs::read_to_string(attributes.join(attribute)).map(|value| value.trim().to_string())
        };

        let bound = read("address")
            .ok()
            .and_then(|address| address.parse::<BluetoothAddress>().ok())
            .ok_or_else(|| {
                OpenError::device_not_found(format!("{} is not an RFCOMM binding", self.device))
            })?;
        if bound != self.address {
            return Err(OpenError::device_not_found(format!(
                "{} is bound to {}, not {}",
                self.device, bound, self.address
            )));
        }

        if let Ok(channel) = read("channel")
            && channel.parse::<u8>().ok() != Some(self.channel)
        {
            return Err(OpenError::device_not_found(format!(
                "{} is bound to {} channel {}, not {}",
                self.device, bound, channel, self.channel
            )));
        }

        Ok(())
    }
}

/// An open Bluetooth serial link.
#[derive(Debug)]
pub struct BluetoothTransport {
    link: SerialLink,
}

impl Transport for BluetoothTransport {
    fn name(&self) -> &str {
        self.link.name()
    }

    async fn write(&self, data: &[u8], timeout: Duration) -> Result<(), WriteError> {
        self.link.write(data, timeout).await
    }

    fn start(&self, sink: EventSink) {
        self.link.start(sink);
    }

    async fn close(&self) {
        self.link.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_address_round_trip() {
        let address: BluetoothAddress = "00:1a:7d:DA:71:13".parse().unwrap();
        assert_eq!(address.as_bytes(), &[0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]);
        assert_eq!(address.to_string(), "00:1A:7D:DA:71:13");
    }

    #[rstest]
    #[case("")]
    #[case("00:1A:7D:DA:71")]
    #[case("00:1A:7D:DA:71:13:FF")]
    #[case("001A:7D:DA:71:13")]
    #[case("GG:1A:7D:DA:71:13")]
    fn test_address_invalid(#[case] input: &str) {
        assert!(input.parse::<BluetoothAddress>().is_err());
    }

    fn bound_tty(address: &str, channel: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let tty = dir.path().join("rfcomm0");
        std::fs::create_dir(&tty).unwrap();
        std::fs::write(tty.join("address"), format!("{}\n", address)).unwrap();
        std::fs::write(tty.join("channel"), format!("{}\n", channel)).unwrap();
        dir
    }

    fn target() -> BluetoothTarget {
        BluetoothTarget::new("00:1A:7D:DA:71:13".parse().unwrap()).with_channel(3)
    }

    #[test]
    fn test_binding_matches_address_and_channel() {
        let class_dir = bound_tty("00:1a:7d:da:71:13", "3");
        assert!(target().verify_binding(class_dir.path()).is_ok());
    }

    #[rstest]
    #[case("11:22:33:44:55:66", "3")]
    #[case("00:1a:7d:da:71:13", "1")]
    fn test_binding_to_another_device_rejected(#[case] address: &str, #[case] channel: &str) {
        let class_dir = bound_tty(address, channel);
        assert!(matches!(
            target().verify_binding(class_dir.path()),
            Err(OpenError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_unbound_tty_rejected() {
        let class_dir = tempfile::tempdir().unwrap();
        let err = target()
            .with_device("/dev/rfcomm7")
            .verify_binding(class_dir.path())
            .unwrap_err();

        assert!(matches!(err, OpenError::DeviceNotFound(_)));
        assert!(err.to_string().contains("/dev/rfcomm7"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_open_requires_binding() {
        let target = target().with_device("/dev/serialink-missing-rfcomm");
        assert!(matches!(target.open_blocking(), Err(OpenError::DeviceNotFound(_))));
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let target = BluetoothTarget::new(BluetoothAddress::new([1, 2, 3, 4, 5, 6])).with_channel(0);
        assert!(matches!(target.open_blocking(), Err(OpenError::Io(_))));
    }
}
