//! USB serial transport.
//!
//! A USB target is selected either by device path (`/dev/ttyUSB0`, `COM3`)
//! or by USB vendor/product id plus the index of the port on that device,
//! for adapters that expose several serial ports.

use crate::link::{LinkOptions, SerialLink};
use crate::traits::{EventSink, Transport};
use serialink_core::constants::USB_READ_BUFFER_SIZE;
use serialink_core::{OpenError, OpenWarning, SerialParameters, WriteError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// How a USB serial port is located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortSelector {
    /// Operating system device path.
    Path(String),

    /// USB vendor/product id and the port index on that device.
    UsbId {
        /// USB vendor id.
        vid: u16,
        /// USB product id.
        pid: u16,
        /// Zero-based port index on the device.
        index: usize,
    },
}

/// Error parsing a [`PortSelector`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid port selector '{0}': expected a device path or VID:PID[#INDEX]")]
pub struct ParseSelectorError(String);

impl FromStr for PortSelector {
    type Err = ParseSelectorError;

    /// Parse `VID:PID[#INDEX]` (hex ids) or fall back to a device path.
    ///
    /// ```
    /// use serialink_transport::usb::PortSelector;
    ///
    /// let selector: PortSelector = "10c4:ea60#1".parse().unwrap();
    /// assert_eq!(selector, PortSelector::UsbId { vid: 0x10c4, pid: 0xea60, index: 1 });
    ///
    /// let selector: PortSelector = "/dev/ttyACM0".parse().unwrap();
    /// assert_eq!(selector, PortSelector::Path("/dev/ttyACM0".to_string()));
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseSelectorError(s.to_string()));
        }

        let looks_like_id = !s.contains('/')
            && !s.contains('\\')
            && s.split_once(':')
                .is_some_and(|(vid, _)| vid.len() == 4);

        if !looks_like_id {
            return Ok(Self::Path(s.to_string()));
        }

        let invalid = || ParseSelectorError(s.to_string());
        let (ids, index) = match s.split_once('#') {
            Some((ids, index)) => (ids, index.parse::<usize>().map_err(|_| invalid())?),
            None => (s, 0),
        };
        let (vid, pid) = ids.split_once(':').ok_or_else(invalid)?;
        let vid = u16::from_str_radix(vid, 16).map_err(|_| invalid())?;
        let pid = u16::from_str_radix(pid, 16).map_err(|_| invalid())?;

        Ok(Self::UsbId { vid, pid, index })
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path),
            Self::UsbId { vid, pid, index } => write!(f, "{:04x}:{:04x}#{}", vid, pid, index),
        }
    }
}

/// A USB serial port to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbTarget {
    /// Port selection.
    pub selector: PortSelector,

    /// Line parameters applied after open.
    pub parameters: SerialParameters,
}

impl UsbTarget {
    /// Target the port at `path` with default parameters.
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            selector: PortSelector::Path(path.into()),
            parameters: SerialParameters::default(),
        }
    }

    /// Target port `index` of the USB device `vid:pid`.
    pub fn usb_id(vid: u16, pid: u16, index: usize) -> Self {
        Self {
            selector: PortSelector::UsbId { vid, pid, index },
            parameters: SerialParameters::default(),
        }
    }

    /// Set the line parameters.
    pub fn with_parameters(mut self, parameters: SerialParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Resolve the selector to a device path.
    fn resolve(&self) -> Result<String, OpenError> {
        match &self.selector {
            PortSelector::Path(path) => Ok(path.clone()),
            PortSelector::UsbId { vid, pid, index } => {
                let ports = serialport::available_ports()
                    .map_err(|e| OpenError::io(format!("port enumeration failed: {}", e)))?;

                let mut matching: Vec<String> = ports
                    .into_iter()
                    .filter_map(|port| match port.port_type {
                        serialport::SerialPortType::UsbPort(info)
                            if info.vid == *vid && info.pid == *pid =>
                        {
                            Some(port.port_name)
                        }
                        _ => None,
                    })
                    .collect();

                if matching.is_empty() {
                    return Err(OpenError::device_not_found(self.selector.to_string()));
                }

                matching.sort();
                debug!(selector = %self.selector, ports = ?matching, "Resolved USB ports");

                if *index >= matching.len() {
                    return Err(OpenError::device_not_found(format!(
                        "{}: not enough ports at device",
                        self.selector
                    )));
                }

                Ok(matching.swap_remove(*index))
            }
        }
    }

    /// Open the port. Blocking.
    pub(crate) fn open_blocking(&self) -> Result<(UsbTransport, Vec<OpenWarning>), OpenError> {
        let path = self.resolve()?;
        let options = LinkOptions {
            parameters: Some(self.parameters),
            control_lines: true,
            buffer_size: USB_READ_BUFFER_SIZE,
        };

        let (link, warnings) = SerialLink::open(path.clone(), &path, options)?;
        Ok((UsbTransport { link }, warnings))
    }
}

/// An open USB serial port.
#[derive(Debug)]
pub struct UsbTransport {
    link: SerialLink,
}

impl Transport for UsbTransport {
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

    #[rstest]
    #[case("0403:6001", PortSelector::UsbId { vid: 0x0403, pid: 0x6001, index: 0 })]
    #[case("0403:6011#3", PortSelector::UsbId { vid: 0x0403, pid: 0x6011, index: 3 })]
    #[case("/dev/ttyUSB0", PortSelector::Path("/dev/ttyUSB0".to_string()))]
    #[case("COM7", PortSelector::Path("COM7".to_string()))]
    fn test_parse_selector(#[case] input: &str, #[case] expected: PortSelector) {
        assert_eq!(input.parse::<PortSelector>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("zzzz:6001")]
    #[case("0403:6001#x")]
    fn test_parse_selector_invalid(#[case] input: &str) {
        assert!(input.parse::<PortSelector>().is_err());
    }

    #[test]
    fn test_selector_display() {
        let selector = PortSelector::UsbId {
            vid: 0x10c4,
            pid: 0xea60,
            index: 2,
        };
        assert_eq!(selector.to_string(), "10c4:ea60#2");
    }

    #[test]
    fn test_missing_path_is_device_not_found() {
        let target = UsbTarget::path("/dev/serialink-does-not-exist");
        let err = target.open_blocking().unwrap_err();
        assert!(matches!(err, OpenError::DeviceNotFound(_)), "got {err:?}");
    }
}
