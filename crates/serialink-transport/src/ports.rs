//! Serial port enumeration.

use serde::Serialize;
use serialink_core::OpenError;
use std::fmt;

/// A serial port present on the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Device path.
    pub path: String,

    /// Kind of port, with USB metadata when known.
    pub kind: PortKind,
}

/// Kind of serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PortKind {
    /// USB serial adapter.
    Usb {
        vid: u16,
        pid: u16,
        serial_number: Option<String>,
        manufacturer: Option<String>,
        product: Option<String>,
    },
    /// Bluetooth serial link.
    Bluetooth,
    /// PCI serial card.
    Pci,
    /// Anything else.
    Unknown,
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PortKind::Usb {
                vid,
                pid,
                manufacturer,
                product,
                ..
            } => {
                write!(f, "{}  usb {:04x}:{:04x}", self.path, vid, pid)?;
                if let Some(manufacturer) = manufacturer {
                    write!(f, "  {}", manufacturer)?;
                }
                if let Some(product) = product {
                    write!(f, "  {}", product)?;
                }
                Ok(())
            }
            PortKind::Bluetooth => write!(f, "{}  bluetooth", self.path),
            PortKind::Pci => write!(f, "{}  pci", self.path),
            PortKind::Unknown => write!(f, "{}", self.path),
        }
    }
}

/// List the serial ports present on the system, sorted by path.
pub fn available_ports() -> Result<Vec<PortInfo>, OpenError> {
    let ports = serialport::available_ports()
        .map_err(|e| OpenError::io(format!("port enumeration failed: {}", e)))?;

    let mut ports: Vec<PortInfo> = ports
        .into_iter()
        .map(|port| PortInfo {
            path: port.port_name,
            kind: match port.port_type {
                serialport::SerialPortType::UsbPort(info) => PortKind::Usb {
                    vid: info.vid,
                    pid: info.pid,
                    serial_number: info.serial_number,
                    manufacturer: info.manufacturer,
                    product: info.product,
                },
                serialport::SerialPortType::BluetoothPort => PortKind::Bluetooth,
                serialport::SerialPortType::PciPort => PortKind::Pci,
                _ => PortKind::Unknown,
            },
        })
        .collect();

    ports.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(ports)
}
