//! Common types shared across the connection engine.
//!
//! This module defines the connection state machine and the serial line
//! parameters used by every transport.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::DEFAULT_BAUD_RATE;

/// Connection state owned by the connection manager.
///
/// # Valid Transitions
///
/// - Disconnected → Pending (connect attempt starts)
/// - Pending → Connected (transport open succeeded)
/// - Pending → Disconnected (open failed, or explicit disconnect)
/// - Connected → Disconnected (explicit disconnect or I/O error)
///
/// # Examples
///
/// ```
/// use serialink_core::ConnectionState;
///
/// assert!(ConnectionState::Disconnected.can_transition_to(&ConnectionState::Pending));
/// assert!(!ConnectionState::Disconnected.can_transition_to(&ConnectionState::Connected));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport is open.
    #[default]
    Disconnected,

    /// A connection attempt is in flight.
    Pending,

    /// The transport is open and events flow.
    Connected,
}

impl ConnectionState {
    /// Check if transition to target state is valid from this state.
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        matches!(
            (self, target),
            (ConnectionState::Disconnected, ConnectionState::Pending)
                | (ConnectionState::Pending, ConnectionState::Connected)
                | (
                    ConnectionState::Pending | ConnectionState::Connected,
                    ConnectionState::Disconnected
                )
        )
    }

    /// Check if the state is `Connected`.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Pending => "Pending",
            ConnectionState::Connected => "Connected",
        };
        write!(f, "{}", state_str)
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

/// Serial line parameters applied after a port is opened.
///
/// Defaults to 115200 baud, 8 data bits, 1 stop bit, no parity and no
/// flow control.
///
/// # Examples
///
/// ```
/// use serialink_core::{Parity, SerialParameters};
///
/// let params = SerialParameters::default()
///     .with_baud_rate(9600)
///     .with_parity(Parity::Even);
///
/// assert_eq!(params.baud_rate, 9600);
/// assert_eq!(params.parity, Parity::Even);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialParameters {
    /// Line speed in bits per second.
    pub baud_rate: u32,

    /// Data bits per character.
    pub data_bits: DataBits,

    /// Stop bits per character.
    pub stop_bits: StopBits,

    /// Parity mode.
    pub parity: Parity,

    /// Flow control mode.
    pub flow_control: FlowControl,
}

impl Default for SerialParameters {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialParameters {
    /// Set the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the data bits.
    pub fn with_data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Set the stop bits.
    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set the parity mode.
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set the flow control mode.
    pub fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }
}

impl fmt::Display for SerialParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = match self.data_bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(f, "{} {}{}{}", self.baud_rate, data, parity, stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ConnectionState::Disconnected, ConnectionState::Pending, true)]
    #[case(ConnectionState::Pending, ConnectionState::Connected, true)]
    #[case(ConnectionState::Pending, ConnectionState::Disconnected, true)]
    #[case(ConnectionState::Connected, ConnectionState::Disconnected, true)]
    #[case(ConnectionState::Disconnected, ConnectionState::Connected, false)]
    #[case(ConnectionState::Connected, ConnectionState::Pending, false)]
    #[case(ConnectionState::Disconnected, ConnectionState::Disconnected, false)]
    fn test_connection_state_transitions(
        #[case] from: ConnectionState,
        #[case] to: ConnectionState,
        #[case] valid: bool,
    ) {
        assert_eq!(from.can_transition_to(&to), valid);
    }

    #[test]
    fn test_connection_state_default() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::default().is_connected());
    }

    #[test]
    fn test_connection_state_serialization() {
        let json = serde_json::to_string(&ConnectionState::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }

    #[test]
    fn test_serial_parameters_display() {
        assert_eq!(SerialParameters::default().to_string(), "115200 8N1");

        let params = SerialParameters::default()
            .with_baud_rate(9600)
            .with_data_bits(DataBits::Seven)
            .with_parity(Parity::Even)
            .with_stop_bits(StopBits::Two);
        assert_eq!(params.to_string(), "9600 7E2");
    }
}
