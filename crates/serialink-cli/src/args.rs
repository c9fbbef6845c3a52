//! Command-line arguments.

use crate::terminal::NewlineMode;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serialink_core::constants::{CONNECTIVITY_POLL_INTERVAL_MS, DEFAULT_BAUD_RATE, WRITE_TIMEOUT_MS};
use serialink_core::{DataBits, FlowControl, Parity, SerialParameters, StopBits};
use serialink_storage::DEFAULT_DATABASE_PATH;
use serialink_transport::bluetooth::{BluetoothAddress, DEFAULT_RFCOMM_CHANNEL};
use serialink_transport::usb::PortSelector;

/// Serial terminal over USB and Bluetooth links.
#[derive(Debug, Parser)]
#[command(name = "serialink", author, version, about)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[arg(short = 'l', long, global = true, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// SQLite database holding the network settings
    #[arg(long = "db", global = true, default_value = DEFAULT_DATABASE_PATH, env = "SERIALINK_DB")]
    pub db_path: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List serial ports present on this machine
    List,

    /// Open a terminal session on a serial link
    Connect {
        #[command(flatten)]
        terminal: TerminalArgs,

        #[command(subcommand)]
        link: LinkArgs,
    },

    /// Read or write the persisted network settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Watch connectivity and reconnect to the configured networks on loss
    Monitor {
        /// Connectivity poll interval in milliseconds
        #[arg(long, default_value_t = CONNECTIVITY_POLL_INTERVAL_MS)]
        poll_interval_ms: u64,

        /// nmcli executable
        #[arg(long, default_value = "nmcli", env = "SERIALINK_NMCLI")]
        nmcli: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum LinkArgs {
    /// USB serial adapter
    Usb {
        /// Device path (/dev/ttyUSB0, COM3) or VID:PID[#INDEX] in hex
        port: PortSelector,

        #[command(flatten)]
        line: LineArgs,
    },

    /// Bluetooth serial-port-profile device bound to an RFCOMM TTY
    Bluetooth {
        /// Device address (00:11:22:33:44:55)
        address: BluetoothAddress,

        /// RFCOMM channel
        #[arg(long, default_value_t = DEFAULT_RFCOMM_CHANNEL)]
        channel: u8,

        /// RFCOMM TTY the device is bound to
        #[arg(long, default_value = "/dev/rfcomm0")]
        device: String,
    },
}

/// Terminal presentation options.
#[derive(Debug, Clone, Args)]
pub struct TerminalArgs {
    /// Line terminator for sent and received text
    #[arg(long, value_enum, default_value_t = NewlineMode::Cr)]
    pub newline: NewlineMode,

    /// Print received bytes as hex
    #[arg(long)]
    pub hex: bool,

    /// Bound for a single write, in milliseconds
    #[arg(long, default_value_t = WRITE_TIMEOUT_MS)]
    pub write_timeout_ms: u64,
}

/// Serial line parameters.
#[derive(Debug, Clone, Args)]
pub struct LineArgs {
    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Data bits per character
    #[arg(long, value_enum, default_value_t = DataBitsArg::Eight)]
    pub data_bits: DataBitsArg,

    /// Stop bits
    #[arg(long, value_enum, default_value_t = StopBitsArg::One)]
    pub stop_bits: StopBitsArg,

    /// Parity
    #[arg(long, value_enum, default_value_t = ParityArg::None)]
    pub parity: ParityArg,

    /// Flow control
    #[arg(long, value_enum, default_value_t = FlowControlArg::None)]
    pub flow_control: FlowControlArg,
}

impl LineArgs {
    /// Serial parameters for these options.
    pub fn parameters(&self) -> SerialParameters {
        SerialParameters::default()
            .with_baud_rate(self.baud)
            .with_data_bits(self.data_bits.into())
            .with_stop_bits(self.stop_bits.into())
            .with_parity(self.parity.into())
            .with_flow_control(self.flow_control.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DataBitsArg {
    #[value(name = "5")]
    Five,
    #[value(name = "6")]
    Six,
    #[value(name = "7")]
    Seven,
    #[value(name = "8")]
    Eight,
}

impl From<DataBitsArg> for DataBits {
    fn from(arg: DataBitsArg) -> Self {
        match arg {
            DataBitsArg::Five => DataBits::Five,
            DataBitsArg::Six => DataBits::Six,
            DataBitsArg::Seven => DataBits::Seven,
            DataBitsArg::Eight => DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StopBitsArg {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

impl From<StopBitsArg> for StopBits {
    fn from(arg: StopBitsArg) -> Self {
        match arg {
            StopBitsArg::One => StopBits::One,
            StopBitsArg::Two => StopBits::Two,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ParityArg {
    None,
    Odd,
    Even,
}

impl From<ParityArg> for Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => Parity::None,
            ParityArg::Odd => Parity::Odd,
            ParityArg::Even => Parity::Even,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlowControlArg {
    None,
    Software,
    Hardware,
}

impl From<FlowControlArg> for FlowControl {
    fn from(arg: FlowControlArg) -> Self {
        match arg {
            FlowControlArg::None => FlowControl::None,
            FlowControlArg::Software => FlowControl::Software,
            FlowControlArg::Hardware => FlowControl::Hardware,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print the active network settings
    Show,

    /// Store a new network settings record; it becomes the active one
    Save(SaveSettingsArgs),

    /// Show the addressing of the active link and the networks in range
    Detect {
        /// Store the detected addressing, keeping the saved SSIDs
        #[arg(long)]
        save: bool,

        /// nmcli executable
        #[arg(long, default_value = "nmcli", env = "SERIALINK_NMCLI")]
        nmcli: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct SaveSettingsArgs {
    /// Primary Wi-Fi network
    #[arg(long)]
    pub primary_ssid: Option<String>,

    /// Password of the primary network
    #[arg(long, default_value = "")]
    pub primary_password: String,

    /// Fallback Wi-Fi network
    #[arg(long)]
    pub secondary_ssid: Option<String>,

    /// Password of the fallback network
    #[arg(long, default_value = "")]
    pub secondary_password: String,

    /// Static address; DHCP is used when omitted
    #[arg(long, requires = "prefix")]
    pub ip: Option<String>,

    /// Prefix length of the static address
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=32))]
    pub prefix: Option<u8>,

    /// Default gateway of the static address
    #[arg(long, default_value = "")]
    pub gateway: String,

    /// Primary DNS server
    #[arg(long, default_value = "")]
    pub dns1: String,

    /// Secondary DNS server
    #[arg(long, default_value = "")]
    pub dns2: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_usb_connect() {
        let cli = Cli::try_parse_from([
            "serialink", "connect", "--newline", "cr-lf", "usb", "10c4:ea60#1", "--baud", "9600",
            "--parity", "even",
        ])
        .unwrap();

        let Command::Connect { terminal, link } = cli.command else {
            panic!("expected connect");
        };
        assert_eq!(terminal.newline, NewlineMode::CrLf);
        assert!(!terminal.hex);

        let LinkArgs::Usb { port, line } = link else {
            panic!("expected usb");
        };
        assert_eq!(
            port,
            PortSelector::UsbId {
                vid: 0x10c4,
                pid: 0xea60,
                index: 1
            }
        );
        let params = line.parameters();
        assert_eq!(params.baud_rate, 9600);
        assert_eq!(params.parity, Parity::Even);
        assert_eq!(params.data_bits, DataBits::Eight);
    }

    #[test]
    fn test_parse_bluetooth_connect() {
        let cli = Cli::try_parse_from([
            "serialink", "connect", "--hex", "bluetooth", "00:1A:7D:DA:71:13", "--channel", "3",
        ])
        .unwrap();

        let Command::Connect { terminal, link } = cli.command else {
            panic!("expected connect");
        };
        assert!(terminal.hex);
        let LinkArgs::Bluetooth {
            address,
            channel,
            device,
        } = link
        else {
            panic!("expected bluetooth");
        };
        assert_eq!(address.to_string(), "00:1A:7D:DA:71:13");
        assert_eq!(channel, 3);
        assert_eq!(device, "/dev/rfcomm0");
    }

    #[test]
    fn test_rejects_bad_bluetooth_address() {
        assert!(Cli::try_parse_from(["serialink", "connect", "bluetooth", "not-an-address"]).is_err());
    }

    #[test]
    fn test_parse_settings_detect() {
        let cli = Cli::try_parse_from(["serialink", "settings", "detect", "--save"]).unwrap();

        let Command::Settings(SettingsCommand::Detect { save, nmcli }) = cli.command else {
            panic!("expected settings detect");
        };
        assert!(save);
        assert_eq!(nmcli, "nmcli");
    }

    #[test]
    fn test_static_ip_requires_prefix() {
        assert!(Cli::try_parse_from(["serialink", "settings", "save", "--ip", "10.0.0.5"]).is_err());
        assert!(
            Cli::try_parse_from(["serialink", "settings", "save", "--ip", "10.0.0.5", "--prefix", "33"])
                .is_err()
        );
    }
}
