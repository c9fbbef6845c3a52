//! `serialink` command-line terminal.
//!
//! ```text
//! serialink list
//! serialink connect --newline cr-lf usb /dev/ttyUSB0 --baud 9600
//! serialink connect --hex bluetooth 00:1A:7D:DA:71:13 --device /dev/rfcomm0
//! serialink settings save --primary-ssid office --primary-password secret
//! serialink settings detect --save
//! serialink monitor
//! ```

mod args;
mod session;
mod terminal;

use anyhow::Context;
use args::{Cli, Command, LinkArgs, SaveSettingsArgs, SettingsCommand};
use clap::Parser;
use serialink_network::{
    LinkDetails, LinkMonitor, NetworkController, NmcliController, ReconnectCoordinator,
    ReconnectPolicy, subnet_mask, watch_connectivity,
};
use serialink_storage::models::NetworkSettings;
use serialink_storage::repositories::{NetworkSettingsRepository, SqliteNetworkSettingsRepository};
use serialink_storage::{Database, DatabaseConfig};
use serialink_transport::TransportTarget;
use serialink_transport::bluetooth::BluetoothTarget;
use serialink_transport::usb::UsbTarget;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).context("invalid log level")?)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::List => list_ports(),
        Command::Connect { terminal, link } => session::run(link_target(link), &terminal).await,
        Command::Settings(command) => settings(&cli.db_path, command).await,
        Command::Monitor {
            poll_interval_ms,
            nmcli,
        } => monitor(&cli.db_path, Duration::from_millis(poll_interval_ms), nmcli).await,
    }
}

fn link_target(link: LinkArgs) -> TransportTarget {
    match link {
        LinkArgs::Usb { port, line } => TransportTarget::Usb(UsbTarget {
            selector: port,
            parameters: line.parameters(),
        }),
        LinkArgs::Bluetooth {
            address,
            channel,
            device,
        } => TransportTarget::Bluetooth(
            BluetoothTarget::new(address)
                .with_channel(channel)
                .with_device(device),
        ),
    }
}

fn list_ports() -> anyhow::Result<()> {
    let ports = serialink_transport::available_ports()?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

async fn open_database(path: &str) -> anyhow::Result<Database> {
    Database::new(DatabaseConfig::new(path))
        .await
        .with_context(|| format!("failed to open database {}", path))
}

async fn settings(db_path: &str, command: SettingsCommand) -> anyhow::Result<()> {
    let db = open_database(db_path).await?;
    let repository = SqliteNetworkSettingsRepository::new(db.pool().clone());

    match command {
        SettingsCommand::Show => match repository.latest().await? {
            Some(settings) => print_settings(&settings),
            None => println!("no network settings saved"),
        },
        SettingsCommand::Save(args) => {
            let settings = settings_from_args(args)?;
            let id = repository.insert(&settings).await?;
            info!(id, "Network settings saved");
            println!("saved network settings #{}", id);
        }
        SettingsCommand::Detect { save, nmcli } => {
            let controller = NmcliController::new().with_program(nmcli);
            let details = controller
                .link_details()
                .await
                .context("no active network link")?;
            print_details(&details);

            if save {
                let settings = prefilled_settings(&details, repository.latest().await?);
                let id = repository.insert(&settings).await?;
                info!(id, device = %details.device, "Detected network settings saved");
                println!("saved network settings #{}", id);
            }
        }
    }

    db.close().await;
    Ok(())
}

fn settings_from_args(args: SaveSettingsArgs) -> anyhow::Result<NetworkSettings> {
    let mut settings = NetworkSettings::new().with_dns(args.dns1, args.dns2);

    if let Some(ip) = args.ip {
        let prefix = args.prefix.context("--prefix is required with --ip")?;
        let mask = subnet_mask(prefix).with_context(|| format!("invalid prefix length {}", prefix))?;
        settings = settings.with_static_ip(ip, mask.to_string(), args.gateway);
    }
    if let Some(ssid) = args.primary_ssid {
        settings = settings.with_primary(ssid, args.primary_password);
    }
    if let Some(ssid) = args.secondary_ssid {
        settings = settings.with_secondary(ssid, args.secondary_password);
    }

    Ok(settings)
}

/// Detected addressing with the SSIDs and passwords of `saved`.
fn prefilled_settings(details: &LinkDetails, saved: Option<NetworkSettings>) -> NetworkSettings {
    let mut settings = details.to_settings();
    if let Some(saved) = saved {
        if let Some(ssid) = saved.primary_ssid() {
            settings = settings.with_primary(ssid, saved.primary_password().unwrap_or_default());
        }
        if let Some(ssid) = saved.secondary_ssid() {
            settings = settings.with_secondary(ssid, saved.secondary_password().unwrap_or_default());
        }
    }
    settings
}

fn print_details(details: &LinkDetails) {
    println!("link:      {}", details);
    let dns: Vec<String> = details.dns.iter().map(|d| d.to_string()).collect();
    println!("dns:       {}", dns.join(" "));
    println!("in range:  {}", details.ssids.join(", "));
}

fn print_settings(settings: &NetworkSettings) {
    println!("id:        {}", settings.id);
    println!("saved at:  {}", settings.created_at.to_rfc3339());
    if settings.dhcp_enabled {
        println!("address:   dhcp");
    } else {
        println!(
            "address:   {} mask {} gateway {}",
            settings.ip_address, settings.subnet_mask, settings.gateway
        );
    }
    println!("dns:       {} {}", settings.dns1, settings.dns2);
    println!("primary:   {}", settings.primary_ssid().unwrap_or("-"));
    println!("fallback:  {}", settings.secondary_ssid().unwrap_or("-"));
}

async fn monitor(db_path: &str, poll_interval: Duration, nmcli: String) -> anyhow::Result<()> {
    let db = open_database(db_path).await?;
    let repository = SqliteNetworkSettingsRepository::new(db.pool().clone());

    let controller = NmcliController::new().with_program(nmcli);
    let policy = ReconnectPolicy::default().with_poll_interval(poll_interval);

    let (event_tx, event_rx) = mpsc::channel(8);
    let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let watcher = tokio::spawn(watch_connectivity(
        controller.clone(),
        poll_interval,
        event_tx,
        shutdown.clone(),
    ));
    let coordinator = ReconnectCoordinator::new(controller, policy);
    let monitor = tokio::spawn(
        LinkMonitor::new(coordinator, outcome_tx)
            .with_settings(repository)
            .run(event_rx, shutdown.clone()),
    );

    info!("Watching connectivity, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            outcome = outcome_rx.recv() => match outcome {
                Some(outcome) if outcome.is_success() => println!("{}", outcome),
                Some(outcome) => {
                    warn!(%outcome, "Connectivity not restored");
                    println!("{}", outcome);
                }
                None => break,
            },
        }
    }

    shutdown.cancel();
    watcher.await.context("connectivity watcher failed")?;
    monitor.await.context("link monitor failed")?;
    db.close().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save_args(extra: &[&str]) -> SaveSettingsArgs {
        let mut argv = vec!["serialink", "settings", "save"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Settings(SettingsCommand::Save(args)) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_settings_default_to_dhcp() {
        let settings = settings_from_args(save_args(&["--primary-ssid", "office"])).unwrap();

        assert!(settings.dhcp_enabled);
        assert_eq!(settings.primary_ssid(), Some("office"));
        assert_eq!(settings.primary_password(), None);
        assert_eq!(settings.secondary_ssid(), None);
    }

    #[test]
    fn test_settings_static_address() {
        let settings = settings_from_args(save_args(&[
            "--ip",
            "192.168.1.20",
            "--prefix",
            "24",
            "--gateway",
            "192.168.1.1",
            "--secondary-ssid",
            "backup",
            "--secondary-password",
            "pw",
        ]))
        .unwrap();

        assert!(!settings.dhcp_enabled);
        assert_eq!(settings.ip_address, "192.168.1.20");
        assert_eq!(settings.subnet_mask, "255.255.255.0");
        assert_eq!(settings.gateway, "192.168.1.1");
        assert_eq!(settings.secondary_password(), Some("pw"));
    }

    #[test]
    fn test_detected_addressing_keeps_saved_networks() {
        let details = LinkDetails {
            device: "eth0".to_string(),
            dhcp_enabled: false,
            ip_address: Some("10.0.0.5".parse().unwrap()),
            prefix: Some(16),
            gateway: Some("10.0.0.1".parse().unwrap()),
            dns: vec!["10.0.0.1".parse().unwrap()],
            ssids: vec!["cafe".to_string()],
        };
        let saved = NetworkSettings::new()
            .with_primary("office", "secret")
            .with_secondary("backup", "");

        let settings = prefilled_settings(&details, Some(saved));

        assert!(!settings.dhcp_enabled);
        assert_eq!(settings.ip_address, "10.0.0.5");
        assert_eq!(settings.subnet_mask, "255.255.0.0");
        assert_eq!(settings.dns1, "10.0.0.1");
        assert_eq!(settings.primary_ssid(), Some("office"));
        assert_eq!(settings.primary_password(), Some("secret"));
        assert_eq!(settings.secondary_ssid(), Some("backup"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_detected_dhcp_without_saved_record() {
        let details = LinkDetails {
            dhcp_enabled: true,
            ..LinkDetails::default()
        };

        let settings = prefilled_settings(&details, None);
        assert!(settings.dhcp_enabled);
        assert_eq!(settings.primary_ssid(), None);
    }

    #[test]
    fn test_link_target_for_bluetooth() {
        let cli = Cli::try_parse_from([
            "serialink",
            "connect",
            "bluetooth",
            "00:11:22:33:44:55",
            "--device",
            "/dev/rfcomm2",
        ])
        .unwrap();
        let Command::Connect { link, .. } = cli.command else {
            panic!("expected connect");
        };

        match link_target(link) {
            TransportTarget::Bluetooth(target) => {
                assert_eq!(target.device, "/dev/rfcomm2");
                assert_eq!(target.channel, 1);
            }
            other => panic!("unexpected target {:?}", other),
        }
    }
}
