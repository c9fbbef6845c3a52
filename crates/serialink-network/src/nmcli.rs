//! NetworkManager-backed controller.
//!
//! Talks to NetworkManager through `nmcli` in terse mode (`-t`). Every
//! invocation runs under a timeout and is killed if the caller gives up.

use crate::controller::NetworkController;
use crate::details::LinkDetails;
use crate::error::NetworkError;
use crate::target::ReconnectTarget;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// Default bound on a single `nmcli` invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Device types that take priority over Wi-Fi.
const PRIORITY_DEVICE_TYPES: &[&str] = &["ethernet", "gsm", "cdma", "modem"];

/// [`NetworkController`] driving NetworkManager.
#[derive(Debug, Clone)]
pub struct NmcliController {
    program: String,
    command_timeout: Duration,
}

impl Default for NmcliController {
    fn default() -> Self {
        Self::new()
    }
}

impl NmcliController {
    /// Use `nmcli` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: "nmcli".to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use a different `nmcli` binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the bound on each invocation.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String, NetworkError> {
        let command = display_command(&self.program, args);
        trace!(%command, "Running nmcli");

        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.command_timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(NetworkError::command(command, e.to_string())),
            Err(_) => {
                return Err(NetworkError::CommandTimeout {
                    command,
                    timeout_ms: self.command_timeout.as_millis() as u64,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NetworkError::command(command, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn query(&self, args: &[&str]) -> Option<String> {
        match self.run(args).await {
            Ok(stdout) => Some(stdout),
            Err(e) => {
                debug!(error = %e, "nmcli query failed");
                None
            }
        }
    }
}

impl NetworkController for NmcliController {
    async fn has_priority_link(&self) -> bool {
        self.query(&["-t", "-f", "TYPE,STATE", "device"])
            .await
            .is_some_and(|stdout| parse_priority_link(&stdout))
    }

    async fn has_connectivity(&self) -> bool {
        self.query(&["networking", "connectivity", "check"])
            .await
            .is_some_and(|stdout| parse_connectivity(&stdout))
    }

    async fn scan(&self) -> Vec<String> {
        self.query(&["-t", "-f", "SSID", "device", "wifi", "list"])
            .await
            .map(|stdout| parse_ssids(&stdout))
            .unwrap_or_default()
    }

    async fn request(&self, target: &ReconnectTarget) -> Result<(), NetworkError> {
        // Submit without waiting; the coordinator polls for the link itself.
        let mut args = vec!["--wait", "0", "device", "wifi", "connect", target.ssid.as_str()];
        if let Some(password) = &target.password {
            args.extend(["password", password.as_str()]);
        }

        self.run(&args).await.map(|_| ()).map_err(|e| {
            warn!(ssid = %target.ssid, error = %e, "Network request rejected");
            NetworkError::request(&target.ssid, e.to_string())
        })
    }

    async fn is_connected_to(&self, ssid: &str) -> bool {
        self.query(&["-t", "-f", "ACTIVE,SSID", "device", "wifi", "list", "--rescan", "no"])
            .await
            .and_then(|stdout| parse_active_ssid(&stdout))
            .is_some_and(|active| active == ssid)
    }

    async fn link_details(&self) -> Option<LinkDetails> {
        let devices = self.query(&["-t", "-f", "DEVICE,TYPE,STATE", "device"]).await?;
        let device = parse_active_device(&devices)?;
        let shown = self
            .query(&["-t", "-f", "IP4,DHCP4", "device", "show", device.as_str()])
            .await?;

        let mut details = parse_device_show(&device, &shown);
        details.ssids = self.scan().await;
        Some(details)
    }
}

/// Command line as shown in logs and errors, with the secret after a
/// `password` argument masked.
fn display_command(program: &str, args: &[&str]) -> String {
    let mut shown = vec![program];
    let mut secret_next = false;
    for arg in args {
        shown.push(if secret_next { "***" } else { arg });
        secret_next = *arg == "password";
    }
    shown.join(" ")
}

/// Split a terse-mode line on unescaped `:` and undo `\:` / `\\` escapes.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_priority_link(stdout: &str) -> bool {
    stdout.lines().map(split_terse).any(|fields| {
        matches!(
            fields.as_slice(),
            [kind, state, ..] if PRIORITY_DEVICE_TYPES.contains(&kind.as_str()) && state == "connected"
        )
    })
}

fn parse_connectivity(stdout: &str) -> bool {
    matches!(stdout.trim(), "full" | "limited" | "portal")
}

fn parse_ssids(stdout: &str) -> Vec<String> {
    let mut ssids: Vec<String> = Vec::new();
    for ssid in stdout.lines().map(|line| split_terse(line).remove(0)) {
        if !ssid.is_empty() && !ssids.contains(&ssid) {
            ssids.push(ssid);
        }
    }
    ssids
}

fn parse_active_ssid(stdout: &str) -> Option<String> {
    stdout.lines().map(split_terse).find_map(|fields| match fields.as_slice() {
        [active, ssid, ..] if active == "yes" => Some(ssid.clone()),
        _ => None,
    })
}

/// First connected device other than loopback.
fn parse_active_device(stdout: &str) -> Option<String> {
    stdout.lines().map(split_terse).find_map(|fields| match fields.as_slice() {
        [device, kind, state, ..] if kind != "loopback" && state == "connected" => {
            Some(device.clone())
        }
        _ => None,
    })
}

/// Parse `device show` output for the IP4 and DHCP4 field groups.
fn parse_device_show(device: &str, stdout: &str) -> LinkDetails {
    let mut details = LinkDetails {
        device: device.to_string(),
        ..LinkDetails::default()
    };

    for fields in stdout.lines().map(split_terse) {
        let [key, value, ..] = fields.as_slice() else {
            continue;
        };
        // IP4.ADDRESS[1] -> IP4.ADDRESS
        let key = key.split('[').next().unwrap_or(key.as_str());

        match key {
            "IP4.ADDRESS" if details.ip_address.is_none() => {
                let (ip, prefix) = value.split_once('/').unwrap_or((value.as_str(), ""));
                details.ip_address = ip.parse().ok();
                details.prefix = prefix.parse::<u8>().ok().filter(|p| *p <= 32);
            }
            "IP4.GATEWAY" => details.gateway = value.parse().ok(),
            "IP4.DNS" => details.dns.extend(value.parse::<Ipv4Addr>().ok()),
            "DHCP4.OPTION" => details.dhcp_enabled = true,
            _ => {}
        }
    }

    details
}
