//! Interactive terminal session on one link.
//!
//! Lines typed on stdin are sent with the configured terminator; received
//! data is printed by a [`TerminalListener`] running on its own task. The
//! session ends on end of input, on Ctrl-C, or when the link goes down.

use crate::args::TerminalArgs;
use crate::terminal::{TerminalListener, outgoing_line, write_failure};
use anyhow::Context;
use serialink_core::ConnectionState;
use serialink_service::{ConnectionHandle, ConnectionManager, ManagerConfig, Observer};
use serialink_transport::TransportTarget;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

pub async fn run(target: TransportTarget, args: &TerminalArgs) -> anyhow::Result<()> {
    let config =
        ManagerConfig::default().with_write_timeout(Duration::from_millis(args.write_timeout_ms));
    let handle = ConnectionManager::new(config).start();

    let (observer, inbox) = Observer::channel();
    handle.attach(observer).await;

    let (newline, hex) = (args.newline, args.hex);
    let printer = tokio::spawn(async move {
        let mut listener = TerminalListener::new(std::io::stdout(), newline, hex);
        inbox.run(&mut listener).await;
    });

    let result = match handle.connect(target).await {
        Ok(report) => {
            info!(link = %report.name, "Terminal session started");
            for warning in &report.warnings {
                println!("-- {}", warning);
            }
            interact(&handle, args).await
        }
        Err(e) => Err(anyhow::Error::new(e)),
    };

    handle.shutdown().await;
    printer.await.context("terminal output task failed")?;

    result
}

async fn interact(handle: &ConnectionHandle, args: &TerminalArgs) -> anyhow::Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut status = handle.subscribe_status();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("Interrupted");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() || status.borrow_and_update().state == ConnectionState::Disconnected {
                    break;
                }
            }
            line = input.next_line() => {
                let Some(text) = line.context("failed to read stdin")? else {
                    break;
                };
                if let Err(e) = handle.write(&outgoing_line(&text, args.newline)).await {
                    let (message, drop_link) = write_failure(&e);
                    println!("-- {}", message);
                    if drop_link {
                        handle.disconnect().await;
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
