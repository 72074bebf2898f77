// CLI entry point for the Connect Four matchmaking relay.
//
// Starts a standalone relay that game clients connect to, then acts as the
// console monitor: every connection or game event is printed together with
// the current counters (games, clients, waiting). See `server.rs` for the
// networking architecture.
//
// Usage:
//   relay [OPTIONS]
//     --config <FILE>       TOML config file (optional)
//     --bind <ADDR>         Listen address (default: 127.0.0.1)
//     --port <PORT>         Listen port (default: 5555)
//     --log-level <FILTER>  tracing filter when RUST_LOG is unset (default: info)
//
// Ctrl+C stops the relay cleanly: every connected peer is sent
// `DISCONNECT:server` before the process exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use connect_four_relay::RelayStats;
use connect_four_relay::config::RelayConfig;
use connect_four_relay::events::RelayEvent;
use connect_four_relay::server::{RelayHandle, start_relay};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Matchmaking and relay server for two-player Connect Four.
#[derive(Parser, Debug)]
#[command(name = "relay", version)]
struct Cli {
    /// TOML config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address.
    #[arg(long)]
    bind: Option<String>,

    /// Listen port (0 picks a free port).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter used when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RelayConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_target(false)
        .init();

    let (mut handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            error!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    info!("Relay listening on {addr}");
    println!("Press Ctrl+C to stop.");

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
        .context("installing Ctrl+C handler")?;

    let events = handle
        .take_events()
        .context("event channel already taken")?;
    monitor(&handle, &events, &running, |line| println!("{line}"));

    println!("\nShutting down...");
    handle.stop();
    Ok(())
}

/// How long the monitor waits for an event before rechecking `running`.
const MONITOR_POLL: Duration = Duration::from_millis(100);

/// Print each event with the current counters until `running` goes false.
fn monitor(
    handle: &RelayHandle,
    events: &Receiver<RelayEvent>,
    running: &AtomicBool,
    mut out: impl FnMut(String),
) {
    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(MONITOR_POLL) {
            Ok(event) => out(render(&event, handle.stats())),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn render(event: &RelayEvent, stats: RelayStats) -> String {
    let kind = match event {
        RelayEvent::Connection(_) => "conn",
        RelayEvent::Game(_) => "game",
    };
    format!(
        "[{kind}] {}  |  Games: {}  Clients: {}  Waiting: {}",
        event.text(),
        stats.sessions,
        stats.clients,
        stats.waiting
    )
}
