//! RadioLink command-line host.
//!
//! Drives a discovery session and a link controller against the radio
//! described in the config file.  Without a config file the built-in
//! simulated radio offers two demo peers.
//!
//! # Usage
//!
//! ```text
//! radiolink [--config <PATH>] [--log-level <FILTER>] <COMMAND>
//!
//! Commands:
//!   scan     [--window <SECS>]                 Print peers as they are found
//!   connect  <ADDRESS> [--hold <SECS>]          Connect, hold the link, disconnect
//!   session  [--pick <INDEX>] [--hold <SECS>]   Scan, pick a peer, connect to it
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable              | Description                               |
//! |-----------------------|-------------------------------------------|
//! | `RADIOLINK_CONFIG`    | Config file path                          |
//! | `RADIOLINK_LOG_LEVEL` | Log filter when `RUST_LOG` is not set     |
//! | `RUST_LOG`            | Full `tracing` filter, wins over the rest |
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config, init logging
//!  └─ SimulatedRadio::from_config()
//!       ├─ DiscoverySession   (scan thread -> DiscoveryEvent channel)
//!       └─ LinkController
//!            └─ ConnectionManager (link worker thread -> state channel)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use radiolink_core::{ConnectionState, PeerAddress, PeerIdentity};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use radiolink_host::application::manage_link::LinkController;
use radiolink_host::infrastructure::logging::init_logging;
use radiolink_host::infrastructure::network::connection_manager::ChannelObserver;
use radiolink_host::infrastructure::network::discovery::{DiscoveryEvent, DiscoverySession};
use radiolink_host::infrastructure::radio::simulated::SimulatedRadio;
use radiolink_host::infrastructure::storage::config::{
    load_config, load_config_from, AppConfig, ConfigError,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Scan for nearby radio peers and manage a single link to one of them.
#[derive(Debug, Parser)]
#[command(name = "radiolink", version)]
struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, global = true, env = "RADIOLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is not set (e.g. `debug`).
    #[arg(long, global = true, env = "RADIOLINK_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan for peers and print each one as it is found.
    Scan {
        /// Scan window in seconds.
        #[arg(long)]
        window: Option<u64>,
    },
    /// Connect to a peer by address, hold the link, then disconnect.
    Connect {
        /// Peer address, e.g. `00:1A:7D:DA:71:13`.
        address: String,
        /// Seconds to keep the link open.
        #[arg(long, default_value_t = 5)]
        hold: u64,
    },
    /// Scan, pick a peer from the results, then connect to it.
    Session {
        /// Index of the peer to connect to, in the order peers were found.
        #[arg(long, default_value_t = 0)]
        pick: usize,
        /// Seconds to keep the link open.
        #[arg(long, default_value_t = 5)]
        hold: u64,
        /// Scan window in seconds.
        #[arg(long)]
        window: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config().or_else(|e| match e {
            ConfigError::NoPlatformConfigDir => Ok(AppConfig::default()),
            other => Err(other),
        }),
    }
    .context("failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    init_logging(&config.general.log_level)?;

    info!("RadioLink starting");

    match cli.command {
        Command::Scan { window } => {
            if let Some(secs) = window {
                config.scan.window_secs = secs;
            }
            let radio = SimulatedRadio::from_config(&config);
            run_scan(&radio, None).await?;
        }
        Command::Connect { address, hold } => {
            let address = PeerAddress::new(&address).context("invalid peer address")?;
            let radio = SimulatedRadio::from_config(&config);
            let peer = radio
                .peers()
                .iter()
                .map(|p| p.identity().clone())
                .find(|p| p.address() == &address)
                .unwrap_or_else(|| PeerIdentity::unnamed(address));
            run_link(&radio, &config, peer, Duration::from_secs(hold)).await?;
        }
        Command::Session { pick, hold, window } => {
            if let Some(secs) = window {
                config.scan.window_secs = secs;
            }
            let radio = SimulatedRadio::from_config(&config);
            let peers = run_scan(&radio, Some(pick)).await?;
            let Some(peer) = peers.get(pick).cloned() else {
                bail!("no peer at index {pick}; the scan found {}", peers.len());
            };
            println!("selected {peer}");
            run_link(&radio, &config, peer, Duration::from_secs(hold)).await?;
        }
    }

    info!("RadioLink stopped");
    Ok(())
}

/// Runs one scan and prints peers as they are found.
///
/// With `stop_at`, the scan is cancelled as soon as the peer at that index
/// shows up.  Returns the results in first-seen order.
async fn run_scan(
    radio: &SimulatedRadio,
    stop_at: Option<usize>,
) -> anyhow::Result<Vec<PeerIdentity>> {
    let (session, mut events) =
        DiscoverySession::new(Arc::new(radio.clone())).context("cannot start discovery")?;
    session.start_scan().context("cannot start discovery")?;
    println!("scanning...");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(DiscoveryEvent::PeerFound { index, peer }) => {
                    println!("{index:>3}  {}  {}", peer.address(), peer.display_label());
                    if stop_at == Some(index) {
                        session.stop_scan();
                    }
                }
                Some(DiscoveryEvent::ScanFinished { peer_count }) => {
                    println!("scan finished: {peer_count} peer(s)");
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; cancelling scan");
                session.stop_scan();
            }
        }
    }

    Ok(session.peers())
}

/// Connects to `peer`, holds the link for `hold`, then disconnects.
///
/// Ctrl-C ends the hold early.  Returns once the link reports
/// `Disconnected`.
async fn run_link(
    radio: &SimulatedRadio,
    config: &AppConfig,
    peer: PeerIdentity,
    hold: Duration,
) -> anyhow::Result<()> {
    let (tx, mut states) = mpsc::unbounded_channel();
    let mut controller = LinkController::new(
        radio,
        Arc::new(radio.clone()),
        config.link.service_uuid,
        Arc::new(ChannelObserver::new(tx)),
    )
    .context("cannot open a link")?;

    controller.select_peer(peer);
    if !controller.connect()? {
        bail!("connect was not started");
    }

    // Far enough away to never fire while no hold is running.
    let idle = Duration::from_secs(24 * 60 * 60);
    let mut hold_until: Option<Instant> = None;
    let mut stop_requested = false;

    loop {
        let deadline = hold_until.unwrap_or_else(|| Instant::now() + idle);
        tokio::select! {
            state = states.recv() => {
                let Some(state) = state else { break };
                println!("state: {state}");
                controller.on_state_changed(state);
                match state {
                    ConnectionState::Connected if stop_requested => controller.disconnect(),
                    ConnectionState::Connected => hold_until = Some(Instant::now() + hold),
                    ConnectionState::Disconnected => break,
                    _ => {}
                }
            }
            _ = tokio::time::sleep_until(deadline), if hold_until.is_some() => {
                hold_until = None;
                controller.disconnect();
            }
            _ = tokio::signal::ctrl_c() => {
                stop_requested = true;
                if controller.can_disconnect() {
                    hold_until = None;
                    controller.disconnect();
                } else {
                    warn!("connect in progress; disconnecting once it completes");
                }
            }
        }
    }

    Ok(())
}
