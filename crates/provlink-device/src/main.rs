//! Provisioning link device binary.
//!
//! Runs the device endpoint over a UDP rendition of the datagram link. The
//! business collaborators behind `apply` (WiFi/MQTT reconfiguration) are
//! external to this crate; the driver logs the configuration snapshot where
//! a firmware build would hand it to them. `reboot` ends the process after
//! the ack drains, standing in for a system restart.
//!
//! # Usage
//!
//! ```bash
//! provlink-device --bind 0.0.0.0:7421 \
//!     --peer AA:BB:CC:DD:EE:00=127.0.0.1:7420 \
//!     --store device.redb --token changeme
//! ```

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use provlink_core::{Environment, Link, PeerAddr, SystemEnv, UdpLink};
use provlink_device::{
    ConfigSlot, ConfigStore, DeviceAction, DeviceEndpoint, DeviceError, MemoryStore, RedbStore,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Provisioning link device endpoint
#[derive(Parser, Debug)]
#[command(name = "provlink-device")]
#[command(about = "Provisioning link device endpoint")]
#[command(version)]
struct Args {
    /// Address to bind the datagram link to
    #[arg(short, long, default_value = "0.0.0.0:7421")]
    bind: SocketAddr,

    /// Peer table entry `AA:BB:CC:DD:EE:00=127.0.0.1:7420` (repeatable)
    #[arg(long = "peer", value_name = "ADDR=SOCKADDR")]
    peers: Vec<String>,

    /// Shared authorization token; persisted into the store when given
    #[arg(long)]
    token: Option<String>,

    /// Path to the redb config store; omit for an in-memory store
    #[arg(long)]
    store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_peer_entry(entry: &str) -> Result<(PeerAddr, SocketAddr), DeviceError> {
    let (peer, addr) = entry
        .split_once('=')
        .ok_or_else(|| DeviceError::Config(format!("peer entry {entry:?}: expected ADDR=SOCKADDR")))?;
    let peer = peer
        .parse()
        .map_err(|e| DeviceError::Config(format!("peer entry {entry:?}: {e}")))?;
    let addr = addr
        .parse()
        .map_err(|e| DeviceError::Config(format!("peer entry {entry:?}: {e}")))?;
    Ok((peer, addr))
}

/// Effective token: the CLI value is persisted first, then whatever the
/// store holds wins, falling back to the factory default.
fn resolve_token(store: &mut impl ConfigStore, cli: Option<String>) -> Result<String, DeviceError> {
    if let Some(token) = cli {
        store.set_str(ConfigSlot::Token, &token)?;
    }
    Ok(store.get_str(ConfigSlot::Token)?.unwrap_or_else(|| "changeme".to_owned()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut link = UdpLink::bind(args.bind).await?;
    for entry in &args.peers {
        let (peer, addr) = parse_peer_entry(entry)?;
        tracing::info!(%peer, %addr, "registered peer");
        link.register_peer(peer, addr);
    }
    tracing::info!(bind = %link.local_addr()?, "device link active");

    match args.store {
        Some(path) => {
            let mut store = RedbStore::open(&path)?;
            let token = resolve_token(&mut store, args.token)?;
            tracing::info!(store = %path.display(), "persistent config store open");
            run(DeviceEndpoint::new(store, token), link).await?;
        },
        None => {
            let mut store = MemoryStore::new();
            let token = resolve_token(&mut store, args.token)?;
            tracing::warn!("no --store given, configuration will not survive restarts");
            run(DeviceEndpoint::new(store, token), link).await?;
        },
    }

    tracing::info!("restart requested, exiting");
    Ok(())
}

/// Main loop; returns once a reboot has been acknowledged and drained.
async fn run<S: ConfigStore>(
    mut endpoint: DeviceEndpoint<S, std::time::Instant>,
    mut link: UdpLink,
) -> Result<(), DeviceError> {
    let env = SystemEnv;
    let mut maintenance = tokio::time::interval(Duration::from_millis(250));
    let mut heartbeat = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            received = link.recv() => {
                let (peer, datagram) = received?;
                tracing::trace!(%peer, len = datagram.len(), "rx datagram");
                let actions = endpoint.handle_datagram(env.now(), peer, &datagram);
                if execute(&endpoint, &mut link, &env, peer, actions).await? {
                    return Ok(());
                }
            },
            _ = maintenance.tick() => endpoint.tick(env.now()),
            _ = heartbeat.tick() => tracing::debug!("alive"),
        }
    }
}

/// Execute dispatcher actions in order. Returns `true` when a reboot was
/// performed and the loop should end.
async fn execute<S: ConfigStore>(
    endpoint: &DeviceEndpoint<S, std::time::Instant>,
    link: &mut UdpLink,
    env: &SystemEnv,
    peer: PeerAddr,
    actions: Vec<DeviceAction>,
) -> Result<bool, DeviceError> {
    for action in actions {
        match action {
            DeviceAction::SendFrame { peer, datagram } => {
                if let Err(err) = link.send(peer, datagram).await {
                    tracing::warn!(%peer, %err, "reply send failed");
                }
            },
            DeviceAction::ApplyConfig => apply_config(endpoint.store())?,
            DeviceAction::Reboot { delay } => {
                env.sleep(delay).await;
                tracing::info!(%peer, "restarting");
                return Ok(true);
            },
        }
    }
    Ok(false)
}

/// Hand the stored configuration to the running collaborators.
///
/// The WiFi/MQTT clients are external sinks; this build logs the snapshot
/// they would receive.
fn apply_config(store: &impl ConfigStore) -> Result<(), DeviceError> {
    let ssid = store.get_str(ConfigSlot::WifiSsid)?.unwrap_or_default();
    let pass_len = store.get_str(ConfigSlot::WifiPass)?.unwrap_or_default().len();
    let host = store.get_str(ConfigSlot::MqttHost)?.unwrap_or_default();
    let port = store.get_u32(ConfigSlot::MqttPort)?.unwrap_or(1883);
    let version = store.get_u32(ConfigSlot::CfgVersion)?.unwrap_or(0);
    tracing::info!(%ssid, pass_len, %host, port, version, "applying configuration");
    Ok(())
}
