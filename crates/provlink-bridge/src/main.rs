//! Provisioning link bridge binary.
//!
//! Reads operator request lines from stdin, drives each one through the
//! link to the addressed device, and writes one response line per request
//! to stdout. Logs go to stderr so stdout stays a clean NDJSON channel.
//!
//! # Usage
//!
//! ```bash
//! provlink-bridge --bind 0.0.0.0:7420 \
//!     --peer AA:BB:CC:DD:EE:01=127.0.0.1:7421 \
//!     --serial 84F703A0
//! echo '{"v":1,"id":"a","op":"ping","device_id":"AA:BB:CC:DD:EE:01"}' | provlink-bridge ...
//! ```

use std::net::SocketAddr;

use clap::Parser;
use provlink_bridge::{
    BridgeDispatcher, BridgeError, BridgeIdentity, ChannelOutcome, OperatorChannel,
    request::overflow_response,
};
use provlink_core::{PeerAddr, SystemEnv, UdpLink};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Provisioning link bridge
#[derive(Parser, Debug)]
#[command(name = "provlink-bridge")]
#[command(about = "Operator-driven provisioning bridge")]
#[command(version)]
struct Args {
    /// Address to bind the datagram link to
    #[arg(short, long, default_value = "0.0.0.0:7420")]
    bind: SocketAddr,

    /// Peer table entry `AA:BB:CC:DD:EE:01=127.0.0.1:7421` (repeatable)
    #[arg(long = "peer", value_name = "ADDR=SOCKADDR")]
    peers: Vec<String>,

    /// Serial reported by the `hello` op
    #[arg(long, default_value = "0")]
    serial: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_peer_entry(entry: &str) -> Result<(PeerAddr, SocketAddr), BridgeError> {
    let (peer, addr) = entry
        .split_once('=')
        .ok_or_else(|| BridgeError::Config(format!("peer entry {entry:?}: expected ADDR=SOCKADDR")))?;
    let peer = peer
        .parse()
        .map_err(|e| BridgeError::Config(format!("peer entry {entry:?}: {e}")))?;
    let addr = addr
        .parse()
        .map_err(|e| BridgeError::Config(format!("peer entry {entry:?}: {e}")))?;
    Ok((peer, addr))
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
    tracing::info!(bind = %link.local_addr()?, "bridge link active");

    let identity = BridgeIdentity { serial: args.serial.clone(), ..BridgeIdentity::default() };
    let mut dispatcher = BridgeDispatcher::new(link, SystemEnv, identity);

    let mut channel = OperatorChannel::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    tracing::info!("operator channel ready");

    while let Some(outcome) = channel.next().await {
        let response = match outcome {
            ChannelOutcome::Overflow => overflow_response(),
            ChannelOutcome::Request(request) => dispatcher.handle_request(&request).await,
        };
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }

    tracing::info!("operator channel closed, exiting");
    Ok(())
}
