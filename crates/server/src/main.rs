//! Binary entrypoint: binds a local TCP listener, speaks newline-delimited
//! JSON-RPC 2.0 frames per connection, and drives an [`acp_core::ControlPlane`]
//! built on the in-memory runtime doubles. A production deployment would
//! swap the agent manager, workspace manager, and preference store for real
//! implementations without touching the dispatch core.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use acp_core::connections::Connection;
use acp_core::cors::check_local_origin;
use acp_core::{ControlPlane, ControlPlaneConfig};
use acp_runtime::{MockAgentManager, MockPreferenceStore, MockWorkspaceManager};
use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Parser, Debug)]
#[command(name = "acp-server", about = "Local multi-agent orchestration control plane")]
struct Args {
    /// Address to bind the JSON-RPC listener on.
    #[arg(long, default_value = "127.0.0.1:4455")]
    listen: String,

    /// Run with only the offline method surface registered.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Directory used for thread archives and other on-disk state.
    #[arg(long)]
    home_dir: Option<PathBuf>,

    /// Turn watchdog timeout, in seconds.
    #[arg(long, default_value_t = 180)]
    watchdog_timeout_secs: u64,

    /// Approval round-trip timeout, in seconds.
    #[arg(long, default_value_t = 300)]
    approval_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let home_dir = args
        .home_dir
        .or_else(dirs_home)
        .unwrap_or_else(std::env::temp_dir);

    let plane = ControlPlane::new(
        ControlPlaneConfig {
            offline: args.offline,
            home_dir,
            watchdog_timeout: Duration::from_secs(args.watchdog_timeout_secs),
            approval_timeout: Duration::from_secs(args.approval_timeout_secs),
        },
        Arc::new(MockAgentManager::new()),
        Arc::new(MockWorkspaceManager::default()),
        Arc::new(MockPreferenceStore::default()),
    );

    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    tracing::info!(addr = %args.listen, offline = args.offline, "control plane listening");

    let mut next_connection_id: u64 = 0;
    loop {
        let (socket, peer) = listener.accept().await?;
        next_connection_id += 1;
        let connection_id = format!("conn-{next_connection_id}");
        let dispatcher = plane.dispatcher.clone();
        tracing::info!(connection_id, %peer, "accepted connection");
        tokio::spawn(async move {
            if let Err(e) = handle_connection(connection_id.clone(), socket, dispatcher).await {
                tracing::warn!(connection_id, error = %e, "connection closed with error");
            }
        });
    }
}

/// A connection's very first line, sent before any JSON-RPC traffic. This
/// transport has no HTTP layer to carry a real `Origin` header, so the
/// client announces its origin explicitly; an absent or malformed handshake
/// is treated as the empty origin, which `check_local_origin` allows.
#[derive(Debug, Default, Deserialize)]
struct Handshake {
    #[serde(default)]
    origin: String,
}

async fn handle_connection(
    connection_id: String,
    socket: TcpStream,
    dispatcher: Arc<acp_core::dispatch::Dispatcher>,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half).lines();

    let Some(first_line) = reader.next_line().await? else {
        return Ok(());
    };
    let handshake: Handshake = serde_json::from_str(&first_line).unwrap_or_default();
    if !check_local_origin(&handshake.origin) {
        tracing::warn!(connection_id, origin = %handshake.origin, "rejected non-local origin");
        return Ok(());
    }

    let (outgoing_tx, mut outgoing_rx) = tokio::sync::mpsc::channel(128);
    dispatcher
        .connections
        .add(Arc::new(Connection::new(connection_id.clone(), outgoing_tx)))
        .await;

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            let Ok(mut bytes) = serde_json::to_vec(&msg) else {
                continue;
            };
            bytes.push(b'\n');
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(reply) = dispatcher.handle_inbound(&connection_id, line.as_bytes()).await {
            if let Some(conn) = dispatcher.connections.get(&connection_id).await {
                conn.send(reply);
            }
        }
    }

    dispatcher.connections.remove(&connection_id).await;
    writer_task.abort();
    Ok(())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
