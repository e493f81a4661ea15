//! Skirmish node -- host or join a peer session from the terminal.
//!
//! Usage:
//!   skirmish-node host                  # acquire an address and wait
//!   skirmish-node join 192.0.2.7:9476   # dial a hosting peer
//!
//! A throwaway battle store stands in for the game: enough to watch
//! actions, heartbeats, and reconnects flow over a real QUIC link.

mod config;

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use skirmish_link::{PeerLink, QuicTransport, Role};
use skirmish_protocol::{
    BattleState, Crew, CrewMember, FighterStatus, Participant, Position, Side, Species,
};
use skirmish_sync::{spawn_sync_task, InMemoryBattleStore, SyncConfig, SyncSession};

#[derive(Parser)]
#[command(name = "skirmish-node", about = "Skirmish peer session node")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "skirmish.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire an address and wait for a guest
    Host,
    /// Join a hosting peer at the given address
    Join {
        /// Host address, e.g. 192.0.2.7:9476
        addr: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "skirmish_node=info,skirmish_link=info,skirmish_sync=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::NodeConfig::load_or_default(Path::new(&cli.config))?;

    let listen_addr = cfg.network.listen_addr.parse()?;
    let transport = Arc::new(QuicTransport::new(listen_addr));
    let link = PeerLink::with_config(transport, cfg.link.clone());

    // Surface link events on the console for the session's lifetime.
    let _connect = link.on_connect(|addr| tracing::info!(remote = %addr, "peer connected"));
    let _disconnect = link.on_disconnect(|_| tracing::warn!("peer connection lost"));
    let _reconnecting =
        link.on_reconnecting(|attempt| tracing::warn!(attempt = *attempt, "reconnecting"));
    let _error = link.on_peer_error(|error| tracing::error!(%error, "link error"));
    let _server = link.on_server_disconnect(|error| tracing::error!(%error, "discovery lost"));

    match cli.command {
        Commands::Host => run_host(link).await,
        Commands::Join { addr } => run_guest(link, addr).await,
    }
}

async fn run_host(link: PeerLink) -> anyhow::Result<()> {
    let session = SyncSession::new(
        Some(Role::Host),
        InMemoryBattleStore::new(Some(demo_battle())),
        SyncConfig::default(),
    );
    let (handle, notices) = spawn_sync_task(session, link.clone());
    print_notices(notices);

    let addr = link.host().await?;
    println!("hosting at {addr}");

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;
    link.disconnect().await;
    Ok(())
}

async fn run_guest(link: PeerLink, addr: String) -> anyhow::Result<()> {
    let session = SyncSession::new(
        Some(Role::Guest),
        InMemoryBattleStore::default(),
        SyncConfig::default(),
    );
    let (handle, notices) = spawn_sync_task(session, link.clone());
    print_notices(notices);

    link.join(addr).await?;
    handle.share_crew(demo_crew()).await;

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;
    link.disconnect().await;
    Ok(())
}

fn print_notices(mut notices: tokio::sync::mpsc::UnboundedReceiver<skirmish_sync::SyncNotice>) {
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            tracing::info!(?notice, "sync");
        }
    });
}

fn demo_battle() -> BattleState {
    let fighter = |id: &str, name: &str, side, x| Participant {
        id: id.into(),
        name: name.into(),
        side,
        status: FighterStatus::Ready,
        position: Position { x, y: 0 },
        action_points: 2,
        weapons: Vec::new(),
    };
    BattleState {
        id: "demo".into(),
        round: 1,
        active_fighter: Some("m1".into()),
        participants: vec![
            fighter("m1", "Vex", Side::Attacker, 0),
            fighter("m2", "Rask", Side::Defender, 8),
        ],
        over: false,
    }
}

fn demo_crew() -> Crew {
    Crew {
        id: "c1".into(),
        name: "Dust Runners".into(),
        credits: 120,
        members: vec![CrewMember {
            id: "m2".into(),
            name: "Rask".into(),
            species: Species::Saurian,
            status: FighterStatus::Ready,
            weapons: Vec::new(),
        }],
    }
}
