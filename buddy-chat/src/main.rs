//! buddy-chat entry point.
//!
//! ```text
//! buddy-chat                      Chat with the remembered peer
//! buddy-chat --peer <name|id|ip>  Chat with a specific peer (and remember it)
//! buddy-chat --list-peers         Show peers from the configured directory
//! buddy-chat --config <path>      Load a custom config TOML
//! buddy-chat --gen-config         Write default config to stdout
//! buddy-chat --init-config        Create the --config file with defaults
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use buddy_chat::config::{ChatConfig, app_data_dir};
use buddy_chat::discovery;
use buddy_chat::selection::SelectionStore;
use buddy_chat::session::{ChatSession, resolve_peer};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "buddy-chat", about = "Peer-to-peer terminal chat over LAN or tailnet")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "buddy-chat.toml")]
    config: PathBuf,

    /// Peer to chat with: id, display name or IP address.
    #[arg(short, long)]
    peer: Option<String>,

    /// List known peers and exit.
    #[arg(long)]
    list_peers: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long)]
    init_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = ChatConfig::default_toml()?;
        println!("{text}");
        return Ok(());
    }

    if cli.init_config {
        ChatConfig::write_default(&cli.config)
            .map_err(|e| format!("cannot write {}: {e}", cli.config.display()))?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let config = ChatConfig::load(&cli.config);

    // Logs go to stderr so they do not interleave with the chat.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("buddy-chat v{}", env!("CARGO_PKG_VERSION"));

    let directory = discovery::from_config(&config.discovery);
    let peers = directory.list_peers().await;

    if cli.list_peers {
        if peers.is_empty() {
            println!("no peers found");
        }
        for peer in &peers {
            let state = if peer.online { "online" } else { "offline" };
            println!("{:<20} {:<40} {:<8} {}", peer.name, peer.address, state, peer.id);
        }
        return Ok(());
    }

    let selection = SelectionStore::in_dir(&app_data_dir());
    let query = match cli.peer {
        Some(query) => query,
        None => selection
            .load()
            .await
            .ok_or("no peer selected; pass --peer (see --list-peers)")?,
    };
    let peer = resolve_peer(&peers, &query).ok_or_else(|| format!("unknown peer {query:?}"))?;

    if peer.address.is_empty() {
        return Err(format!("peer {} has no address", peer.name).into());
    }
    if !directory.is_online(&peer.id).await {
        warn!("{} does not appear online; messages may stay undelivered", peer.name);
    }
    if let Err(e) = selection.save(&peer.id).await {
        warn!("could not remember selected peer: {e}");
    }

    info!("history dir: {}", config.history_dir().display());
    ChatSession::new(config, peer).run().await?;

    Ok(())
}
