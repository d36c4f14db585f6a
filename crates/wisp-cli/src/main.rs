//! WISP CLI
//!
//! Encrypted peer-to-peer file transfer over TCP

mod config;
mod files;
mod progress;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;
use wisp_core::{OutgoingFile, ReceiveEvent, SessionEvent, SessionManager};
use wisp_transport::{PeerId, TcpTransport};

use config::Config;
use progress::{TransferBar, format_bytes, format_duration};

/// WISP - encrypted, chunked file transfer between two peers
#[derive(Parser)]
#[command(name = "wisp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path [default: <config dir>/wisp/config.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file to a peer
    Send {
        /// File to send
        file: PathBuf,

        /// Receiver address, e.g. 192.168.1.20:7420
        peer: String,

        /// Local address to listen on while sending
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: String,
    },

    /// Receive files from peers
    Receive {
        /// Output directory [default: from config]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Listen address [default: from config]
        #[arg(short, long)]
        bind: Option<String>,

        /// Exit after the first file is saved
        #[arg(long)]
        once: bool,
    },

    /// Send a text message to a peer
    Message {
        /// Receiver address
        peer: String,

        /// Text to send
        text: String,
    },

    /// Show configuration
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = if cli.config.is_some() {
        Config::load(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        Config::load_or_default()?
    };
    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match cli.command {
        Commands::Send { file, peer, bind } => send_file(&file, &peer, &bind, &config).await,
        Commands::Receive { output, bind, once } => {
            let output = output.unwrap_or_else(|| config.transfer.output_dir.clone());
            let bind: SocketAddr = match bind {
                Some(bind) => bind.parse().with_context(|| format!("invalid bind address {bind}"))?,
                None => config.parse_listen_addr()?,
            };
            receive_files(&output, bind, once, &config).await
        }
        Commands::Message { peer, text } => send_message(&peer, &text, &config).await,
        Commands::Status => {
            show_status(&config, &config_path);
            Ok(())
        }
    }
}

/// Start a session bound to `bind`
async fn open_session(
    bind: SocketAddr,
    config: &Config,
) -> anyhow::Result<(SessionManager, tokio::sync::mpsc::UnboundedReceiver<SessionEvent>, PeerId)> {
    let transport = Arc::new(TcpTransport::new(bind));
    let (session, events) = SessionManager::with_config(transport, config.node_config())?;
    let local = session.start().await?;
    Ok((session, events, local))
}

/// Send a file to a peer
async fn send_file(file: &Path, peer: &str, bind: &str, config: &Config) -> anyhow::Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();
    let mime_type = files::mime_for(file);
    let digest = blake3::hash(&data);

    println!("File: {}", file.display());
    println!("Size: {}", format_bytes(data.len() as u64));
    println!("Type: {mime_type}");
    println!("BLAKE3: {}", digest.to_hex());
    println!("Recipient: {peer}");

    let bind: SocketAddr = bind.parse().with_context(|| format!("invalid bind address {bind}"))?;
    let (session, _events, _local) = open_session(bind, config).await?;
    session.connect(peer).await?;

    let bar = TransferBar::bytes(data.len() as u64, &name);
    let started = Instant::now();
    let reporter = bar.clone();
    let result = session
        .send_file(peer, OutgoingFile::new(name, mime_type, data), move |p| {
            reporter.update_with_total(p.bytes_sent, p.bytes_total);
            tracing::trace!("{}% at {}", p.percent(), p.speed_string());
        })
        .await;

    match &result {
        Ok(()) => bar.finish_with_message(format!(
            "{} sent in {}",
            style("✓").green(),
            format_duration(started.elapsed())
        )),
        Err(e) => bar.abandon(format!("{} {e}", style("✗").red())),
    }

    if let Err(e) = session.disconnect(peer).await {
        tracing::debug!("Disconnect from {} after send: {}", peer, e);
    }
    session.stop().await;
    result?;
    Ok(())
}

/// Send one text message and hang up
async fn send_message(peer: &str, text: &str, config: &Config) -> anyhow::Result<()> {
    let (session, _events, _local) = open_session(SocketAddr::from(([0, 0, 0, 0], 0)), config).await?;
    session.connect(peer).await?;
    let result = session.send_message(peer, text).await;
    if let Err(e) = session.disconnect(peer).await {
        tracing::debug!("Disconnect from {} after message: {}", peer, e);
    }
    session.stop().await;
    result?;

    println!("{} Message sent to {peer}", style("✓").green());
    Ok(())
}

/// In-progress inbound transfer shown on screen
struct InboundBar {
    peer: PeerId,
    file_name: String,
    bar: TransferBar,
}

/// Receive files until interrupted
async fn receive_files(output: &Path, bind: SocketAddr, once: bool, config: &Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("cannot create output directory {}", output.display()))?;

    let (session, mut events, local) = open_session(bind, config).await?;

    println!("Output directory: {}", output.display());
    println!("Listening on: {}", style(&local).bold());
    if bind.ip().is_unspecified() {
        println!("Peers dial this host's address on port {}", bind.port());
    }
    println!("Press Ctrl+C to stop");

    let mut bars: HashMap<String, InboundBar> = HashMap::new();

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        };
        let Some(event) = event else { break };

        match event {
            SessionEvent::IncomingConnection { peer } => {
                println!("{} connected", style(&peer).cyan());
            }
            SessionEvent::Connected { .. } => {}
            SessionEvent::Disconnected {
                peer,
                abandoned_transfers,
            } => {
                bars.retain(|_, inbound| {
                    if inbound.peer == peer {
                        inbound.bar.abandon(format!("{} {} incomplete", style("✗").red(), inbound.file_name));
                        false
                    } else {
                        true
                    }
                });
                if abandoned_transfers > 0 {
                    println!(
                        "{} disconnected, {} transfer(s) abandoned",
                        style(&peer).cyan(),
                        abandoned_transfers
                    );
                } else {
                    println!("{} disconnected", style(&peer).cyan());
                }
            }
            SessionEvent::Received { peer, event } => match event {
                ReceiveEvent::TransferStarted {
                    transfer_id,
                    file_name,
                    total_chunks,
                } => {
                    let bar = TransferBar::chunks(total_chunks, &file_name);
                    bars.insert(transfer_id, InboundBar { peer, file_name, bar });
                }
                ReceiveEvent::ChunkReceived {
                    transfer_id, received, ..
                } => {
                    if let Some(inbound) = bars.get(&transfer_id) {
                        inbound.bar.update(received);
                    }
                }
                ReceiveEvent::FileReceived(file) => {
                    let finished = bars
                        .iter()
                        .find(|(_, inbound)| inbound.peer == peer && inbound.file_name == file.name)
                        .map(|(id, _)| id.clone());
                    let bar = finished.and_then(|id| bars.remove(&id)).map(|inbound| inbound.bar);

                    let digest = blake3::hash(&file.data);
                    let path = files::save_received(output, &file.name, &file.data)
                        .with_context(|| format!("cannot save {}", file.name))?;
                    let summary = format!(
                        "{} {} ({}, {}) -> {}",
                        style("✓").green(),
                        file.name,
                        file.mime_type,
                        format_bytes(file.data.len() as u64),
                        path.display()
                    );
                    match bar {
                        Some(bar) => bar.finish_with_message(summary),
                        None => println!("{summary}"),
                    }
                    println!("  BLAKE3: {}", digest.to_hex());

                    if once {
                        break;
                    }
                }
                ReceiveEvent::Message(text) => {
                    println!("{}: {text}", style(&peer).cyan());
                }
            },
            SessionEvent::Error { peer, error } => {
                tracing::warn!("Error from {}: {}", peer, error);
                println!("{} {peer}: {error}", style("!").yellow());
            }
        }
    }

    session.stop().await;
    Ok(())
}

/// Show configuration
fn show_status(config: &Config, path: &Path) {
    println!("WISP Status");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Config: {}", path.display());
    println!();

    println!("Network:");
    println!("  Listen: {}", config.network.listen_addr);
    println!("  Connect timeout: {}s", config.network.connect_timeout_secs);
    println!();

    println!("Transfer:");
    println!("  Chunk size: {}", format_bytes(config.transfer.chunk_size as u64));
    println!("  Chunk delay: {}ms", config.transfer.chunk_delay_ms);
    println!("  Output: {}", config.transfer.output_dir.display());
    println!();

    println!("Logging:");
    println!("  Level: {}", config.logging.level);
}
