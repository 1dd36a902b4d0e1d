// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! sw2 relay
//!
//! Whitelist-gated event relay. Three access modes:
//! - `write_only`: only whitelisted identities may publish, anyone may read
//! - `write_read`: separate write and read whitelists
//! - `mandatory_read`: every connection is challenged, reads require auth
//!
//! # Usage
//!
//! ```bash
//! # Start on the default address (0.0.0.0:3334) with whitelist.json
//! sw2-relay
//!
//! # Mandatory authentication for reads
//! sw2-relay --mode mandatory_read --port 3335
//!
//! # Generate and check a configuration file
//! sw2-relay gen-config --output relay.json
//! sw2-relay check --config relay.json
//! ```

use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sw2_policy::{PolicyEngine, PolicyMode};
use sw2_relay::{
    EventStore, MemoryStore, RelayConfig, RelayInfo, RelayServer, SqliteStore, StorageBackend,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// sw2 relay - whitelist-gated event relay
#[derive(Parser, Debug)]
#[command(name = "sw2-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides the config file)
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Access mode: write_only, write_read or mandatory_read
    #[arg(short, long)]
    mode: Option<PolicyMode>,

    /// Directory for the SQLite event database (overrides the config file)
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Keep events in memory only
    #[arg(long)]
    memory: bool,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a configuration file with default values
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "relay.json")]
        output: PathBuf,

        /// Access mode to write into the file
        #[arg(short, long)]
        mode: Option<PolicyMode>,
    },

    /// Validate a configuration file and load its whitelists
    Check {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Environment first so RELAY_* and RUST_LOG from .env are visible
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output, mode } => cmd_gen_config(output, mode),
            Commands::Check { config } => cmd_check(&config),
        };
    }

    let config = build_config(&args)?;
    let engine = PolicyEngine::from_config(&config.policy)?;
    let info = RelayInfo::from_env();

    info!("+----------------------------------------------------+");
    info!(
        "|       sw2 relay v{}                             |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:   {:40} |", config.listen_addr());
    info!("|  Mode:   {:40} |", engine.mode());
    info!(
        "|  Auth:   {:40} |",
        if engine.connection_policy().challenges_on_connect() {
            "challenge on connect"
        } else {
            "challenge on demand"
        }
    );
    info!("|  Name:   {:40} |", info.name);
    info!("+----------------------------------------------------+");
    log_whitelists(&engine);

    let store = open_store(&config)?;
    let server = RelayServer::new(config, info, Arc::new(engine), store)?;

    // Handle shutdown signals
    let server_handle = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping relay...");
        server_handle.shutdown();
    });

    server.run().await?;

    let stats = server.router_stats().await;
    info!(
        "Relay stopped ({} events delivered, {} dropped)",
        stats.events_delivered, stats.delivery_errors
    );
    Ok(())
}

/// Load the config file (if any) and apply command line overrides.
fn build_config(args: &Args) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(ref config_path) => {
            info!("Loading config from {:?}", config_path);
            load_config(config_path)?
        }
        None => RelayConfig::default(),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(mode) = args.mode {
        config.policy.mode = mode;
    }
    if let Some(ref store_path) = args.store_path {
        config.storage = StorageBackend::Sqlite;
        config.store_path = store_path.clone();
    }
    if args.memory {
        config.storage = StorageBackend::Memory;
    }

    config.validate()?;
    Ok(config)
}

/// Read a config file; relative whitelist and store paths resolve next to it.
fn load_config(path: &Path) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let mut config = RelayConfig::from_file(path)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        config.policy = config.policy.relative_to(dir);
        if config.store_path.is_relative() {
            config.store_path = dir.join(&config.store_path);
        }
    }
    Ok(config)
}

fn open_store(config: &RelayConfig) -> Result<Arc<dyn EventStore>, Box<dyn std::error::Error>> {
    Ok(match config.storage {
        StorageBackend::Sqlite => {
            info!("Storing events in {}", config.store_path.display());
            Arc::new(SqliteStore::open(&config.store_path)?)
        }
        StorageBackend::Memory => {
            warn!("Storing events in memory: they are lost on restart");
            Arc::new(MemoryStore::new())
        }
    })
}

fn log_whitelists(engine: &PolicyEngine) {
    if engine.write_policy().whitelist().is_empty() {
        warn!("Write whitelist is empty: any identity may publish");
    }

    let read = engine.read_policy().map(|r| r.whitelist());
    let mut seen = HashSet::new();
    for identity in engine.whitelisted_identities() {
        if !seen.insert(identity) {
            continue;
        }
        let can_write = engine.write_policy().whitelist().contains(identity);
        let can_read = read.is_some_and(|r| r.contains(identity));
        let access = match (can_write, can_read) {
            (true, true) => "write+read",
            (true, false) => "write",
            _ => "read",
        };
        info!("  - {} ({})", identity, access);
    }
}

fn cmd_gen_config(
    output: PathBuf,
    mode: Option<PolicyMode>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RelayConfig::default();
    if let Some(mode) = mode {
        config.policy.mode = mode;
    }
    config.to_file(&output)?;
    println!("Configuration written to {}", output.display());
    Ok(())
}

fn cmd_check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let engine = PolicyEngine::from_config(&config.policy)?;

    println!("Configuration OK: {}", path.display());
    println!("  Listen: {}", config.listen_addr());
    println!("  Mode:   {}", engine.mode());
    match config.storage {
        StorageBackend::Sqlite => println!("  Store:  {}", config.store_path.display()),
        StorageBackend::Memory => println!("  Store:  memory"),
    }
    println!(
        "  Write whitelist: {} identities",
        engine.write_policy().whitelist().len()
    );
    if let Some(read) = engine.read_policy() {
        println!("  Read whitelist:  {} identities", read.whitelist().len());
    }
    Ok(())
}
