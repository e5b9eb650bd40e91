// crates/meridian-daemon/src/main.rs
//
// Binary entrypoint for the Meridian validator daemon.
//
// Initializes tracing, parses CLI arguments, loads configuration, opens the
// store (writing genesis on first start), builds the node service with the
// reference ordering engine, starts the emitter when this node is a
// validator, and runs until ctrl-c or a fatal fault.

mod config;
mod node;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::DaemonConfig;

use meridian_core::ValidatorId;
use meridian_gossip::{Emitter, EmitterWorld, OrderingEngine, Service, StaticPeers};

/// Meridian validator daemon.
#[derive(Parser, Debug)]
#[command(name = "meridian-daemon", version = "0.1.0", about = "Meridian validator node daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.meridian/config.toml")]
    config: String,

    /// Validator id to emit events as. Overrides the config file.
    #[arg(long)]
    validator_id: Option<u32>,

    /// Data directory. Overrides the config file.
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration from TOML file, falling back to defaults if the file
    // is not found. Logging is not up yet, so the outcome is reported below.
    let config_path = node::expand_tilde(&args.config);
    let loaded = DaemonConfig::load(&config_path);
    let mut daemon_config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(config::ConfigError::Io { .. }) => DaemonConfig::default(),
        Err(e) => return Err(format!("{}: {}", config_path, e).into()),
    };

    // CLI flags override the config file values.
    if let Some(id) = args.validator_id {
        daemon_config.validator_id = Some(id);
    }
    if let Some(dir) = args.data_dir {
        daemon_config.data_dir = dir;
    }

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .init();

    match loaded {
        Ok(_) => tracing::info!("Loaded configuration from {}", config_path),
        Err(e) => tracing::warn!("Could not load config from {}: {}. Using defaults.", config_path, e),
    }

    tracing::info!("Meridian Daemon v0.1.0");
    tracing::info!("Store backend: {}", daemon_config.store_backend);
    tracing::info!("Data directory: {}", daemon_config.data_dir);
    tracing::info!(
        "Heavy-check workers: {}",
        daemon_config.service.heavy_check.worker_count()
    );
    tracing::info!(
        "Events per block: {}, blocks per epoch: {}",
        daemon_config.service.engine.events_per_block,
        daemon_config.service.engine.blocks_per_epoch
    );

    // ---------------------------------------------------------------
    // Store and genesis.
    // ---------------------------------------------------------------
    let store = node::open_store(&daemon_config)?;
    let epoch_state = node::ensure_genesis(&store, &daemon_config)?;
    tracing::info!(
        "Current epoch {} with {} validators",
        epoch_state.epoch,
        epoch_state.validators.len()
    );

    // Validator identity, if this node emits.
    let identity = match daemon_config.validator_id {
        Some(id) => {
            let id = ValidatorId(id);
            let keypair = node::load_validator_key(&daemon_config.key_path, id, &epoch_state)?;
            tracing::info!("Validator {} key loaded", id);
            Some((id, keypair))
        }
        None => {
            tracing::info!("No validator id configured; running as an observer");
            None
        }
    };

    // ---------------------------------------------------------------
    // Service.
    // ---------------------------------------------------------------
    // Without a transport layer the node is its own network: always synced.
    let peers = Arc::new(StaticPeers::new(0, true));
    let engine = Box::new(OrderingEngine::new(daemon_config.service.engine.events_per_block));
    let service = Service::new(daemon_config.service.clone(), store, engine, peers)?;

    if let Some((id, keypair)) = identity {
        if daemon_config.service.emitter.enabled {
            let world = EmitterWorld::new(service.clone());
            Emitter::new(world, id, keypair, daemon_config.service.emitter.clone()).spawn();
        } else {
            tracing::info!("Emitter disabled by config");
        }
    }

    let mut blocks = service.feed().subscribe_blocks();
    let mut epochs = service.feed().subscribe_epochs();
    let mut halt_check = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            Ok(block) = blocks.recv() => {
                tracing::info!("Block {} sealed ({} events)", block.index, block.events.len());
            }
            Ok(epoch) = epochs.recv() => {
                tracing::info!("Entered epoch {}", epoch);
            }
            _ = halt_check.tick() => {
                if service.coordinator().is_halted() {
                    tracing::error!("Node halted, shutting down");
                    break;
                }
            }
        }
    }

    service.stop().await?;

    if service.coordinator().is_halted() {
        return Err("node halted on a fatal fault".into());
    }
    tracing::info!("Meridian daemon shut down gracefully");
    Ok(())
}
