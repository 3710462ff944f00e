// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - COORDINATOR NODE
//
// Startup: load configuration (file arg or ICL_* environment), open the
// sled store, load locally-held validator keys, bootstrap the validator
// set on first run, then serve the RPC surface while the block-tick
// loop drives netting and the signing sweep.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use icl_crypto::{LocalKeyring, SignerOracle};
use icl_node::rpc::{self, NodeIdentity};
use icl_node::{BootstrapSet, Coordinator, CoordinatorConfig};
use icl_store::{KvStore, SledKv};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {}", e);
        std::process::exit(1);
    }

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║  INTERCLEAR NETTING & CLEARING COORDINATOR           ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!("node:       {}", config.node_id);
    println!("chain:      {}", config.chain_id);
    println!("database:   {}", config.db_path);
    println!("rpc:        {}", config.listen_socket());
    println!("block time: {}s", config.block_time_secs);

    let store: Arc<dyn KvStore> = match SledKv::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("cannot open database at {}: {}", config.db_path, e);
            std::process::exit(1);
        }
    };

    let signer: Arc<dyn SignerOracle> = match load_keyring(&config) {
        Ok(keyring) => {
            if keyring.is_empty() {
                log::info!("no validator keys held, running as observer");
            } else {
                log::info!("holding {} validator key(s)", keyring.len());
            }
            Arc::new(keyring)
        }
        Err(e) => {
            eprintln!("cannot load signer keys: {}", e);
            std::process::exit(1);
        }
    };

    let coordinator = Coordinator::new(
        store,
        signer,
        config.block_time_secs,
        config.netting_min_interval_blocks,
    );

    if let Some(path) = &config.validators_path {
        match BootstrapSet::load_from_file(Path::new(path))
            .map_err(|e| e.to_string())
            .and_then(|set| set.into_validators().map_err(|e| e.to_string()))
            .and_then(|vs| {
                coordinator
                    .bootstrap_validators(vs)
                    .map_err(|e| e.to_string())
            }) {
            Ok(set) => log::info!(
                "validator set at version {} ({} members, threshold {})",
                set.version,
                set.validators.len(),
                set.threshold
            ),
            Err(e) => {
                eprintln!("validator bootstrap failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    log::info!(
        "coordinator {} up at height {}",
        config.node_id,
        coordinator.height()
    );

    let state = Arc::new(Mutex::new(coordinator));

    // Block-tick loop: netting trigger + multisig signing sweep.
    let tick_state = state.clone();
    let block_time = config.block_time_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(block_time));
        interval.tick().await; // first tick fires immediately, skip it
        loop {
            interval.tick().await;
            let summary = {
                let mut coordinator = tick_state.lock().unwrap_or_else(|e| e.into_inner());
                coordinator.on_block_tick()
            };
            if let Some(cycle) = &summary.netting {
                log::info!(
                    "height {}: netting cycle {:?} with {} pair(s)",
                    summary.height,
                    cycle.status,
                    cycle.pairs.len()
                );
            }
            if summary.signatures_added > 0 {
                log::info!(
                    "height {}: added {} command signature(s)",
                    summary.height,
                    summary.signatures_added
                );
            }
        }
    });

    let socket = match config.listen_socket().parse() {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("bad listen address {}: {}", config.listen_socket(), e);
            std::process::exit(1);
        }
    };
    let identity = NodeIdentity {
        node_id: config.node_id.clone(),
        chain_id: config.chain_id.clone(),
    };
    rpc::serve(state, identity, socket).await;
}

/// First CLI argument is a config file path; otherwise environment
/// variables over defaults.
fn load_config() -> Result<CoordinatorConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => CoordinatorConfig::load_from_file(Path::new(&path)),
        None => CoordinatorConfig::load_from_env(),
    }
}

fn load_keyring(config: &CoordinatorConfig) -> Result<LocalKeyring, Box<dyn std::error::Error>> {
    match &config.signer_keys_path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            Ok(LocalKeyring::from_hex_lines(&contents)?)
        }
        None => Ok(LocalKeyring::new()),
    }
}
