// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - NODE CONFIGURATION
//
// TOML file + environment overrides for one coordinator node, and the
// bootstrap validator-set file consumed on first start.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use icl_core::{
    unix_now, CoordinationError, Validator, DEFAULT_BLOCK_TIME_SECS,
    DEFAULT_CONSENSUS_TIMEOUT_BLOCKS, DEFAULT_NETTING_MIN_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub node_id: String,
    /// Coordination-chain identifier (not a member bank chain)
    pub chain_id: String,
    pub listen_addr: String,
    pub listen_port: u16,
    pub db_path: String,
    pub block_time_secs: u64,
    pub netting_min_interval_blocks: u64,
    pub consensus_timeout_blocks: u64,
    /// Hex secp256k1 secrets, one per held validator key (optional)
    pub signer_keys_path: Option<String>,
    /// Bootstrap validator set, applied only to an empty registry
    pub validators_path: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            node_id: format!("coordinator-{}", std::process::id()),
            chain_id: "interclear-1".to_string(),
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 7420,
            db_path: "interclear_db".to_string(),
            block_time_secs: DEFAULT_BLOCK_TIME_SECS,
            netting_min_interval_blocks: DEFAULT_NETTING_MIN_INTERVAL,
            consensus_timeout_blocks: DEFAULT_CONSENSUS_TIMEOUT_BLOCKS,
            signer_keys_path: None,
            validators_path: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: CoordinatorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Environment overrides on top of defaults, for containerized
    /// deployments without a config file.
    pub fn load_from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("ICL_NODE_ID") {
            config.node_id = v;
        }
        if let Ok(v) = std::env::var("ICL_CHAIN_ID") {
            config.chain_id = v;
        }
        if let Ok(v) = std::env::var("ICL_LISTEN_ADDR") {
            config.listen_addr = v;
        }
        if let Ok(v) = std::env::var("ICL_LISTEN_PORT") {
            config.listen_port = v.parse()?;
        }
        if let Ok(v) = std::env::var("ICL_DB_PATH") {
            config.db_path = v;
        }
        if let Ok(v) = std::env::var("ICL_BLOCK_TIME_SECS") {
            config.block_time_secs = v.parse()?;
        }
        if let Ok(v) = std::env::var("ICL_NETTING_MIN_INTERVAL") {
            config.netting_min_interval_blocks = v.parse()?;
        }
        if let Ok(v) = std::env::var("ICL_CONSENSUS_TIMEOUT_BLOCKS") {
            config.consensus_timeout_blocks = v.parse()?;
        }
        if let Ok(v) = std::env::var("ICL_SIGNER_KEYS") {
            config.signer_keys_path = Some(v);
        }
        if let Ok(v) = std::env::var("ICL_VALIDATORS") {
            config.validators_path = Some(v);
        }
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.node_id.is_empty() {
            return Err("node_id cannot be empty".to_string());
        }
        if self.chain_id.is_empty() {
            return Err("chain_id cannot be empty".to_string());
        }
        if self.listen_port == 0 {
            return Err("listen_port cannot be 0".to_string());
        }
        if self.db_path.is_empty() {
            return Err("db_path cannot be empty".to_string());
        }
        if self.block_time_secs == 0 {
            return Err("block_time_secs must be at least 1".to_string());
        }
        if self.netting_min_interval_blocks == 0 {
            return Err("netting_min_interval_blocks must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

/// `validators.toml` layout produced by the genesis tool:
///
/// ```toml
/// [[validators]]
/// address = "0x…"
/// public_key = "04…"   # hex, compressed or uncompressed
/// voting_power = 10
/// active = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSet {
    pub validators: Vec<BootstrapValidator>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapValidator {
    pub address: String,
    pub public_key: String,
    #[serde(default = "default_power")]
    pub voting_power: u64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_power() -> u64 {
    1
}

fn default_active() -> bool {
    true
}

impl BootstrapSet {
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let set: BootstrapSet = toml::from_str(&content)?;
        Ok(set)
    }

    /// Decode into registry records; key bytes are validated downstream
    /// by the registry's canonicalization.
    pub fn into_validators(self) -> Result<Vec<Validator>, CoordinationError> {
        let now = unix_now();
        self.validators
            .into_iter()
            .map(|v| {
                let public_key = hex::decode(&v.public_key).map_err(|_| {
                    CoordinationError::InvalidValidator(format!(
                        "public key for {} is not hex",
                        v.address
                    ))
                })?;
                Ok(Validator {
                    address: v.address,
                    public_key,
                    voting_power: v.voting_power,
                    active: v.active,
                    joined_at: now,
                })
            })
            .collect()
    }
}
