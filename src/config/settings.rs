use crate::error::{BlockchainError, Result};
use crate::wallet::WALLET_FILE;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";
static DEFAULT_DATA_DIR: &str = "data";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const DATA_DIR_KEY: &str = "POWLEDGER_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address this node listens on.
    pub node_addr: String,
    /// Other nodes. Blocks mined here are pushed to all of them.
    pub peers: Vec<String>,
    /// Root directory for chain databases, one subdirectory per node.
    pub data_dir: PathBuf,
    pub wallet_file: PathBuf,
    /// Wallet name this node mines and signs with.
    pub user: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_addr: DEFAULT_NODE_ADDR.to_string(),
            peers: vec![],
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            wallet_file: PathBuf::from(WALLET_FILE),
            user: None,
        }
    }
}

impl Config {
    pub fn from_toml(toml_str: &str) -> Result<Config> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Reads `path` if given, otherwise starts from defaults, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                Config::from_toml(&text)?
            }
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = env::var(NODE_ADDRESS_KEY) {
            self.node_addr = addr;
        }
        if let Ok(dir) = env::var(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Port part of the node address, used to keep several nodes on one
    /// machine in separate databases.
    pub fn node_id(&self) -> &str {
        self.node_addr
            .rsplit(':')
            .next()
            .unwrap_or(self.node_addr.as_str())
    }

    pub fn chain_path(&self) -> PathBuf {
        self.data_dir.join(format!("node_{}", self.node_id()))
    }

    /// Peers without duplicates and without this node itself.
    pub fn peer_list(&self) -> Vec<String> {
        let mut peers: Vec<String> = vec![];
        for peer in &self.peers {
            if *peer != self.node_addr && !peers.contains(peer) {
                peers.push(peer.clone());
            }
        }
        peers
    }
}
