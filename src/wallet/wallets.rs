use crate::core::Address;
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use log::info;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const WALLET_FILE: &str = "wallet.dat";

/// Named key pairs persisted in one file.
pub struct Wallets {
    path: PathBuf,
    wallets: HashMap<String, Wallet>,
}

impl Wallets {
    /// Opens the wallet file at `path`, starting empty when it does not exist yet.
    pub fn open(path: &Path) -> Result<Wallets> {
        let mut wallets = Wallets {
            path: path.to_path_buf(),
            wallets: HashMap::new(),
        };
        if path.exists() {
            let mut file = File::open(path)?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            wallets.wallets = deserialize(&buf[..])?;
        }
        Ok(wallets)
    }

    pub fn create_wallet(&mut self, name: &str) -> Result<Address> {
        if self.wallets.contains_key(name) {
            return Err(BlockchainError::Wallet(format!(
                "Wallet '{name}' already exists"
            )));
        }
        let wallet = Wallet::new()?;
        let address = wallet.address();
        self.wallets.insert(name.to_string(), wallet);
        self.save_to_file()?;
        info!("Created wallet '{name}' with address {address}");
        Ok(address)
    }

    pub fn get_wallet(&self, name: &str) -> Result<&Wallet> {
        self.wallets
            .get(name)
            .ok_or_else(|| BlockchainError::Wallet(format!("Wallet not found: {name}")))
    }

    pub fn get_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.wallets.keys().cloned().collect();
        names.sort();
        names
    }

    fn save_to_file(&self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = serialize(&self.wallets)?;
        writer.write_all(wallets_bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wallets_persist_across_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(WALLET_FILE);

        let mut wallets = Wallets::open(&path).unwrap();
        let address = wallets.create_wallet("alice").unwrap();
        assert!(wallets.create_wallet("alice").is_err());

        let reopened = Wallets::open(&path).unwrap();
        assert_eq!(reopened.get_wallet("alice").unwrap().address(), address);
        assert_eq!(reopened.get_names(), vec!["alice".to_string()]);
        assert!(reopened.get_wallet("bob").is_err());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(WALLET_FILE);
        std::fs::write(&path, [0xFF, 0xFF, 0xFF]).unwrap();
        assert!(Wallets::open(&path).is_err());
    }
}
