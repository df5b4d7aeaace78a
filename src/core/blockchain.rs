use crate::core::validation;
use crate::core::{Address, Block};
use crate::error::{BlockchainError, Result};
use crate::storage::LedgerStore;
use crate::utils::base64_encode;
use log::{info, warn};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Blockchain {
    store: Arc<dyn LedgerStore>,
    difficulty: u8,      // fixed for the lifetime of the chain
    writer: Arc<Mutex<()>>, // one appender at a time
}

impl Blockchain {
    /// Opens the chain in `store`, writing a genesis block for `creator` if
    /// the store is empty.
    pub fn create(store: Arc<dyn LedgerStore>, creator: &Address, difficulty: u8) -> Result<Blockchain> {
        if store.length()? == 0 {
            let genesis = Block::genesis(creator, difficulty)?;
            store.append(&genesis)?;
            info!(
                "Created genesis block {} for {creator}",
                base64_encode(genesis.get_hash())
            );
        }
        Ok(Blockchain::with_store(store, difficulty))
    }

    /// Opens an existing chain. Fails on an empty store.
    pub fn open(store: Arc<dyn LedgerStore>, difficulty: u8) -> Result<Blockchain> {
        if store.length()? == 0 {
            return Err(BlockchainError::Database(
                "No existing chain found. Create one first.".to_string(),
            ));
        }
        Ok(Blockchain::with_store(store, difficulty))
    }

    fn with_store(store: Arc<dyn LedgerStore>, difficulty: u8) -> Blockchain {
        Blockchain {
            store,
            difficulty,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn size(&self) -> Result<u64> {
        self.store.length()
    }

    /// Captures the current length once. Everything read through the snapshot
    /// sees exactly that many blocks, whatever is appended meanwhile.
    pub fn snapshot(&self) -> Result<Snapshot<'_>> {
        Ok(Snapshot {
            chain: self,
            size: self.store.length()?,
        })
    }

    pub fn last_hash(&self) -> Result<Vec<u8>> {
        self.snapshot()?.tail_hash()
    }

    /// Settled balance of `address` over the first `size` blocks.
    ///
    /// Each block's overlay holds the post-block balance of every address it
    /// touches, so the newest overlay entry at or below `size` is the result of
    /// replaying all history up to that point.
    pub fn balance(&self, address: &Address, size: u64) -> Result<u64> {
        for position in (0..size).rev() {
            let block = self.store.block_at(position)?.ok_or_else(|| {
                BlockchainError::Database(format!("Missing block at position {position}"))
            })?;
            if let Some(balance) = block.get_balances().get(address) {
                return Ok(*balance);
            }
        }
        Ok(0)
    }

    pub fn balance_of(&self, address: &Address) -> Result<u64> {
        self.snapshot()?.balance(address)
    }

    pub fn block_at(&self, position: u64) -> Result<Option<Block>> {
        self.store.block_at(position)
    }

    pub fn block_by_hash(&self, hash: &[u8]) -> Result<Option<Block>> {
        self.store.block_by_hash(hash)
    }

    /// Empty draft for `miner` on the current tail.
    pub fn new_block(&self, miner: Address) -> Result<Block> {
        Ok(Block::new(miner, &self.last_hash()?, self.difficulty))
    }

    pub fn validate_block(&self, block: &Block) -> Result<()> {
        validation::validate_block(block, &self.snapshot()?)
    }

    /// Validates `block` against the current tail and appends it. Holding the
    /// writer lock across both steps means the tail cannot change in between;
    /// a rejected block never reaches the store.
    pub fn add_block(&self, block: &Block) -> Result<()> {
        let _guard = self
            .writer
            .lock()
            .map_err(|_| BlockchainError::Database("Ledger writer lock poisoned".to_string()))?;
        let snapshot = self.snapshot()?;
        if let Err(e) = validation::validate_block(block, &snapshot) {
            warn!("Rejected block {}: {e}", base64_encode(block.get_hash()));
            return Err(e);
        }
        self.store.append(block)?;
        info!(
            "Appended block {} at position {}",
            base64_encode(block.get_hash()),
            snapshot.size()
        );
        Ok(())
    }

    /// Blocks from genesis up to the length at the time of the call.
    pub fn iter(&self) -> Result<BlockchainIterator> {
        Ok(BlockchainIterator {
            store: Arc::clone(&self.store),
            position: 0,
            end: self.size()?,
        })
    }
}

/// The ledger frozen at one length.
pub struct Snapshot<'a> {
    chain: &'a Blockchain,
    size: u64,
}

impl Snapshot<'_> {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn difficulty(&self) -> u8 {
        self.chain.difficulty
    }

    pub fn block_at(&self, position: u64) -> Result<Option<Block>> {
        if position >= self.size {
            return Ok(None);
        }
        self.chain.block_at(position)
    }

    pub fn tail(&self) -> Result<Block> {
        if self.size == 0 {
            return Err(BlockchainError::Consensus("Chain is empty".to_string()));
        }
        self.block_at(self.size - 1)?.ok_or_else(|| {
            BlockchainError::Database(format!("Missing block at position {}", self.size - 1))
        })
    }

    pub fn tail_hash(&self) -> Result<Vec<u8>> {
        Ok(self.tail()?.get_hash().to_vec())
    }

    pub fn balance(&self, address: &Address) -> Result<u64> {
        self.chain.balance(address, self.size)
    }
}

pub struct BlockchainIterator {
    store: Arc<dyn LedgerStore>,
    position: u64,
    end: u64,
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.end {
            return None;
        }
        let position = self.position;
        self.position += 1;
        match self.store.block_at(position) {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => Some(Err(BlockchainError::Database(format!(
                "Missing block at position {position}"
            )))),
            Err(e) => Some(Err(e)),
        }
    }
}
