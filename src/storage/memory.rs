use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::storage::LedgerStore;
use std::sync::RwLock;

/// Volatile ledger. Everything is gone when the value is dropped.
#[derive(Default)]
pub struct MemoryLedger {
    blocks: RwLock<Vec<Block>>,
}

impl MemoryLedger {
    pub fn new() -> MemoryLedger {
        MemoryLedger::default()
    }
}

fn poisoned<T>(_: T) -> BlockchainError {
    BlockchainError::Database("Memory ledger lock poisoned".to_string())
}

impl LedgerStore for MemoryLedger {
    fn length(&self) -> Result<u64> {
        Ok(self.blocks.read().map_err(poisoned)?.len() as u64)
    }

    fn append(&self, block: &Block) -> Result<()> {
        let mut blocks = self.blocks.write().map_err(poisoned)?;
        if blocks.iter().any(|stored| stored.get_hash() == block.get_hash()) {
            return Err(BlockchainError::Database(
                "Block with this hash is already stored".to_string(),
            ));
        }
        blocks.push(block.clone());
        Ok(())
    }

    fn block_at(&self, position: u64) -> Result<Option<Block>> {
        let blocks = self.blocks.read().map_err(poisoned)?;
        Ok(usize::try_from(position)
            .ok()
            .and_then(|index| blocks.get(index))
            .cloned())
    }

    fn block_by_hash(&self, hash: &[u8]) -> Result<Option<Block>> {
        let blocks = self.blocks.read().map_err(poisoned)?;
        Ok(blocks.iter().find(|block| block.get_hash() == hash).cloned())
    }
}
