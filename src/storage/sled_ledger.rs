use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::storage::LedgerStore;
use crate::utils::base64_encode;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use std::sync::Mutex;

const BLOCKS_TREE: &str = "blocks"; // position (BE u64) -> block JSON
const HASHES_TREE: &str = "hashes"; // base64 block hash -> position (BE u64)

/// On-disk ledger backed by sled.
pub struct SledLedger {
    db: Db,
    blocks: Tree,
    hashes: Tree,
    append_lock: Mutex<()>, // positions are handed out one append at a time
}

impl SledLedger {
    pub fn open(path: &Path) -> Result<SledLedger> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        let hashes = db
            .open_tree(HASHES_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open hashes tree: {e}")))?;
        Ok(SledLedger {
            db,
            blocks,
            hashes,
            append_lock: Mutex::new(()),
        })
    }

    fn decode_position(bytes: &[u8]) -> Result<u64> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| BlockchainError::Database("Corrupt block position".to_string()))?;
        Ok(u64::from_be_bytes(raw))
    }

    fn decode_block(bytes: &[u8]) -> Result<Block> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| BlockchainError::Database(format!("Stored block is not UTF-8: {e}")))?;
        Block::from_json(text)
    }
}

impl LedgerStore for SledLedger {
    fn length(&self) -> Result<u64> {
        match self.blocks.last()? {
            Some((key, _)) => Ok(SledLedger::decode_position(&key)? + 1),
            None => Ok(0),
        }
    }

    fn append(&self, block: &Block) -> Result<()> {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| BlockchainError::Database("Sled append lock poisoned".to_string()))?;
        let position = self.length()?.to_be_bytes();
        let data = block.to_json()?;
        let hash = base64_encode(block.get_hash());

        (&self.blocks, &self.hashes)
            .transaction(|(blocks, hashes)| {
                if hashes.get(hash.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        "Block with this hash is already stored".to_string(),
                    ));
                }
                blocks.insert(&position[..], data.as_bytes())?;
                hashes.insert(hash.as_bytes(), &position[..])?;
                Ok(())
            })
            .map_err(|e: TransactionError<String>| match e {
                TransactionError::Abort(reason) => BlockchainError::Database(reason),
                TransactionError::Storage(e) => {
                    BlockchainError::Database(format!("Failed to append block: {e}"))
                }
            })?;
        self.db.flush()?;
        Ok(())
    }

    fn block_at(&self, position: u64) -> Result<Option<Block>> {
        match self.blocks.get(position.to_be_bytes())? {
            Some(bytes) => Ok(Some(SledLedger::decode_block(&bytes)?)),
            None => Ok(None),
        }
    }

    fn block_by_hash(&self, hash: &[u8]) -> Result<Option<Block>> {
        match self.hashes.get(base64_encode(hash))? {
            Some(position) => self.block_at(SledLedger::decode_position(&position)?),
            None => Ok(None),
        }
    }
}
