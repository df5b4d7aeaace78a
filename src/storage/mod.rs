//! Block persistence
//!
//! The ledger only ever appends blocks and reads them back by position or by
//! hash. [`LedgerStore`] is that surface; [`SledLedger`] keeps blocks on disk
//! and [`MemoryLedger`] keeps them in a vector for tests and throwaway nodes.

pub mod memory;
pub mod sled_ledger;

pub use memory::MemoryLedger;
pub use sled_ledger::SledLedger;

use crate::core::Block;
use crate::error::Result;

/// Append-only block storage. Implementations must be shareable between the
/// server threads and the mining thread.
pub trait LedgerStore: Send + Sync {
    /// Number of stored blocks.
    fn length(&self) -> Result<u64>;

    /// Stores `block` at position `length()`. Fails if a block with the same
    /// hash is already stored.
    fn append(&self, block: &Block) -> Result<()>;

    fn block_at(&self, position: u64) -> Result<Option<Block>>;

    fn block_by_hash(&self, hash: &[u8]) -> Result<Option<Block>>;
}
