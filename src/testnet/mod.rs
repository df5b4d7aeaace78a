//! Test fixtures
//!
//! Chains here run at a low difficulty so sealing a block takes a few
//! milliseconds instead of seconds.

use crate::core::{Blockchain, Block, CancelToken, Transaction};
use crate::storage::{LedgerStore, MemoryLedger};
use crate::wallet::Wallet;
use std::sync::Arc;

/// Proof-of-work difficulty used by test chains.
pub const TEST_DIFFICULTY: u8 = 4;

/// In-memory chain whose genesis credits the returned wallet.
pub fn test_chain() -> (Blockchain, Wallet) {
    let creator = Wallet::new().unwrap();
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
    let chain = Blockchain::create(store, &creator.address(), TEST_DIFFICULTY).unwrap();
    (chain, creator)
}

/// Sealed (not yet appended) block on the current tip, mined by `sender`,
/// with one transfer from `sender` to a fresh wallet per entry of `values`.
pub fn sealed_block(chain: &Blockchain, sender: &Wallet, values: &[u64]) -> Block {
    let snapshot = chain.snapshot().unwrap();
    let tip = snapshot.tail_hash().unwrap();
    let mut block = chain.new_block(sender.address()).unwrap();
    for value in values {
        let receiver = Wallet::new().unwrap().address();
        let tx = Transaction::new(sender, &tip, receiver, *value).unwrap();
        block.add_transaction(&snapshot, tx).unwrap();
    }
    block.accept(&snapshot, sender, &CancelToken::new()).unwrap();
    block
}
