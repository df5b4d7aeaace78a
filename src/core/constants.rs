//! Protocol constants
//!
//! These values are part of consensus: two nodes disagreeing on any of them
//! will reject each other's blocks.

/// Proof-of-work difficulty of a production chain (leading zero bits).
pub const DIFFICULTY: u8 = 20;

/// User transactions per block. The reward transaction takes one extra slot.
pub const TXS_LIMIT: usize = 2;

/// Length of the random transaction nonce.
pub const NONCE_BYTES: usize = 32;

/// Transfers with a value strictly above this pay [`STORAGE_FEE`].
pub const FEE_THRESHOLD: u64 = 10;

/// Flat fee credited to the storage account.
pub const STORAGE_FEE: u64 = 1;

/// Value of the reward transaction minted for the miner of each block.
pub const MINING_REWARD: u64 = 1;

/// `prevHash` of the first block.
pub const GENESIS_PREV_HASH: &str = "GENESIS-BLOCK";

/// Storage account allocation at genesis.
pub const STORAGE_SEED: u64 = 100;

/// Chain creator allocation at genesis.
pub const GENESIS_REWARD: u64 = 100;

/// Pseudo-address that collects fees and pays mining rewards.
pub const STORAGE_ACCOUNT: &str = "STORAGE-CHAIN";

/// Fee mandated for a transfer of `value`. Binary, never proportional.
pub fn fee_for(value: u64) -> u64 {
    if value > FEE_THRESHOLD {
        STORAGE_FEE
    } else {
        0
    }
}
