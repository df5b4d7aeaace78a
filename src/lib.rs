//! # powledger
//!
//! An account-based proof-of-work ledger. Blocks carry their transactions
//! together with a balance overlay: the resulting balance of every address
//! the block touches. There is no balance table; a balance is whatever the
//! newest block mentioning the address says it is.
//!
//! ## Layout
//! - `core/`: addresses, transactions, blocks, proof-of-work, validation and
//!   the chain with its balance resolver
//! - `storage/`: append-only block stores (sled on disk, memory for tests)
//! - `wallet/`: P-256 key pairs and the named wallet file
//! - `network/`: node context, JSON-over-TCP server and client
//! - `config/`: TOML configuration with environment overrides
//! - `utils/`: hashing, encodings, signatures, timestamps
//! - `cli/`: command-line arguments
//!
//! ## Life of a block
//! 1. A client signs a [`Transaction`] against the tail it saw and submits it.
//! 2. The node admits it into its draft [`Block`] with `add_transaction`,
//!    which checks it against the running balances.
//! 3. A full draft is sealed with `accept`: reward, timestamp, hash,
//!    signature and a cancellable proof-of-work search.
//! 4. [`Blockchain::add_block`] re-runs every check and appends; peers do the
//!    same when the block is pushed to them.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    Address, Block, Blockchain, BlockchainIterator, CancelToken, PowOutcome, ProofOfWork,
    Snapshot, Transaction,
};
pub use error::{BlockchainError, Result};
pub use network::{
    fetch_block, fetch_chain, send, NodeContext, Nodes, OpCode, Package, Server, REPLY_OK,
};
pub use storage::{LedgerStore, MemoryLedger, SledLedger};
pub use utils::{
    base58_decode, base58_encode, base64_decode, base64_encode, current_timestamp,
    ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, new_key_pair, sha256_digest,
};
pub use wallet::{Wallet, Wallets, WALLET_FILE};
