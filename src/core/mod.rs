//! Ledger core
//!
//! Addresses, transactions, blocks with their balance overlays, the
//! proof-of-work search, block validation and the balance resolver that
//! reads account state back out of the chain.

pub mod address;
pub mod block;
pub mod blockchain;
pub mod constants;
pub mod proof_of_work;
pub mod transaction;
pub mod validation;

pub use address::Address;
pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator, Snapshot};
pub use proof_of_work::{CancelToken, PowOutcome, ProofOfWork};
pub use transaction::Transaction;
