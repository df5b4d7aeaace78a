//! Wallet management
//!
//! Key pairs live outside the consensus core; the core only needs an
//! identity that can sign and report its address.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::Wallet;
pub use wallets::{Wallets, WALLET_FILE};
