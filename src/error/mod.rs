//! Error handling for the ledger
//!
//! Every rejection the consensus engine can produce maps onto one variant,
//! so callers can tell a forged signature from an overdraft without
//! string matching.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error types for ledger operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// Malformed transaction or block: zero value, limit exceeded, duplicate nonce
    Structural(String),
    /// Hash mismatch or invalid signature
    Authentication(String),
    /// Proof-of-work target missed, or the block does not extend the tail
    Consensus(String),
    /// Balance overlay inconsistency or fee rule violation
    Accounting(String),
    /// Sender cannot cover value plus fee
    InsufficientFunds { required: u64, available: u64 },
    /// Unparseable or non-monotonic timestamp
    Temporal(String),
    /// Proof-of-work search was cancelled before a solution was found
    Aborted,
    /// Ledger store errors
    Database(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Structural(msg) => write!(f, "Malformed data: {msg}"),
            BlockchainError::Authentication(msg) => write!(f, "Authentication failed: {msg}"),
            BlockchainError::Consensus(msg) => write!(f, "Consensus violation: {msg}"),
            BlockchainError::Accounting(msg) => write!(f, "Accounting error: {msg}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::Temporal(msg) => write!(f, "Invalid timestamp: {msg}"),
            BlockchainError::Aborted => write!(f, "Mining aborted"),
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
