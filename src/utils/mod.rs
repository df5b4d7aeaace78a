//! Utility functions and helpers
//!
//! This module contains cryptographic utilities, encoding functions,
//! and serialization helpers used throughout the ledger.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, base64_decode, base64_encode, current_timestamp,
    ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, hash_sum, new_key_pair,
    parse_timestamp, random_bytes, sha256_digest,
};

pub use serialization::{deserialize, serialize};
