use crate::core::constants::STORAGE_ACCOUNT;
use crate::error::{BlockchainError, Result};
use crate::utils::{base58_decode, base58_encode, sha256_digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;
/// Uncompressed SEC1 P-256 point.
pub const PUBLIC_KEY_LEN: usize = 65;

/// Account identifier.
///
/// Either the storage pseudo-account or `base58(version || public key || checksum)`.
/// The full public key is embedded so signatures can be checked from the
/// address alone. Ordering is lexicographic on the string form, which is the
/// order balance overlays are hashed in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn storage() -> Address {
        Address(STORAGE_ACCOUNT.to_string())
    }

    pub fn from_public_key(public_key: &[u8]) -> Address {
        let mut payload: Vec<u8> = vec![VERSION];
        payload.extend(public_key);
        let checksum = checksum(payload.as_slice());
        payload.extend(checksum.as_slice());
        Address(base58_encode(payload.as_slice()))
    }

    pub fn parse(address: &str) -> Result<Address> {
        if address == STORAGE_ACCOUNT {
            return Ok(Address::storage());
        }
        decode_public_key(address)?;
        Ok(Address(address.to_string()))
    }

    /// Public key embedded in the address. Fails for the storage account.
    pub fn public_key(&self) -> Result<Vec<u8>> {
        if self.is_storage() {
            return Err(BlockchainError::InvalidAddress(
                "storage account has no public key".to_string(),
            ));
        }
        decode_public_key(&self.0)
    }

    pub fn is_storage(&self) -> bool {
        self.0 == STORAGE_ACCOUNT
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = sha256_digest(payload);
    let second_sha = sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

fn decode_public_key(address: &str) -> Result<Vec<u8>> {
    let payload = base58_decode(address)?;
    if payload.len() != 1 + PUBLIC_KEY_LEN + ADDRESS_CHECK_SUM_LEN {
        return Err(BlockchainError::InvalidAddress(format!(
            "{address}: unexpected length {}",
            payload.len()
        )));
    }
    let (body, actual_checksum) = payload.split_at(payload.len() - ADDRESS_CHECK_SUM_LEN);
    if body[0] != VERSION {
        return Err(BlockchainError::InvalidAddress(format!(
            "{address}: unknown version {}",
            body[0]
        )));
    }
    if checksum(body) != actual_checksum {
        return Err(BlockchainError::InvalidAddress(format!(
            "{address}: checksum mismatch"
        )));
    }
    Ok(body[1..].to_vec())
}

impl TryFrom<String> for Address {
    type Error = BlockchainError;

    fn try_from(value: String) -> Result<Self> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl FromStr for Address {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
