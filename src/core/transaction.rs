use crate::core::constants::{fee_for, MINING_REWARD, NONCE_BYTES};
use crate::core::Address;
use crate::error::{BlockchainError, Result};
use crate::utils::serialization::base64_bytes;
use crate::utils::{ecdsa_p256_sha256_sign_verify, hash_sum, random_bytes};
use crate::wallet::Wallet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(with = "base64_bytes")]
    nonce: Vec<u8>, // uniqueness token, never reused within a block
    #[serde(with = "base64_bytes")]
    prev_block_hash: Vec<u8>, // chain tip the sender saw
    sender: Address,
    receiver: Address,
    value: u64,
    fee: u64,
    #[serde(with = "base64_bytes")]
    hash: Vec<u8>,
    #[serde(with = "base64_bytes")]
    signature: Vec<u8>,
}

impl Transaction {
    /// Builds and signs a transfer from `wallet` to `receiver`.
    pub fn new(
        wallet: &Wallet,
        chain_tip_hash: &[u8],
        receiver: Address,
        value: u64,
    ) -> Result<Transaction> {
        if value == 0 {
            return Err(BlockchainError::Structural(
                "Transaction value must be positive".to_string(),
            ));
        }

        let mut tx = Transaction {
            nonce: random_bytes(NONCE_BYTES)?,
            prev_block_hash: chain_tip_hash.to_vec(),
            sender: wallet.address(),
            receiver,
            value,
            fee: fee_for(value),
            hash: vec![],
            signature: vec![],
        };
        tx.hash = tx.compute_hash();
        tx.signature = wallet.sign(&tx.hash)?;
        Ok(tx)
    }

    /// Mints the reward paid by the storage account to `miner`. Unsigned: it is
    /// authenticated by the block that carries it.
    pub fn reward(miner: &Address, prev_block_hash: &[u8]) -> Result<Transaction> {
        let mut tx = Transaction {
            nonce: random_bytes(NONCE_BYTES)?,
            prev_block_hash: prev_block_hash.to_vec(),
            sender: Address::storage(),
            receiver: miner.clone(),
            value: MINING_REWARD,
            fee: 0,
            hash: vec![],
            signature: vec![],
        };
        tx.hash = tx.compute_hash();
        Ok(tx)
    }

    pub fn compute_hash(&self) -> Vec<u8> {
        hash_sum(&[
            &self.nonce,
            &self.prev_block_hash,
            self.sender.as_bytes(),
            self.receiver.as_bytes(),
            &self.value.to_be_bytes(),
            &self.fee.to_be_bytes(),
        ])
    }

    pub fn hash_is_valid(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Verifies `signature` over `hash` with the key embedded in `sender`.
    pub fn signature_is_valid(&self) -> bool {
        match self.sender.public_key() {
            Ok(public_key) => ecdsa_p256_sha256_sign_verify(&public_key, &self.signature, &self.hash),
            Err(_) => false,
        }
    }

    pub fn is_reward(&self) -> bool {
        self.sender.is_storage()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(data: &str) -> Result<Transaction> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn get_nonce(&self) -> &[u8] {
        self.nonce.as_slice()
    }

    pub fn get_prev_block_hash(&self) -> &[u8] {
        self.prev_block_hash.as_slice()
    }

    pub fn get_sender(&self) -> &Address {
        &self.sender
    }

    pub fn get_receiver(&self) -> &Address {
        &self.receiver
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_fee(&self) -> u64 {
        self.fee
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    /// Total debited from the sender.
    pub fn get_cost(&self) -> u64 {
        self.value.saturating_add(self.fee)
    }
}

#[cfg(test)]
impl Transaction {
    pub(crate) fn set_nonce(&mut self, nonce: &[u8]) {
        self.nonce = nonce.to_vec();
    }

    pub(crate) fn set_value(&mut self, value: u64) {
        self.value = value;
    }

    pub(crate) fn set_fee(&mut self, fee: u64) {
        self.fee = fee;
    }

    /// Recomputes the hash and re-signs, as a malicious but key-holding sender would.
    pub(crate) fn reseal(&mut self, wallet: &Wallet) {
        self.hash = self.compute_hash();
        self.signature = if self.is_reward() {
            vec![]
        } else {
            wallet.sign(&self.hash).unwrap()
        };
    }
}
